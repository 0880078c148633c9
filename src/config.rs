use crate::cli::{Cli, OutputFormat};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const ENV_PREFIX: &str = "SUBST_XML_";

/// Main application configuration, one field per file section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub substitution: SubstitutionConfig,
    pub processing: ProcessingFlags,
    pub folders: FolderNames,
    pub files: FileConfig,
    pub output: OutputConfig,
}

/// What to replace and where
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubstitutionConfig {
    pub old_value: String,
    pub new_value: String,
    /// Local name of the element whose text is edited
    pub target_element: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingFlags {
    /// Attempt to repair documents that fail strict parsing
    pub try_repair: bool,
    /// Copy originals to the backup folder before rewriting
    pub create_backup: bool,
    /// Decide and report only; no filesystem changes
    pub dry_run: bool,
}

/// Names of the folders created under the working directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FolderNames {
    /// Pre-write snapshots of modified files
    pub backup: String,
    /// Well-formed files whose element did not contain the old value
    pub value_absent: String,
    /// Files with no usable element, and files that could not be parsed
    pub not_changed: String,
}

/// File processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// File extensions to process
    pub extensions: Vec<String>,
    /// Include patterns (glob syntax, matched against file names)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax, matched against file names)
    pub exclude_patterns: Vec<String>,
    /// Treat symlinked files as candidates
    pub follow_symlinks: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub verbose: bool,
    /// Quiet mode (summary and errors only)
    pub quiet: bool,
    pub log_level: LogLevel,
    pub format: OutputFormat,
}

/// Diagnostic log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            old_value: "É".to_string(),
            new_value: "E".to_string(),
            target_element: "xTexto".to_string(),
        }
    }
}

impl Default for ProcessingFlags {
    fn default() -> Self {
        Self {
            try_repair: true,
            create_backup: true,
            dry_run: false,
        }
    }
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            backup: "Backup_XML".to_string(),
            value_absent: "xmls_nao_alterados".to_string(),
            not_changed: "Arquivos_NOT_alterados".to_string(),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            follow_symlinks: false,
        }
    }
}

impl FolderNames {
    /// Each name must be a single, non-empty path component, and all three must differ
    pub fn validate(&self) -> Result<()> {
        for (key, name) in [
            ("backup", &self.backup),
            ("value_absent", &self.value_absent),
            ("not_changed", &self.not_changed),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Folder name '{}' must not be empty",
                    key
                )));
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "Folder name '{}' must be a plain directory name: {}",
                    key, name
                )));
            }
        }

        if self.backup == self.value_absent
            || self.backup == self.not_changed
            || self.value_absent == self.not_changed
        {
            return Err(ConfigError::Validation(
                "Backup, value-absent and not-changed folders must be distinct".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_element_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        || name
            .chars()
            .any(|c| c.is_whitespace() || "<>&\"'/=:".contains(c));
    if invalid {
        return Err(ConfigError::Validation(format!(
            "Invalid target element name: '{}'",
            name
        )));
    }
    Ok(())
}

/// Validated, immutable settings for one processing run
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    old_value: String,
    new_value: String,
    target_element: String,
    try_repair: bool,
    create_backup: bool,
    dry_run: bool,
    folders: FolderNames,
    log_level: LogLevel,
}

impl ProcessingConfig {
    /// Repair and backup enabled, dry-run off, default folders
    pub fn new(
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        target_element: impl Into<String>,
    ) -> Result<Self> {
        let old_value = old_value.into();
        if old_value.is_empty() {
            return Err(ConfigError::Validation(
                "old_value must not be empty".to_string(),
            ));
        }
        let new_value = new_value.into();
        if let Some(ch) = new_value.chars().find(|c| !is_xml_char(*c)) {
            return Err(ConfigError::Validation(format!(
                "new_value contains a character not allowed in XML: {:?}",
                ch
            )));
        }
        let target_element = target_element.into();
        validate_element_name(&target_element)?;

        Ok(Self {
            old_value,
            new_value,
            target_element,
            try_repair: true,
            create_backup: true,
            dry_run: false,
            folders: FolderNames::default(),
            log_level: LogLevel::default(),
        })
    }

    pub fn with_try_repair(mut self, try_repair: bool) -> Self {
        self.try_repair = try_repair;
        self
    }

    pub fn with_create_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_folders(mut self, folders: FolderNames) -> Result<Self> {
        folders.validate()?;
        self.folders = folders;
        Ok(self)
    }

    pub fn old_value(&self) -> &str {
        &self.old_value
    }

    pub fn new_value(&self) -> &str {
        &self.new_value
    }

    pub fn target_element(&self) -> &str {
        &self.target_element
    }

    pub fn try_repair(&self) -> bool {
        self.try_repair
    }

    pub fn create_backup(&self) -> bool {
        self.create_backup
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn folders(&self) -> &FolderNames {
        &self.folders
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}

impl TryFrom<&Config> for ProcessingConfig {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self> {
        let substitution = &config.substitution;
        ProcessingConfig::new(
            substitution.old_value.clone(),
            substitution.new_value.clone(),
            substitution.target_element.clone(),
        )?
        .with_try_repair(config.processing.try_repair)
        .with_create_backup(config.processing.create_backup)
        .with_dry_run(config.processing.dry_run)
        .with_log_level(config.output.log_level)
        .with_folders(config.folders.clone())
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = format!("{}{}", ENV_PREFIX, name);
    match env.get(&key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value))),
        None => Ok(None),
    }
}

/// Characters allowed in XML 1.0 documents
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    /// Same as [`ConfigManager::load_config`] with a custom environment provider
    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON); missing fields take defaults
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "subst-xml.toml",
            "subst-xml.json",
            ".subst-xml.toml",
            ".subst-xml.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("subst-xml");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply `SUBST_XML_*` overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Values are taken verbatim; only booleans and enums are parsed
        if let Some(old_value) = env.get(&format!("{}OLD_VALUE", ENV_PREFIX)) {
            config.substitution.old_value = old_value;
        }
        if let Some(new_value) = env.get(&format!("{}NEW_VALUE", ENV_PREFIX)) {
            config.substitution.new_value = new_value;
        }
        if let Some(element) = env.get(&format!("{}TARGET_ELEMENT", ENV_PREFIX)) {
            config.substitution.target_element = element.trim().to_string();
        }

        if let Some(try_repair) = parse_env(env, "TRY_REPAIR")? {
            config.processing.try_repair = try_repair;
        }
        if let Some(create_backup) = parse_env(env, "CREATE_BACKUP")? {
            config.processing.create_backup = create_backup;
        }
        if let Some(dry_run) = parse_env(env, "DRY_RUN")? {
            config.processing.dry_run = dry_run;
        }
        if let Some(follow_symlinks) = parse_env(env, "FOLLOW_SYMLINKS")? {
            config.files.follow_symlinks = follow_symlinks;
        }
        if let Some(log_level) = parse_env(env, "LOG_LEVEL")? {
            config.output.log_level = log_level;
        }

        if let Some(format) = env.get(&format!("{}FORMAT", ENV_PREFIX)) {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {}FORMAT value: {}",
                        ENV_PREFIX, format
                    )));
                }
            };
        }

        if let Some(extensions) = env.get(&format!("{}EXTENSIONS", ENV_PREFIX)) {
            config.files.extensions = extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration; only flags actually given override
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(old_value) = &cli.old_value {
            config.substitution.old_value = old_value.clone();
        }
        if let Some(new_value) = &cli.new_value {
            config.substitution.new_value = new_value.clone();
        }
        if let Some(element) = &cli.target_element {
            config.substitution.target_element = element.clone();
        }

        if cli.no_repair {
            config.processing.try_repair = false;
        }
        if cli.no_backup {
            config.processing.create_backup = false;
        }
        if cli.dry_run {
            config.processing.dry_run = true;
        }

        if let Some(extensions) = cli.get_extensions() {
            config.files.extensions = extensions;
        }
        if !cli.include_patterns.is_empty() {
            config.files.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.follow_symlinks {
            config.files.follow_symlinks = true;
        }

        if let Some(log_level) = cli.log_level {
            config.output.log_level = log_level;
        }
        if let Some(format) = cli.format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }

        // Validate that extensions don't contain invalid characters
        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        ProcessingConfig::try_from(config).map(|_| ())
    }
}
