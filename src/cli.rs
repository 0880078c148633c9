use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::LogLevel;

/// Verbosity levels for console output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only the summary and errors
    Quiet,
    /// One line per file plus the summary
    #[default]
    Normal,
    /// Also print destinations and repair details
    Verbose,
}

/// How the end-of-run report is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Per-file status lines and a summary block
    #[default]
    Human,
    /// The run summary as a JSON document
    Json,
}

/// Batch substitution inside one XML element across a directory of documents
#[derive(Parser, Debug, Clone)]
#[command(name = "subst-xml")]
#[command(
    about = "Replace text inside one XML element across a folder, repairing malformed files and sorting the rest"
)]
#[command(version)]
pub struct Cli {
    /// Directory holding the XML files (not searched recursively)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Text to look for
    #[arg(long = "old")]
    pub old_value: Option<String>,

    /// Replacement text
    #[arg(long = "new")]
    pub new_value: Option<String>,

    /// Local name of the element whose text is edited
    #[arg(long = "element")]
    pub target_element: Option<String>,

    /// Do not try to repair malformed documents
    #[arg(long = "no-repair")]
    pub no_repair: bool,

    /// Do not copy originals to the backup folder before rewriting
    #[arg(long = "no-backup")]
    pub no_backup: bool,

    /// Report what would happen without touching any file
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// File extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "File extensions to process (e.g., 'xml,nfe')"
    )]
    pub extensions: Option<String>,

    /// Include file name patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file name patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Also process files reached through symbolic links
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (summary and errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Extensions given on the command line, if any
    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|list| {
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["subst-xml"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert!(cli.old_value.is_none());
        assert!(!cli.no_repair);
        assert!(!cli.dry_run);
        assert!(!cli.follow_symlinks);
        assert!(cli.get_extensions().is_none());
        assert!(cli.format.is_none());
    }

    #[test]
    fn test_full_parsing() {
        let cli = Cli::try_parse_from([
            "subst-xml",
            "/data/nfe",
            "--old",
            "Ç",
            "--new",
            "C",
            "--element",
            "xProd",
            "--no-repair",
            "--no-backup",
            "--dry-run",
            "--extensions",
            "xml, nfe",
            "--include",
            "35*",
            "--exclude",
            "*-canc.xml",
            "--log-level",
            "debug",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.path, PathBuf::from("/data/nfe"));
        assert_eq!(cli.old_value.as_deref(), Some("Ç"));
        assert_eq!(cli.new_value.as_deref(), Some("C"));
        assert_eq!(cli.target_element.as_deref(), Some("xProd"));
        assert!(cli.no_repair && cli.no_backup && cli.dry_run);
        assert_eq!(
            cli.get_extensions(),
            Some(vec!["xml".to_string(), "nfe".to_string()])
        );
        assert_eq!(cli.include_patterns, vec!["35*"]);
        assert_eq!(cli.exclude_patterns, vec!["*-canc.xml"]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.verbose);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["subst-xml", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!(Cli::try_parse_from(["subst-xml", "--format", "xml"]).is_err());
    }
}
