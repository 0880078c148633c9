use crate::error::{Result, SubstError};
use globset::{GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Lists candidate input files in a single directory (no recursion)
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include, compared case-insensitively (e.g., ["xml"])
    extensions: Vec<String>,
    /// Include patterns set, matched against the file name
    include_set: Option<GlobSet>,
    /// Exclude patterns set, matched against the file name
    exclude_set: Option<GlobSet>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

fn build_glob_set(patterns: &[String], kind: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| SubstError::Config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }

    let set = builder
        .build()
        .map_err(|e| SubstError::Config(format!("Failed to build {} glob set: {}", kind, e)))?;
    Ok(Some(set))
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_set: None,
            exclude_set: None,
            follow_symlinks: false,
        }
    }

    /// Set file extensions to discover
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Add include patterns; when any are set a file must match one of them
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(&patterns, "include")?;
        Ok(self)
    }

    /// Add exclude patterns
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(&patterns, "exclude")?;
        Ok(self)
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Regular files directly inside `dir` that pass the filters, sorted by path.
    ///
    /// Subdirectories (including the output folders) are never entered.
    pub async fn discover_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(dir)
            .await
            .map_err(|e| SubstError::FileSystemTraversal {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !metadata.is_dir() {
            return Err(SubstError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(dir).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let entry_path = entry.path();

            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %entry_path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let is_file = if file_type.is_symlink() {
                if !self.follow_symlinks {
                    continue;
                }
                // the target decides; dangling links are skipped
                fs::metadata(&entry_path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            } else {
                file_type.is_file()
            };

            if is_file && self.should_process(&entry_path) {
                files.push(entry_path);
            }
        }

        files.sort();
        debug!(dir = %dir.display(), count = files.len(), "Discovered files");
        Ok(files)
    }

    /// Check if a file should be processed based on extensions and patterns
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        let Some(name) = path.file_name() else {
            return false;
        };

        // Check exclude patterns first
        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(name)
        {
            return false;
        }

        // Check include patterns (if any are specified, at least one must match)
        if let Some(include_set) = &self.include_set {
            return include_set.is_match(name);
        }

        true
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
