use std::path::{Path, PathBuf};

/// Resolved file locations for desk-sync.
/// Pure data structure with no I/O.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory backing the file storage medium
    /// Example: ~/.local/share/desk-sync/
    pub data_dir: PathBuf,

    /// Optional JSON config file
    /// Example: ~/.local/share/desk-sync/config.json
    pub config: PathBuf,
}

impl Paths {
    /// Resolve paths, using `data_dir` when given and
    /// `$HOME/.local/share/desk-sync` otherwise.
    ///
    /// Only performs path concatenation and environment variable reads.
    /// Does NOT create directories.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use desk_sync::paths::Paths;
    ///
    /// let paths = Paths::resolve(Some(Path::new("/srv/desk")));
    /// assert_eq!(paths.config, Path::new("/srv/desk/config.json"));
    /// ```
    pub fn resolve(data_dir: Option<&Path>) -> Self {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("desk-sync")
            }
        };

        Self {
            config: data_dir.join("config.json"),
            data_dir,
        }
    }

    /// Replace the config location (CLI `--config`).
    pub fn with_config(mut self, config: Option<&Path>) -> Self {
        if let Some(path) = config {
            self.config = path.to_path_buf();
        }
        self
    }
}
