use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::AiProvider;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend API root, e.g. `https://chat.example.com/api`
    pub base_url: Option<String>,
    /// Provider preselected for new chats
    pub default_provider: Option<AiProvider>,
}

/// Display a path with `~` in place of the home directory on Unix-like
/// systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
