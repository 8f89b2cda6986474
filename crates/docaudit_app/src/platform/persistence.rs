use std::path::{Path, PathBuf};

use client_logging::{client_error, client_info};
use docaudit_engine::{write_atomically, PersistError};

/// Writes the chat transcript as `{dir}/{filename}`, replacing an older copy.
pub fn save_transcript(dir: &Path, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
    match write_atomically(dir, filename, content) {
        Ok(path) => {
            client_info!("saved transcript to {:?}", path);
            Ok(path)
        }
        Err(err) => {
            client_error!("failed to save transcript into {:?}: {}", dir, err);
            Err(err)
        }
    }
}
