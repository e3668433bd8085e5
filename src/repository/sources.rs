// src/repository/sources.rs

//! Package source list files
//!
//! One-line `deb` declarations written into `sources.list.d` style files.

use crate::error::{Error, Result};
use crate::recipe::WriteMode;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Write a source declaration into a list file
///
/// In append mode the line is only added when the file does not already
/// contain it, so re-applying a recipe leaves the file unchanged. Returns
/// whether the file was modified.
pub fn write_source_entry(path: &Path, line: &str, mode: WriteMode) -> Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to read source list {}: {}",
                path.display(),
                e
            )));
        }
    };

    let updated = match mode {
        WriteMode::Append => {
            if existing.lines().any(|l| l.trim() == line) {
                debug!("Source '{}' already present in {}", line, path.display());
                return Ok(false);
            }
            let mut content = existing;
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(line);
            content.push('\n');
            content
        }
        WriteMode::Replace => {
            let content = format!("{}\n", line);
            if existing == content {
                return Ok(false);
            }
            content
        }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
        })?;
    }

    fs::write(path, updated)
        .map_err(|e| Error::IoError(format!("Failed to write source list {}: {}", path.display(), e)))?;

    info!("Added source '{}' to {}", line, path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SBT_LINE: &str = "deb https://dl.bintray.com/sbt/debian /";

    #[test]
    fn test_append_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc/apt/sources.list.d/sbt.list");

        assert!(write_source_entry(&path, SBT_LINE, WriteMode::Append).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", SBT_LINE));
    }

    #[test]
    fn test_append_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sbt.list");

        assert!(write_source_entry(&path, SBT_LINE, WriteMode::Append).unwrap());
        assert!(!write_source_entry(&path, SBT_LINE, WriteMode::Append).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", SBT_LINE));
    }

    #[test]
    fn test_append_keeps_existing_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extra.list");
        fs::write(&path, "# managed\ndeb http://archive.ubuntu.com/ubuntu bionic main").unwrap();

        write_source_entry(&path, SBT_LINE, WriteMode::Append).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("# managed\ndeb http://archive.ubuntu.com/ubuntu bionic main\n{}\n", SBT_LINE)
        );
    }

    #[test]
    fn test_replace_overwrites() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("php.list");
        fs::write(&path, "deb https://old.example.org/php/ bionic main\n").unwrap();

        let line = "deb https://packages.sury.org/php/ bionic main";
        assert!(write_source_entry(&path, line, WriteMode::Replace).unwrap());
        assert!(!write_source_entry(&path, line, WriteMode::Replace).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", line));
    }
}
