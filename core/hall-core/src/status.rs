//! Ground-truth cover status, read straight from the hall sensor device file.

use fs_err as fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::cover::CoverState;
use crate::error::{HallError, Result};

const CLOSED_MARKER: &str = "CLOSE";

/// Source of the sensor's own opinion on whether the cover is closed.
pub trait StatusSource: Send + Sync {
    fn read_status(&self) -> Result<CoverState>;
}

/// Line-oriented status file; a first line of `CLOSE` means closed.
#[derive(Debug, Clone)]
pub struct HallFile {
    path: PathBuf,
}

impl HallFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusSource for HallFile {
    fn read_status(&self) -> Result<CoverState> {
        let unreadable = |source: std::io::Error| HallError::StatusUnreadable {
            path: self.path.clone(),
            source,
        };

        let file = fs::File::open(&self.path).map_err(unreadable)?;
        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(unreadable)?;

        let state = parse_status_line(&line);
        tracing::debug!(path = %self.path.display(), state = state.as_str(), "Hall status read");
        Ok(state)
    }
}

fn parse_status_line(line: &str) -> CoverState {
    if line.trim_end_matches(['\r', '\n']) == CLOSED_MARKER {
        CoverState::Closed
    } else {
        CoverState::Open
    }
}

/// Asks the source whether the cover is closed, treating an unreadable
/// source as open.
pub fn cover_closed(source: &dyn StatusSource) -> bool {
    match source.read_status() {
        Ok(state) => state.is_closed(),
        Err(err) => {
            tracing::warn!(error = %err, "Hall sensor status unavailable; assuming open");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hall_file(dir: &TempDir, content: &str) -> HallFile {
        let path = dir.path().join("hall_detect");
        std::fs::write(&path, content).unwrap();
        HallFile::new(path)
    }

    #[test]
    fn close_line_reads_closed() {
        let dir = TempDir::new().unwrap();
        let source = hall_file(&dir, "CLOSE\n");
        assert_eq!(source.read_status().unwrap(), CoverState::Closed);
        assert!(cover_closed(&source));
    }

    #[test]
    fn anything_else_reads_open() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            hall_file(&dir, "OPEN\n").read_status().unwrap(),
            CoverState::Open
        );
        assert_eq!(hall_file(&dir, "").read_status().unwrap(), CoverState::Open);
        assert_eq!(
            hall_file(&dir, "CLOSED\n").read_status().unwrap(),
            CoverState::Open
        );
        assert_eq!(
            hall_file(&dir, "CLOSE   \n").read_status().unwrap(),
            CoverState::Open
        );
    }

    #[test]
    fn only_first_line_counts() {
        let dir = TempDir::new().unwrap();
        let source = hall_file(&dir, "CLOSE\r\nOPEN\n");
        assert_eq!(source.read_status().unwrap(), CoverState::Closed);
    }

    #[test]
    fn missing_file_is_an_error_and_reads_as_open() {
        let dir = TempDir::new().unwrap();
        let source = HallFile::new(dir.path().join("absent"));
        assert!(matches!(
            source.read_status(),
            Err(HallError::StatusUnreadable { .. })
        ));
        assert!(!cover_closed(&source));
    }
}
