/// Output of status records to the terminal or a rolling log file
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::models::DecodedStatus;

pub const DEFAULT_MAX_LINES: usize = 10;

#[derive(Debug, Clone)]
pub enum Sink {
    /// One JSON line per cycle on stdout
    Terminal,
    /// File holding the last `max_lines` records, newest last
    RollingFile { path: PathBuf, max_lines: usize },
}

impl Sink {
    /// Write one status record
    ///
    /// # Arguments
    /// * `status` - Outcome of the cycle, serialized as a single JSON line
    ///
    /// # Returns
    /// Result indicating success or failure
    pub fn emit(&self, status: &DecodedStatus) -> Result<(), SinkError> {
        let line = serde_json::to_string(&status.to_record())?;

        match self {
            Sink::Terminal => {
                println!("{}", line);
                Ok(())
            }
            Sink::RollingFile { path, max_lines } => append_rolling(path, *max_lines, &line),
        }
    }
}

/// Rewrite `path` with its last `max_lines - 1` lines followed by `line`
///
/// A missing file is treated as empty. The new contents are written to a
/// sibling temp file and renamed over `path` so readers never see a
/// half-written file.
pub fn append_rolling(path: &Path, max_lines: usize, line: &str) -> Result<(), SinkError> {
    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let keep = max_lines.max(1) - 1;
    let lines: Vec<&str> = existing.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(keep);

    let mut contents = String::new();
    for kept in &lines[start..] {
        contents.push_str(kept);
        contents.push('\n');
    }
    contents.push_str(line);
    contents.push('\n');

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;

    debug!(
        "Wrote status to {} ({} lines retained)",
        path.display(),
        lines.len() - start + 1
    );
    Ok(())
}
