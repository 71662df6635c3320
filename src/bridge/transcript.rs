//! JSON-lines transcript of bridge traffic
//!
//! A recorded run can be re-aggregated offline with `patch-reporter report`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use super::ConsoleLine;

/// Appends every line the aggregator sees to a file
pub struct Transcript {
    writer: BufWriter<File>,
}

impl Transcript {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create transcript: {}", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, line: &ConsoleLine) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read a transcript back; blank lines are skipped
pub fn read_transcript(path: &Path) -> Result<Vec<ConsoleLine>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: malformed transcript line", path.display(), n + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ConsoleLevel;
    use serde_json::json;

    #[test]
    fn test_transcript_preserves_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs/today.jsonl");

        let lines = vec![
            ConsoleLine::new(ConsoleLevel::Error, vec![json!("boom"), json!({"a": 1})]),
            ConsoleLine::new(ConsoleLevel::Log, vec![json!("[PUPPETEER_TEST_DONE_SIGNAL]")]),
        ];

        let mut transcript = Transcript::create(&path).unwrap();
        for line in &lines {
            transcript.append(line).unwrap();
        }
        transcript.finish().unwrap();

        assert_eq!(read_transcript(&path).unwrap(), lines);
    }

    #[test]
    fn test_malformed_line_names_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"level\":\"log\",\"args\":[]}\n\nnot json\n").unwrap();

        let err = read_transcript(&path).unwrap_err();
        assert!(err.to_string().contains(":3:"));
    }
}
