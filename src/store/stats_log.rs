use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::Result;
use crate::types::WindowStats;

/// Append-only JSONL sink for window metadata. Every record is one line,
/// flushed as soon as it is written, so an interrupted run never damages the
/// lines already on disk.
pub struct StatsWriter {
    file: File,
    written: usize,
}

impl StatsWriter {
    /// Creates (or truncates) the metadata file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, written: 0 })
    }

    pub fn write(&mut self, stats: &WindowStats) -> Result<()> {
        let mut line = serde_json::to_string(stats)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Forces the records to stable storage.
    pub fn finish(self) -> Result<usize> {
        self.file.sync_all()?;
        Ok(self.written)
    }
}

/// Reads every record from a metadata file, skipping blank lines.
pub fn read_stats(path: &Path) -> Result<Vec<WindowStats>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(id: usize, stdev: f64) -> WindowStats {
        WindowStats {
            id,
            file: format!("partition_{id}.csv"),
            start: format!("2016-01-0{} 00:00:00", id + 1),
            end: format!("2016-01-0{} 23:00:00", id + 1),
            stdev,
        }
    }

    #[test]
    fn one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.jsonl");

        let mut writer = StatsWriter::create(&path).unwrap();
        writer.write(&record(0, 1.25)).unwrap();
        writer.write(&record(1, f64::NAN)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"id":0,"file":"partition_0.csv""#));
        assert!(lines[1].ends_with(r#""stdev":null}"#));

        let back = read_stats(&path).unwrap();
        assert_eq!(back, vec![record(0, 1.25), record(1, f64::NAN)]);
    }

    #[test]
    fn truncated_last_line_leaves_earlier_records_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.jsonl");

        let mut writer = StatsWriter::create(&path).unwrap();
        writer.write(&record(0, 1.0)).unwrap();
        drop(writer);

        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str(r#"{"id":1,"file":"parti"#);
        fs::write(&path, &text).unwrap();

        // The torn tail is rejected, the intact prefix is untouched.
        assert!(read_stats(&path).is_err());
        let first = text.lines().next().unwrap();
        let parsed: WindowStats = serde_json::from_str(first).unwrap();
        assert_eq!(parsed, record(0, 1.0));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.jsonl");
        let line = serde_json::to_string(&record(3, 2.0)).unwrap();
        fs::write(&path, format!("\n{line}\n\n")).unwrap();

        assert_eq!(read_stats(&path).unwrap(), vec![record(3, 2.0)]);
    }

    #[test]
    fn empty_file_has_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.jsonl");
        StatsWriter::create(&path).unwrap().finish().unwrap();

        assert!(read_stats(&path).unwrap().is_empty());
    }
}
