//! Annotation feed: turns example records into labeling tasks by attaching
//! the configured option list. Nothing else about a record changes.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::types::LabelOption;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

pub type Record = Map<String, Value>;

/// Loads example records from a JSONL file, or one record per image when
/// `source` is a directory.
pub fn load_source(source: &Path) -> Result<Vec<Record>> {
    if source.is_dir() {
        image_records(source)
    } else {
        jsonl_records(source)
    }
}

fn jsonl_records(path: &Path) -> Result<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line)? {
            Value::Object(map) => records.push(map),
            other => {
                return Err(AppError::InvalidRecord {
                    line: i + 1,
                    reason: format!("expected a JSON object, got {other}"),
                })
            }
        }
    }
    Ok(records)
}

fn image_records(dir: &Path) -> Result<Vec<Record>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    paths.retain(|p| {
        p.is_file()
            && p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTS.contains(&e.to_ascii_lowercase().as_str()))
    });
    paths.sort();

    Ok(paths
        .iter()
        .map(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut record = Record::new();
            record.insert("image".to_string(), json!(p.display().to_string()));
            record.insert("text".to_string(), json!(name));
            record.insert("meta".to_string(), json!({ "file": name }));
            record
        })
        .collect())
}

/// Attaches `options` to every record of the stream, lazily and in order.
pub fn with_options<'a, I>(stream: I, options: &'a [LabelOption]) -> impl Iterator<Item = Record> + 'a
where
    I: IntoIterator<Item = Record>,
    I::IntoIter: 'a,
{
    stream.into_iter().map(move |mut record| {
        let opts = options
            .iter()
            .map(|o| json!({ "id": o.id, "text": o.text }))
            .collect();
        record.insert("options".to_string(), Value::Array(opts));
        record
    })
}

/// Writes tasks built from `source` to `output`, or stdout when absent.
/// Returns the number of tasks written.
pub fn run_feed(source: &Path, output: Option<&Path>, options: &[LabelOption]) -> Result<usize> {
    let records = load_source(source)?;
    debug!(source = %source.display(), records = records.len(), "loaded feed source");

    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut count = 0;
    for task in with_options(records, options) {
        serde_json::to_writer(&mut sink, &task)?;
        sink.write_all(b"\n")?;
        count += 1;
    }
    sink.flush()?;

    info!(tasks = count, options = options.len(), "feed written");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<LabelOption> {
        vec![
            LabelOption { id: 0, text: "Anomaly".to_string() },
            LabelOption { id: -1, text: "Other".to_string() },
        ]
    }

    #[test]
    fn options_are_added_and_the_rest_passes_through() {
        let mut rec = Record::new();
        rec.insert("text".to_string(), json!("day 3"));
        rec.insert("meta".to_string(), json!({ "id": 3 }));

        let opts = options();
        let out: Vec<Record> = with_options(vec![rec.clone()], &opts).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["text"], rec["text"]);
        assert_eq!(out[0]["meta"], rec["meta"]);
        assert_eq!(
            out[0]["options"],
            json!([{ "id": 0, "text": "Anomaly" }, { "id": -1, "text": "Other" }])
        );
    }

    #[test]
    fn existing_options_are_replaced() {
        let mut rec = Record::new();
        rec.insert("options".to_string(), json!(["stale"]));
        let opts = options();
        let out: Vec<Record> = with_options(vec![rec], &opts).collect();
        assert_eq!(out[0]["options"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn image_directory_becomes_sorted_records() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("a.PNG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let records = load_source(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().filter_map(|r| r["text"].as_str()).collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);
        assert_eq!(records[1]["meta"], json!({ "file": "b.jpg" }));
    }

    #[test]
    fn jsonl_must_hold_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.jsonl");
        fs::write(&path, "{\"text\":\"ok\"}\n\n[1,2]\n").unwrap();

        let err = load_source(&path).unwrap_err();
        assert!(matches!(err, AppError::InvalidRecord { line: 3, .. }), "{err}");
    }

    #[test]
    fn run_feed_writes_one_task_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jsonl");
        fs::write(&src, "{\"text\":\"one\"}\n{\"text\":\"two\"}\n").unwrap();
        let out = dir.path().join("tasks.jsonl");

        assert_eq!(run_feed(&src, Some(&out), &options()).unwrap(), 2);

        let text = fs::read_to_string(&out).unwrap();
        let tasks: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1]["text"], "two");
        assert_eq!(tasks[0]["options"][1]["id"], -1);
    }
}
