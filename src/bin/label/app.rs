use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// Task types (mirror the feed's output shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelOption {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub raw: Map<String, Value>,
    pub key: String,
    pub options: Vec<LabelOption>,
}

impl Task {
    pub fn from_record(raw: Map<String, Value>) -> io::Result<Self> {
        let options = match raw.get("options") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Vec::new(),
        };
        let key = task_key(&raw);
        Ok(Self { raw, key, options })
    }

    pub fn text(&self) -> Option<&str> {
        self.raw.get("text").and_then(Value::as_str)
    }

    pub fn image(&self) -> Option<&str> {
        self.raw.get("image").and_then(Value::as_str)
    }

    pub fn meta(&self) -> Option<&Value> {
        self.raw.get("meta")
    }
}

/// Stable identity of a task, used to skip work already in the dataset.
pub fn task_key(raw: &Map<String, Value>) -> String {
    if let Some(image) = raw.get("image").and_then(Value::as_str) {
        return image.to_string();
    }
    if let Some(text) = raw.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    let mut stripped = raw.clone();
    stripped.remove("options");
    Value::Object(stripped).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Accept,
    Reject,
    Ignore,
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Answer::Accept => "accept",
            Answer::Reject => "reject",
            Answer::Ignore => "ignore",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub tasks: Vec<Task>,
    pub position: usize,
    pub cursor: usize,
    pub dataset: PathBuf,
    /// Answers recorded during this session.
    pub answered: usize,
    /// Tasks skipped at load because the dataset already had them.
    pub already_done: usize,
    pub last_answer: Option<(Answer, String)>,
}

impl AppState {
    pub fn load(tasks_path: &Path, dataset: &Path) -> io::Result<Self> {
        let done = answered_keys(dataset)?;
        let mut tasks = Vec::new();
        let mut already_done = 0;
        for record in read_objects(tasks_path)? {
            let task = Task::from_record(record)?;
            if done.contains(&task.key) {
                already_done += 1;
            } else {
                tasks.push(task);
            }
        }
        Ok(Self {
            tasks,
            position: 0,
            cursor: 0,
            dataset: dataset.to_path_buf(),
            answered: 0,
            already_done,
            last_answer: None,
        })
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks.get(self.position)
    }

    pub fn finished(&self) -> bool {
        self.position >= self.tasks.len()
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let Some(task) = self.current() else {
            return;
        };
        let max = task.options.len().saturating_sub(1);
        self.cursor = self.cursor.saturating_add_signed(delta).min(max);
    }

    /// Accepts option `index` of the current task and moves on.
    pub fn choose(&mut self, index: usize) -> io::Result<()> {
        let Some(option) = self.current().and_then(|t| t.options.get(index)).cloned() else {
            return Ok(());
        };
        self.record(Answer::Accept, vec![option.id])
    }

    pub fn reject(&mut self) -> io::Result<()> {
        self.record(Answer::Reject, Vec::new())
    }

    pub fn skip(&mut self) -> io::Result<()> {
        self.record(Answer::Ignore, Vec::new())
    }

    fn record(&mut self, answer: Answer, accept: Vec<i64>) -> io::Result<()> {
        let Some(task) = self.current() else {
            return Ok(());
        };
        let key = task.key.clone();
        let mut line = task.raw.clone();
        line.insert("answer".to_string(), json!(answer.to_string()));
        line.insert("accept".to_string(), json!(accept));
        line.insert("_input_key".to_string(), json!(key));
        line.insert("_timestamp".to_string(), json!(now_secs()));
        append_line(&self.dataset, &Value::Object(line))?;

        self.last_answer = Some((answer, key));
        self.answered += 1;
        self.position += 1;
        self.cursor = 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSONL helpers
// ---------------------------------------------------------------------------

fn read_objects(path: &Path) -> io::Result<Vec<Map<String, Value>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line)? {
            Value::Object(map) => out.push(map),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected a JSON object, got {other}"),
                ))
            }
        }
    }
    Ok(out)
}

fn answered_keys(dataset: &Path) -> io::Result<HashSet<String>> {
    if !dataset.exists() {
        return Ok(HashSet::new());
    }
    Ok(read_objects(dataset)?
        .into_iter()
        .filter_map(|m| m.get("_input_key").and_then(Value::as_str).map(String::from))
        .collect())
}

/// Appends one line and flushes it, so earlier answers survive a crash.
fn append_line(path: &Path, value: &Value) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    file.flush()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
