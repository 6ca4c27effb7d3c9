use crate::error::{AppError, Result};
use crate::selector::NamedPolicy;
use crate::types::{ContextScope, FailurePolicy, LabelOption};

/// Metadata file written next to the partitions.
pub const STATS_FILE_NAME: &str = "statistics.jsonl";

/// Extension of per-window partition files.
pub const PARTITION_EXT: &str = "csv";

/// Staging directory (inside the output directory) partitions are written to
/// before being moved into place.
pub const STAGING_DIR_NAME: &str = ".partition-staging";

/// Default column bindings, matching the meter export layout.
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "timestamp";
pub const DEFAULT_VALUE_COLUMN: &str = "meter_reading";

/// Cutoff below which `above_or_flat` also selects a window.
pub const DEFAULT_FLAT_CUTOFF: f64 = 1.0;

pub const DEFAULT_IMAGE_WIDTH: u32 = 1000;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 600;

/// Label choices offered when LABEL_OPTIONS is not set.
pub const DEFAULT_LABEL_OPTIONS: &str = "0:Anomaly,1:Normal,2:Missing,-1:Other";

/// Image extensions the renderer knows how to encode.
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png"];

pub fn partition_file_name(index: usize) -> String {
    format!("partition_{index}.{PARTITION_EXT}")
}

/// Which CSV columns hold the timestamp and the reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBindings {
    pub timestamp: String,
    pub value: String,
}

impl Default for ColumnBindings {
    fn default() -> Self {
        Self {
            timestamp: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            value: DEFAULT_VALUE_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub context: ContextScope,
    pub failure: FailurePolicy,
    /// File extension; also selects the encoder.
    pub image_ext: String,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            context: ContextScope::Month,
            failure: FailurePolicy::FailFast,
            image_ext: "jpg".to_string(),
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub columns: ColumnBindings,
    /// Selection rule for `select` and `render` (SELECT_POLICY, FLAT_CUTOFF)
    pub policy: NamedPolicy,
    pub render: RenderConfig,
    /// Options attached to every annotation task (LABEL_OPTIONS, comma-separated `id:text`)
    pub label_options: Vec<LabelOption>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let flat_cutoff = var("FLAT_CUTOFF", &DEFAULT_FLAT_CUTOFF.to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("FLAT_CUTOFF must be a number".to_string()))?;
        let policy = NamedPolicy::from_name(&var("SELECT_POLICY", "above"), flat_cutoff)?;

        let image_ext = var("IMAGE_FORMAT", "jpg").to_lowercase();
        if !IMAGE_EXTS.contains(&image_ext.as_str()) {
            return Err(AppError::Config(format!(
                "IMAGE_FORMAT must be one of {IMAGE_EXTS:?}, got '{image_ext}'"
            )));
        }

        let render = RenderConfig {
            context: var("RENDER_CONTEXT", "month").parse()?,
            failure: var("RENDER_FAILURE", "fail_fast").parse()?,
            image_ext,
            width: parse_dimension("IMAGE_WIDTH", &var("IMAGE_WIDTH", &DEFAULT_IMAGE_WIDTH.to_string()))?,
            height: parse_dimension(
                "IMAGE_HEIGHT",
                &var("IMAGE_HEIGHT", &DEFAULT_IMAGE_HEIGHT.to_string()),
            )?,
        };

        Ok(Self {
            log_level: var("LOG_LEVEL", "info"),
            columns: ColumnBindings {
                timestamp: var("TIMESTAMP_COLUMN", DEFAULT_TIMESTAMP_COLUMN),
                value: var("VALUE_COLUMN", DEFAULT_VALUE_COLUMN),
            },
            policy,
            render,
            label_options: parse_label_options(&var("LABEL_OPTIONS", DEFAULT_LABEL_OPTIONS))?,
        })
    }
}

fn parse_dimension(key: &str, raw: &str) -> Result<u32> {
    match raw.parse::<u32>() {
        Ok(v) if v >= 64 => Ok(v),
        _ => Err(AppError::Config(format!(
            "{key} must be an integer of at least 64, got '{raw}'"
        ))),
    }
}

/// Parses `id:text` pairs, e.g. `0:Anomaly,1:Normal`.
pub fn parse_label_options(raw: &str) -> Result<Vec<LabelOption>> {
    let options = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id, text) = entry.split_once(':').ok_or_else(|| {
                AppError::Config(format!("label option '{entry}' must look like id:text"))
            })?;
            let id = id.trim().parse::<i64>().map_err(|_| {
                AppError::Config(format!("label option id '{id}' is not an integer"))
            })?;
            Ok(LabelOption {
                id,
                text: text.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if options.is_empty() {
        return Err(AppError::Config("LABEL_OPTIONS is empty".to_string()));
    }
    Ok(options)
}
