use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{partition_file_name, ColumnBindings, STAGING_DIR_NAME, STATS_FILE_NAME};
use crate::error::{AppError, Result};
use crate::partition::stats::sample_stdev;
use crate::partition::window::window_bounds;
use crate::store::{load_table, write_rows, StatsWriter};
use crate::types::{Row, Table, WindowStats};

/// One window of a table together with its metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<'a> {
    pub rows: &'a [Row],
    pub stats: WindowStats,
}

/// Splits `table` into consecutive windows of `window_len` rows and computes
/// each window's stats. Pure; no I/O.
pub fn partition(table: &Table, window_len: usize) -> Result<Vec<Window<'_>>> {
    let windows = window_bounds(table.len(), window_len)?
        .into_iter()
        .enumerate()
        .map(|(id, range)| {
            let rows = &table.rows[range];
            let bound = |row: Option<&Row>| {
                row.map(|r| r.reading.timestamp.clone()).unwrap_or_default()
            };
            Window {
                rows,
                stats: WindowStats {
                    id,
                    file: partition_file_name(id),
                    start: bound(rows.first()),
                    end: bound(rows.last()),
                    stdev: sample_stdev(rows.iter().map(|r| r.reading.value)),
                },
            }
        })
        .collect();
    Ok(windows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSummary {
    pub rows: usize,
    pub windows: usize,
    pub stats_path: PathBuf,
}

/// Loads `input`, partitions it and writes `partition_<i>.csv` files plus
/// `statistics.jsonl` into `out_dir`.
///
/// All-or-nothing: the input is fully validated before anything is written,
/// and outputs are staged in a scratch directory and only moved into
/// `out_dir` once every file was written successfully.
pub fn run_partition(
    input: &Path,
    out_dir: &Path,
    window_len: usize,
    columns: &ColumnBindings,
) -> Result<PartitionSummary> {
    if window_len == 0 {
        return Err(AppError::InvalidWindowLength(window_len));
    }

    let table = load_table(input, columns)?;
    if table.is_empty() {
        warn!(input = %input.display(), "input has no rows; writing empty metadata");
    }
    let windows = partition(&table, window_len)?;
    info!(
        input = %input.display(),
        rows = table.len(),
        window_len,
        windows = windows.len(),
        "partitioning table"
    );

    fs::create_dir_all(out_dir)?;
    let staging = out_dir.join(STAGING_DIR_NAME);
    if staging.exists() {
        warn!(path = %staging.display(), "removing leftover staging directory");
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir(&staging)?;

    if let Err(e) = write_staged(&staging, &table, &windows) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), "failed to remove staging directory: {cleanup}");
        }
        return Err(e);
    }

    // Metadata goes last so it never references a partition that is not in place.
    for window in &windows {
        fs::rename(staging.join(&window.stats.file), out_dir.join(&window.stats.file))?;
    }
    let stats_path = out_dir.join(STATS_FILE_NAME);
    fs::rename(staging.join(STATS_FILE_NAME), &stats_path)?;
    fs::remove_dir(&staging)?;

    Ok(PartitionSummary {
        rows: table.len(),
        windows: windows.len(),
        stats_path,
    })
}

fn write_staged(staging: &Path, table: &Table, windows: &[Window<'_>]) -> Result<()> {
    let mut stats_writer = StatsWriter::create(&staging.join(STATS_FILE_NAME))?;
    for window in windows {
        write_rows(&staging.join(&window.stats.file), &table.headers, window.rows)?;
        stats_writer.write(&window.stats)?;
        debug!(
            id = window.stats.id,
            rows = window.rows.len(),
            stdev = window.stats.stdev,
            "staged window"
        );
    }
    let written = stats_writer.finish()?;
    debug!(written, "metadata staged");
    Ok(())
}
