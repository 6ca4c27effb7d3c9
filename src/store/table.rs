use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::config::ColumnBindings;
use crate::error::{AppError, Result};
use crate::types::{Reading, Row, Table, WindowStats};

/// Loads a CSV table, binding the timestamp and value columns by name.
///
/// The whole file is read and validated before returning, so a caller that
/// only writes after this succeeds never leaves partial output behind.
pub fn load_table(path: &Path, columns: &ColumnBindings) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let ts_idx = column_index(&headers, &columns.timestamp, path)?;
    let value_idx = column_index(&headers, &columns.value, path)?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let timestamp = record.get(ts_idx).unwrap_or_default().to_string();
        let raw_value = record.get(value_idx).unwrap_or_default();
        // NaN and infinities parse as f64 but are not readings.
        let value = match raw_value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(AppError::InvalidValue {
                    // 1-based, header excluded
                    row: i + 1,
                    column: columns.value.clone(),
                    value: raw_value.to_string(),
                })
            }
        };

        rows.push(Row {
            reading: Reading { timestamp, value },
            record,
        });
    }

    debug!(path = %path.display(), rows = rows.len(), "loaded table");
    Ok(Table { headers, rows })
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| AppError::MissingColumn {
            column: name.to_string(),
            path: path.display().to_string(),
        })
}

/// Writes a header row followed by the rows' original records.
pub fn write_rows(path: &Path, headers: &csv::StringRecord, rows: &[Row]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row.record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads every window listed in `records` from `dir`, in record order, into
/// one table. Also returns each record's row range within that table.
pub fn load_concatenated(
    dir: &Path,
    records: &[WindowStats],
    columns: &ColumnBindings,
) -> Result<(Table, Vec<Range<usize>>)> {
    let mut all = Table::default();
    let mut spans = Vec::with_capacity(records.len());
    for record in records {
        let start = all.len();
        all.extend(load_table(&dir.join(&record.file), columns)?);
        spans.push(start..all.len());
    }
    Ok((all, spans))
}
