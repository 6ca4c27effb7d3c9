use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use embedded_graphics::pixelcolor::Rgb888;
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::config::{ColumnBindings, RenderConfig};
use crate::error::{AppError, Result};
use crate::render::canvas::{
    draw_frame, draw_series, draw_shade, draw_title, draw_x_axis, draw_y_axis, finite_range, Canvas, Panel,
    CONTEXT_SERIES, SERIES,
};
use crate::selector::{select, SelectionPolicy};
use crate::store::{load_concatenated, read_stats};
use crate::types::{ContextScope, FailurePolicy, Reading, Table, WindowStats};

const LEFT_MARGIN: u32 = 90;
const RIGHT_MARGIN: u32 = 30;
const TOP_PAD: u32 = 24;
const BOTTOM_PAD: u32 = 44;
const SHADE_ALPHA: f32 = 0.2;
const WINDOW_X_TICKS: usize = 5;
const CONTEXT_X_TICKS: usize = 12;
const Y_TICKS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub selected: usize,
    pub written: Vec<PathBuf>,
    pub failed: usize,
}

/// Draws the two-panel diagnostic image for selected windows.
pub struct Renderer {
    config: RenderConfig,
    columns: ColumnBindings,
}

impl Renderer {
    pub fn new(config: RenderConfig, columns: ColumnBindings) -> Self {
        Self { config, columns }
    }

    pub fn image_name(&self, stats: &WindowStats) -> String {
        format!("combined_plot_{}.{}", stats.file, self.config.image_ext)
    }

    /// Reads the metadata, selects windows and writes one image per selected
    /// window into `images_dir`.
    ///
    /// Every listed partition is loaded up front; a failure there aborts the
    /// run regardless of the failure policy. Per-window failures follow
    /// `RenderConfig::failure`.
    pub fn run<P>(
        &self,
        stats_path: &Path,
        threshold: f64,
        policy: &P,
        windows_dir: &Path,
        images_dir: &Path,
    ) -> Result<RenderSummary>
    where
        P: SelectionPolicy + ?Sized,
    {
        fs::create_dir_all(images_dir)?;

        let records = read_stats(stats_path)?;
        let (full, spans) = load_concatenated(windows_dir, &records, &self.columns)?;
        let span_of: HashMap<&str, Range<usize>> = records
            .iter()
            .map(|r| r.file.as_str())
            .zip(spans)
            .collect();
        let selected = select(&records, threshold, policy);
        info!(
            windows = records.len(),
            selected = selected.len(),
            threshold,
            context = %self.config.context,
            failure = %self.config.failure,
            "rendering selected windows"
        );

        let mut summary = RenderSummary {
            selected: selected.len(),
            written: Vec::with_capacity(selected.len()),
            failed: 0,
        };

        for (day, stats) in selected.into_iter().enumerate() {
            let span = span_of.get(stats.file.as_str()).cloned().unwrap_or_default();
            match self.render_one(day, stats, &full, span, images_dir) {
                Ok(path) => {
                    debug!(id = stats.id, path = %path.display(), "image written");
                    summary.written.push(path);
                }
                Err(e) => match self.config.failure {
                    FailurePolicy::FailFast => return Err(e),
                    FailurePolicy::Continue => {
                        error!(id = stats.id, file = %stats.file, "render failed: {e}");
                        summary.failed += 1;
                    }
                },
            }
        }

        Ok(summary)
    }

    fn render_one(
        &self,
        day: usize,
        stats: &WindowStats,
        full: &Table,
        span: Range<usize>,
        images_dir: &Path,
    ) -> Result<PathBuf> {
        let img = self.draw(day, full, span)?;
        let path = images_dir.join(self.image_name(stats));
        img.save(&path).map_err(|e| AppError::Render {
            file: stats.file.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    /// Top panel: the window, rows `span` of `full`. Bottom panel: the
    /// context series with the window's rows shaded. `day` numbers the
    /// window among those selected.
    pub fn draw(&self, day: usize, full: &Table, span: Range<usize>) -> Result<RgbImage> {
        let (top, bottom) = layout(self.config.width, self.config.height);
        let mut canvas = Canvas::new(self.config.width, self.config.height);

        let window: Vec<&Reading> = full
            .rows
            .get(span.clone())
            .unwrap_or_default()
            .iter()
            .map(|r| &r.reading)
            .collect();
        self.draw_panel(&mut canvas, &top, &window, SERIES, "%H:%M", WINDOW_X_TICKS)?;
        draw_title(&top, &format!("Plot for Day {day}"), &mut canvas)?;

        let month = context_month(window.first().copied(), self.config.context);
        let rows = context_rows(full, month);
        let context: Vec<&Reading> = rows.iter().map(|&i| &full.rows[i].reading).collect();
        if let Some((first, last)) = highlight_span(&rows, &span) {
            draw_shade(&bottom, first, last, rows.len(), &mut canvas.translucent(SHADE_ALPHA))?;
        }
        self.draw_panel(&mut canvas, &bottom, &context, CONTEXT_SERIES, "%m-%d", CONTEXT_X_TICKS)?;
        let scope = match month {
            Some((year, month)) => format!("{year:04}-{month:02}"),
            None => "full series".to_string(),
        };
        draw_title(&bottom, &format!("{} plot for {scope}", self.columns.value), &mut canvas)?;

        Ok(canvas.into_image())
    }

    fn draw_panel(
        &self,
        canvas: &mut Canvas,
        panel: &Panel,
        readings: &[&Reading],
        color: Rgb888,
        time_format: &str,
        x_ticks: usize,
    ) -> Result<()> {
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        draw_series(panel, &values, color, canvas)?;
        draw_frame(panel, canvas)?;
        let labels = tick_labels(readings, x_ticks, time_format);
        draw_x_axis(panel, readings.len(), &labels, &self.columns.timestamp, canvas)?;
        if let Some((lo, hi)) = finite_range(&values) {
            draw_y_axis(panel, lo, hi, Y_TICKS, &self.columns.value, canvas)?;
        }
        Ok(())
    }
}

/// Two stacked panels, each with room for a title above and axis labels
/// below and to the left.
fn layout(width: u32, height: u32) -> (Panel, Panel) {
    let half = height / 2;
    let panel_width = width.saturating_sub(LEFT_MARGIN + RIGHT_MARGIN).max(1);
    let panel_height = half.saturating_sub(TOP_PAD + BOTTOM_PAD).max(1);
    let top = Panel {
        left: LEFT_MARGIN,
        top: TOP_PAD,
        width: panel_width,
        height: panel_height,
    };
    let bottom = Panel {
        left: LEFT_MARGIN,
        top: half + TOP_PAD,
        width: panel_width,
        height: panel_height,
    };
    (top, bottom)
}

/// Up to `count` evenly spaced point indices with their time labels. Times
/// that do not parse are shown as written.
fn tick_labels(readings: &[&Reading], count: usize, time_format: &str) -> Vec<(usize, String)> {
    let n = readings.len();
    if n == 0 || count == 0 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..count)
        .map(|k| if count > 1 { k * (n - 1) / (count - 1) } else { 0 })
        .collect();
    indices.dedup();
    indices
        .into_iter()
        .map(|i| {
            let r = readings[i];
            let label = match r.parsed_time() {
                Some(t) => t.format(time_format).to_string(),
                None => r.timestamp.clone(),
            };
            (i, label)
        })
        .collect()
}

/// Calendar month shown behind a window starting at `first`. `None` means
/// the whole series: the scope is `Full`, or the window's first timestamp
/// does not parse.
pub fn context_month(first: Option<&Reading>, scope: ContextScope) -> Option<(i32, u32)> {
    match scope {
        ContextScope::Full => None,
        ContextScope::Month => {
            let t = first.and_then(Reading::parsed_time);
            if t.is_none() {
                warn!("window start does not parse as a timestamp; using full series as context");
            }
            t.map(|t| (t.year(), t.month()))
        }
    }
}

/// Indices of the rows of `full` that make up the context series.
pub fn context_rows(full: &Table, month: Option<(i32, u32)>) -> Vec<usize> {
    match month {
        None => (0..full.len()).collect(),
        Some(ym) => full
            .readings()
            .enumerate()
            .filter(|(_, r)| r.parsed_time().map(|t| (t.year(), t.month())) == Some(ym))
            .map(|(i, _)| i)
            .collect(),
    }
}

/// First and last position in `context` (ascending row indices) whose row
/// belongs to the window. Rows are matched by position, not timestamp, so
/// a neighbour sharing a boundary timestamp is never shaded.
pub fn highlight_span(context: &[usize], window: &Range<usize>) -> Option<(usize, usize)> {
    let first = context.iter().position(|i| window.contains(i))?;
    let last = context.iter().rposition(|i| window.contains(i))?;
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::run_partition;
    use crate::selector::NamedPolicy;
    use crate::types::Row;

    fn table(points: &[(&str, f64)]) -> Table {
        Table {
            headers: csv::StringRecord::from(vec!["timestamp", "meter_reading"]),
            rows: points
                .iter()
                .map(|&(ts, value)| Row {
                    reading: Reading {
                        timestamp: ts.to_string(),
                        value,
                    },
                    record: csv::StringRecord::from(vec![ts.to_string(), value.to_string()]),
                })
                .collect(),
        }
    }

    fn small_config(failure: FailurePolicy) -> RenderConfig {
        RenderConfig {
            context: ContextScope::Month,
            failure,
            image_ext: "png".to_string(),
            width: 240,
            height: 200,
        }
    }

    #[test]
    fn month_context_keeps_same_month_only() {
        let full = table(&[
            ("2016-01-31 23:00:00", 1.0),
            ("2016-02-01 00:00:00", 2.0),
            ("2016-02-15 00:00:00", 3.0),
            ("2016-03-01 00:00:00", 4.0),
        ]);

        let month = context_month(full.rows.get(1).map(|r| &r.reading), ContextScope::Month);
        assert_eq!(month, Some((2016, 2)));
        assert_eq!(context_rows(&full, month), vec![1, 2]);

        let full_scope = context_month(full.rows.get(1).map(|r| &r.reading), ContextScope::Full);
        assert_eq!(context_rows(&full, full_scope), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unparseable_window_time_falls_back_to_full_series() {
        let full = table(&[("a", 1.0), ("b", 2.0)]);
        let month = context_month(full.rows.get(1).map(|r| &r.reading), ContextScope::Month);
        assert_eq!(month, None);
        assert_eq!(context_rows(&full, month).len(), 2);
    }

    #[test]
    fn highlight_covers_window_rows_inclusive() {
        assert_eq!(highlight_span(&[0, 1, 2, 3], &(1..3)), Some((1, 2)));
        assert_eq!(highlight_span(&[0, 1, 2, 3], &(4..6)), None);
        // Month-filtered context: positions, not row indices.
        assert_eq!(highlight_span(&[5, 6, 7, 8], &(6..9)), Some((1, 3)));
    }

    #[test]
    fn shared_boundary_timestamp_stays_in_its_own_window() {
        // Window 0 ends and window 1 starts on the same timestamp.
        let full = table(&[
            ("2016-01-01 00:00:00", 1.0),
            ("2016-01-01 01:00:00", 2.0),
            ("2016-01-01 02:00:00", 3.0),
            ("2016-01-01 02:00:00", 4.0),
            ("2016-01-01 03:00:00", 5.0),
            ("2016-01-01 04:00:00", 6.0),
        ]);
        let rows = context_rows(&full, Some((2016, 1)));
        assert_eq!(highlight_span(&rows, &(3..6)), Some((3, 5)));
        assert_eq!(highlight_span(&rows, &(0..3)), Some((0, 2)));
    }

    #[test]
    fn tick_labels_use_time_format_and_dedupe() {
        let full = table(&[("2016-01-01 00:00:00", 1.0), ("2016-01-01 05:30:00", 2.0), ("raw", 3.0)]);
        let readings: Vec<&Reading> = full.readings().collect();
        let labels = tick_labels(&readings, 5, "%H:%M");
        assert_eq!(
            labels,
            vec![
                (0, "00:00".to_string()),
                (1, "05:30".to_string()),
                (2, "raw".to_string()),
            ]
        );
        assert!(tick_labels(&[], 5, "%H:%M").is_empty());
    }

    #[test]
    fn draw_produces_configured_size_with_shading() {
        let renderer = Renderer::new(small_config(FailurePolicy::FailFast), ColumnBindings::default());
        let full = table(&[
            ("2016-01-01 00:00:00", 1.0),
            ("2016-01-01 01:00:00", 5.0),
            ("2016-01-01 02:00:00", 2.0),
        ]);

        let img = renderer.draw(0, &full, 1..3).unwrap();
        assert_eq!(img.dimensions(), (240, 200));

        // Inside the bottom panel, right of the shaded span's start, some
        // pixel is tinted rather than white or a drawn color.
        let (_, bottom) = layout(240, 200);
        let tinted = (bottom.x_at(1, 3) as u32 + 2..bottom.x_at(2, 3) as u32 - 1)
            .any(|x| *img.get_pixel(x, bottom.top + 2) == image::Rgb([204, 204, 255]));
        assert!(tinted);
    }

    fn partitioned(dir: &Path) -> PathBuf {
        let input = dir.join("input.csv");
        // Four windows of three rows: flat, spiky, flat, spiky.
        let values = [1.0, 1.0, 1.0, 0.0, 10.0, 0.0, 2.0, 2.0, 2.0, 0.0, 20.0, 0.0];
        let mut text = String::from("timestamp,meter_reading\n");
        for (i, v) in values.iter().enumerate() {
            text.push_str(&format!("2016-01-01 {i:02}:00:00,{v}\n"));
        }
        fs::write(&input, text).unwrap();
        let out = dir.join("windows");
        run_partition(&input, &out, 3, &ColumnBindings::default()).unwrap();
        out
    }

    #[test]
    fn renders_only_selected_windows() {
        let dir = tempfile::tempdir().unwrap();
        let windows = partitioned(dir.path());
        let images = dir.path().join("images");
        let renderer = Renderer::new(small_config(FailurePolicy::FailFast), ColumnBindings::default());

        let summary = renderer
            .run(&windows.join("statistics.jsonl"), 2.0, &NamedPolicy::Above, &windows, &images)
            .unwrap();

        assert_eq!(summary.selected, 2);
        assert_eq!(summary.failed, 0);
        assert!(images.join("combined_plot_partition_1.csv.png").exists());
        assert!(images.join("combined_plot_partition_3.csv.png").exists());
        assert!(!images.join("combined_plot_partition_0.csv.png").exists());

        let img = image::open(images.join("combined_plot_partition_1.csv.png")).unwrap();
        assert_eq!((img.width(), img.height()), (240, 200));
    }

    #[test]
    fn flat_policy_adds_constant_windows() {
        let dir = tempfile::tempdir().unwrap();
        let windows = partitioned(dir.path());
        let images = dir.path().join("images");
        let renderer = Renderer::new(small_config(FailurePolicy::FailFast), ColumnBindings::default());

        let policy = NamedPolicy::AboveOrFlat { flat_cutoff: 1.0 };
        let summary = renderer
            .run(&windows.join("statistics.jsonl"), 2.0, &policy, &windows, &images)
            .unwrap();
        assert_eq!(summary.written.len(), 4);
    }

    #[test]
    fn fail_fast_stops_and_continue_carries_on() {
        let dir = tempfile::tempdir().unwrap();
        let windows = partitioned(dir.path());
        let stats = windows.join("statistics.jsonl");

        // A directory squatting on the first image path makes that save fail.
        let images = dir.path().join("images");
        fs::create_dir_all(images.join("combined_plot_partition_1.csv.png")).unwrap();

        let strict = Renderer::new(small_config(FailurePolicy::FailFast), ColumnBindings::default());
        assert!(strict.run(&stats, 2.0, &NamedPolicy::Above, &windows, &images).is_err());
        assert!(!images.join("combined_plot_partition_3.csv.png").exists());

        let lenient = Renderer::new(small_config(FailurePolicy::Continue), ColumnBindings::default());
        let summary = lenient
            .run(&stats, 2.0, &NamedPolicy::Above, &windows, &images)
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.written, vec![images.join("combined_plot_partition_3.csv.png")]);
    }

    #[test]
    fn missing_partition_aborts_before_drawing() {
        let dir = tempfile::tempdir().unwrap();
        let windows = partitioned(dir.path());
        fs::remove_file(windows.join("partition_2.csv")).unwrap();
        let images = dir.path().join("images");

        let lenient = Renderer::new(small_config(FailurePolicy::Continue), ColumnBindings::default());
        let res = lenient.run(&windows.join("statistics.jsonl"), 2.0, &NamedPolicy::Above, &windows, &images);
        assert!(res.is_err());
        assert_eq!(fs::read_dir(&images).unwrap().count(), 0);
    }
}
