mod config;
mod error;
mod feed;
mod partition;
mod render;
mod selector;
mod store;
mod types;

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::run_feed;
use crate::partition::run_partition;
use crate::render::Renderer;
use crate::selector::select;
use crate::store::read_stats;

const USAGE: &str = "usage:
  meter-windows partition <input.csv> <output_dir> <window_len>
  meter-windows select <statistics.jsonl> <threshold>
  meter-windows render <statistics.jsonl> <threshold> <windows_dir> <images_dir>
  meter-windows feed <source.jsonl|image_dir> [tasks.jsonl]";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Partition {
        input: PathBuf,
        output: PathBuf,
        window_len: usize,
    },
    Select {
        stats: PathBuf,
        threshold: f64,
    },
    Render {
        stats: PathBuf,
        threshold: f64,
        windows: PathBuf,
        images: PathBuf,
    },
    Feed {
        source: PathBuf,
        output: Option<PathBuf>,
    },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let usage = || AppError::Usage(USAGE.to_string());
        let (name, rest) = args.split_first().ok_or_else(usage)?;
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        match (name.as_str(), rest.as_slice()) {
            ("partition", [input, output, window_len]) => Ok(Command::Partition {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
                window_len: window_len.parse().map_err(|_| {
                    AppError::Usage(format!("window length must be a positive integer, got '{window_len}'"))
                })?,
            }),
            ("select", [stats, threshold]) => Ok(Command::Select {
                stats: PathBuf::from(stats),
                threshold: parse_threshold(threshold)?,
            }),
            ("render", [stats, threshold, windows, images]) => Ok(Command::Render {
                stats: PathBuf::from(stats),
                threshold: parse_threshold(threshold)?,
                windows: PathBuf::from(windows),
                images: PathBuf::from(images),
            }),
            ("feed", [source]) => Ok(Command::Feed {
                source: PathBuf::from(source),
                output: None,
            }),
            ("feed", [source, output]) => Ok(Command::Feed {
                source: PathBuf::from(source),
                output: Some(PathBuf::from(output)),
            }),
            _ => Err(usage()),
        }
    }
}

fn parse_threshold(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| AppError::Usage(format!("threshold must be a number, got '{raw}'")))
}

fn failure_message(e: &AppError) -> String {
    format!("An error occurred: {e}")
}

fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = Command::parse(&args).and_then(|cmd| run(&cfg, cmd)) {
        eprintln!("{}", failure_message(&e));
        std::process::exit(1);
    }
}

fn run(cfg: &Config, cmd: Command) -> Result<()> {
    debug!(?cmd, "running command");
    match cmd {
        Command::Partition {
            input,
            output,
            window_len,
        } => {
            let summary = run_partition(&input, &output, window_len, &cfg.columns)?;
            info!(rows = summary.rows, stats = %summary.stats_path.display(), "partition complete");
            println!(
                "{} CSV files and statistics file created successfully in {}!",
                summary.windows,
                output.display()
            );
        }
        Command::Select { stats, threshold } => {
            let records = read_stats(&stats)?;
            let selected = select(&records, threshold, &cfg.policy);
            info!(
                windows = records.len(),
                selected = selected.len(),
                policy = %cfg.policy,
                "selection complete"
            );
            let mut out = std::io::stdout().lock();
            for record in selected {
                serde_json::to_writer(&mut out, record)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        Command::Render {
            stats,
            threshold,
            windows,
            images,
        } => {
            let renderer = Renderer::new(cfg.render.clone(), cfg.columns.clone());
            let summary = renderer.run(&stats, threshold, &cfg.policy, &windows, &images)?;
            if summary.failed > 0 {
                println!(
                    "{} of {} combined plots saved in {} ({} failed)",
                    summary.written.len(),
                    summary.selected,
                    images.display(),
                    summary.failed
                );
            } else {
                println!("Combined plots saved in {}", images.display());
            }
        }
        Command::Feed { source, output } => {
            let count = run_feed(&source, output.as_deref(), &cfg.label_options)?;
            if let Some(path) = output {
                println!("{count} tasks written to {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_partition() {
        let cmd = Command::parse(&args(&["partition", "in.csv", "out", "24"])).unwrap();
        assert_eq!(
            cmd,
            Command::Partition {
                input: PathBuf::from("in.csv"),
                output: PathBuf::from("out"),
                window_len: 24,
            }
        );
    }

    #[test]
    fn parses_render_and_select() {
        let cmd = Command::parse(&args(&["render", "s.jsonl", "2.5", "w", "img"])).unwrap();
        assert!(matches!(cmd, Command::Render { threshold, .. } if threshold == 2.5));

        let cmd = Command::parse(&args(&["select", "s.jsonl", "-1"])).unwrap();
        assert!(matches!(cmd, Command::Select { threshold, .. } if threshold == -1.0));
    }

    #[test]
    fn feed_output_is_optional() {
        let cmd = Command::parse(&args(&["feed", "images"])).unwrap();
        assert!(matches!(cmd, Command::Feed { output: None, .. }));
        let cmd = Command::parse(&args(&["feed", "images", "tasks.jsonl"])).unwrap();
        assert!(matches!(cmd, Command::Feed { output: Some(_), .. }));
    }

    #[test]
    fn every_failure_shares_one_prefix() {
        let config = AppError::Config("SELECT_POLICY must be above or above_or_flat".to_string());
        assert_eq!(
            failure_message(&config),
            "An error occurred: Configuration error: SELECT_POLICY must be above or above_or_flat"
        );
        let usage = Command::parse(&args(&["plot"])).unwrap_err();
        assert!(failure_message(&usage).starts_with("An error occurred: Usage error"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Command::parse(&args(&[])).is_err());
        assert!(Command::parse(&args(&["partition", "in.csv", "out"])).is_err());
        assert!(Command::parse(&args(&["partition", "in.csv", "out", "-3"])).is_err());
        assert!(Command::parse(&args(&["render", "s", "high", "w", "i"])).is_err());
        assert!(Command::parse(&args(&["plot"])).is_err());
    }
}
