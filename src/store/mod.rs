pub mod stats_log;
pub mod table;

pub use stats_log::{read_stats, StatsWriter};
pub use table::{load_concatenated, load_table, write_rows};
