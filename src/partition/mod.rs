pub mod partitioner;
pub mod stats;
pub mod window;

pub use partitioner::run_partition;
