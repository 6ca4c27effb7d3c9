pub mod policy;

pub use policy::{select, NamedPolicy, SelectionPolicy};
