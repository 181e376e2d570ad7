pub mod selection;
pub mod stats;

pub use selection::*;
pub use stats::*;
