pub mod bounds;
pub mod geodesy;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use ids::*;
