pub mod batch;
pub mod cancel;
pub mod debounce;
pub mod journal;

pub use batch::*;
pub use cancel::*;
pub use debounce::*;
pub use journal::*;
