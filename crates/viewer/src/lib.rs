pub mod config;
pub mod coordinator;
pub mod logging;
pub mod search;
pub mod session;
pub mod viewport;

pub use config::*;
pub use coordinator::*;
pub use search::*;
pub use session::*;
pub use viewport::*;
