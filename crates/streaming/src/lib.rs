pub mod client;
pub mod error;
pub mod phase;
pub mod request;
pub mod response;

pub use client::*;
pub use error::*;
pub use phase::*;
pub use request::*;
pub use response::*;
