pub mod headless;
pub mod layer;
pub mod loader;
pub mod overlay;
pub mod pane;
pub mod swap;
pub mod symbology;
pub mod zoom;

pub use headless::*;
pub use layer::*;
pub use loader::*;
pub use overlay::*;
pub use pane::*;
pub use swap::*;
pub use symbology::*;
pub use zoom::*;
