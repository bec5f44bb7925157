//! Utility functions for mediafetch

pub mod cache;
pub mod filename;
pub mod mime;
pub mod text;
pub mod url;

pub use cache::*;
pub use filename::*;
pub use mime::*;
pub use text::*;
pub use url::*;
