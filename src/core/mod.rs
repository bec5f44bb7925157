//! Core orchestration for mediafetch

pub mod batch;
pub mod format_selector;
pub mod media;
pub mod orchestrator;
pub mod outcome;
pub mod progress;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use batch::*;
pub use format_selector::*;
pub use media::*;
pub use orchestrator::*;
pub use outcome::*;
pub use progress::*;
