//! Transport layer: strategies, retry and the chain that drives them

pub mod accelerated;
pub mod chain;
pub mod cli_tool;
pub mod direct;
pub mod extractor;
pub mod probe;
pub mod profile;
pub mod retry;
pub mod scratch;
pub mod strategy;
pub mod tools;

pub use accelerated::*;
pub use chain::*;
pub use cli_tool::*;
pub use direct::*;
pub use extractor::*;
pub use probe::*;
pub use profile::*;
pub use retry::*;
pub use scratch::*;
pub use strategy::*;
pub use tools::*;
