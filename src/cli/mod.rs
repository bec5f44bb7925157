//! Command line interface

pub mod args;
pub mod output;

pub use args::{Args, Command, GetArgs, InfoArgs, ServeArgs, TransportArgs, VerbosityLevel};
pub use output::OutputFormatter;
