pub mod config;
pub mod detect;
pub mod document;
pub mod error;
pub mod generator;
pub mod git;
pub mod index;
pub mod io;
pub mod lock;
pub mod paths;
pub mod registry;
pub mod score;
pub mod source;
pub mod state;
pub mod summarize;
pub mod sync;
pub mod truncate;
pub mod types;
pub mod vcs;

#[cfg(test)]
mod testing;

pub use error::{LlmsError, Result};
