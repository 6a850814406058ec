//! Crate error type.
//!
//! Most input-path conditions are recovered locally (unknown devices become
//! placeholders, malformed persisted entries are skipped, degenerate
//! calibrations scale to zero). [`Error`] covers what is left: I/O, parse
//! failures of whole documents, and invalid static descriptions.

use thiserror::Error;

/// Errors surfaced by `corebind`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A key group does not have the arity its type requires.
    #[error("key group `{group}` expects {expected} keys, found {found}")]
    InvalidKeyGroup {
        group: String,
        expected: &'static str,
        found: usize,
    },

    #[error("unknown key `{0}`")]
    UnknownKey(String),

    #[error("duplicate key `{0}`")]
    DuplicateKey(String),

    #[error("unknown system `{0}`")]
    UnknownSystem(String),

    #[error("invalid event description `{0}`")]
    InvalidEvent(String),

    #[error("player {0} is out of range")]
    InvalidPlayer(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
