//! Error types shared by the sequencer core and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by beatgrid
#[derive(Error, Debug)]
pub enum Error {
    /// Construction parameters that can never yield a running sequencer
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Instrument or beat index outside the grid. Always a caller bug.
    #[error("Invalid index: instrument {instrument}, beat {beat}")]
    InvalidIndex { instrument: usize, beat: usize },

    #[error("Failed to parse config {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load sample {path}")]
    Sample {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Audio output error: {0}")]
    Audio(String),

    #[error("MIDI output error: {0}")]
    Midi(String),
}

pub type Result<T> = std::result::Result<T, Error>;
