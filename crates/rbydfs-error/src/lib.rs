//! Error types for the rbydfs metadata decoder.
//!
//! The decoder has exactly two failure kinds and only one of them is an
//! `Err`: I/O failures while reading the underlying block device. A
//! corrupted or truncated log decodes to a sentinel node (zero trunk), and
//! a missing entry is reported through the same `done` flag that signals
//! normal end-of-iteration. Neither is represented here.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for rbydfs operations.
#[derive(Error, Debug)]
pub enum RbydError {
    /// Block-device file not found or not openable.
    #[error("cannot open block device: '{path}'")]
    DeviceNotFound { path: PathBuf },

    /// Block size must be non-zero to address blocks at all.
    #[error("invalid block size: {block_size}")]
    InvalidBlockSize { block_size: u32 },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RbydError>;
