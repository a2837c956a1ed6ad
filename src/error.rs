//! Custom error types for the application.
//!
//! This module defines the primary error type, `CytoError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failures that can occur, from
//! configuration and I/O issues to malformed plate data.
//!
//! ## Error Hierarchy
//!
//! `CytoError` is an enum that consolidates the error sources:
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically file
//!   parsing or format issues in the settings files.
//! - **`Configuration`**: Semantic errors in the configuration, such as
//!   values that parse but are logically invalid (an unknown cytometer key,
//!   a zero retry bound). These are caught during the validation step.
//! - **`Io`**: Wraps standard `std::io::Error`.
//! - **`Shape`**: A well matrix that is empty, ragged, or has dimensions no
//!   supported plate layout can address.
//! - **`InvalidLabel`**: A well label that fails the label grammar or falls
//!   outside the grid's configured dimensions. Local to the call; grid
//!   state is never corrupted by a rejected label.
//! - **`Persistence`**: The owning entity was gone when an association save
//!   was committed. Staged entries are dropped; the caller must re-stage.
//! - **`Protocol`**: Invalid input to a protocol operation, such as a plate
//!   run against a collection with no occupied wells.
//!
//! An upload-gathering shortfall is deliberately NOT an error: the gatherer
//! degrades to a flagged partial result instead (see the `upload` module).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CytoError>;

/// Primary error type for the crate.
#[derive(Error, Debug)]
pub enum CytoError {
    /// Settings file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure in a report or persisted value.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Malformed well matrix (empty, ragged, or unaddressable dimensions).
    #[error("Malformed well matrix: {0}")]
    Shape(String),

    /// Well label outside the grammar or the grid bounds.
    #[error("Invalid well label: {0}")]
    InvalidLabel(String),

    /// Owning entity unavailable at association save time.
    #[error("Association save failed: {0}")]
    Persistence(String),

    /// Invalid input to a protocol operation.
    #[error("Protocol input error: {0}")]
    Protocol(String),
}
