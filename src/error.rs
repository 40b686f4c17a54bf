//! Error types for Commfil decoding and its surrounding I/O.
//!
//! Two families of errors live here, and they travel very differently:
//!
//! - [`DecodeError`] describes a problem with one frame of the instrument's
//!   byte stream. It never propagates out of the decoder; it is delivered
//!   in-band as [`ProtocolEvent::DecodeError`](crate::ProtocolEvent) so the
//!   consumer decides whether to warn, log or ignore it.
//! - [`CommfilError`] covers everything outside the decode path: opening a
//!   serial port, reading a transcript, loading configuration, parsing an
//!   exported file. These are ordinary `Result` errors.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use commfil::CommfilError;
//!
//! let error = CommfilError::connection_failed("port busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

use crate::types::FrameKind;

/// Result type alias for crate operations.
pub type Result<T, E = CommfilError> = std::result::Result<T, E>;

/// Main error type for operations around the decoder.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CommfilError {
    #[error("Failed to connect to instrument: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Byte source failed: {context}")]
    Source {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{feature} requires the '{cargo_feature}' cargo feature")]
    FeatureDisabled { feature: String, cargo_feature: String },
}

impl CommfilError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommfilError::Connection { .. } => true,
            CommfilError::Source { .. } => true,
            CommfilError::File { .. } => false,
            CommfilError::Config { .. } => false,
            CommfilError::Parse { .. } => false,
            CommfilError::FeatureDisabled { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CommfilError::Connection { .. } => vec![
                "Check the serial cable uses a null-modem adapter",
                "Verify the port name and that no other program holds it",
                "Set the counter to Commfil v.2 output",
            ],
            CommfilError::File { .. } => vec![
                "Check file exists and is readable",
                "Check directory permissions",
                "Ensure sufficient disk space",
            ],
            CommfilError::Config { .. } => vec![
                "Compare the configuration file against the documented defaults",
                "Remove unknown keys and retry",
            ],
            CommfilError::Parse { .. } => vec![
                "Verify the file was produced by an export of this tool",
                "Check the file was not truncated",
            ],
            CommfilError::Source { .. } => vec![
                "Reconnect the serial cable",
                "Reopen the connection",
            ],
            CommfilError::FeatureDisabled { .. } => vec![
                "Rebuild with the named cargo feature enabled",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        CommfilError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        CommfilError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        CommfilError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        CommfilError::Config { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        CommfilError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for byte source failures.
    pub fn source_failed(
        context: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        CommfilError::Source { context: context.into(), source }
    }

    /// Helper constructor for functionality compiled out by a cargo feature.
    pub fn feature_disabled(feature: impl Into<String>, cargo_feature: impl Into<String>) -> Self {
        CommfilError::FeatureDisabled {
            feature: feature.into(),
            cargo_feature: cargo_feature.into(),
        }
    }
}

impl From<std::io::Error> for CommfilError {
    fn from(err: std::io::Error) -> Self {
        CommfilError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for CommfilError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CommfilError::Config { reason: err.to_string() }
    }
}

/// A problem with a single frame of the instrument stream.
///
/// Every variant keeps the offending raw bytes so consumers can display or
/// log exactly what arrived. Decode errors are never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The frame matched no known Commfil v.2 shape.
    #[error("unrecognized frame ({} bytes)", .raw.len())]
    Framing { raw: Bytes },

    /// The frame was recognised but a field failed structural parsing.
    #[error("malformed {context}: {details}")]
    StructuralParse { context: &'static str, details: String, raw: Bytes },

    /// A recognised frame arrived where the protocol does not allow it.
    #[error("{kind:?} frame out of sequence")]
    OutOfSequence { kind: FrameKind, raw: Bytes },
}

impl DecodeError {
    /// Helper constructor for structural parse errors.
    pub fn structural(context: &'static str, details: impl Into<String>, raw: Bytes) -> Self {
        DecodeError::StructuralParse { context, details: details.into(), raw }
    }

    /// The raw bytes of the frame that caused this error.
    pub fn raw_bytes(&self) -> &Bytes {
        match self {
            DecodeError::Framing { raw } => raw,
            DecodeError::StructuralParse { raw, .. } => raw,
            DecodeError::OutOfSequence { raw, .. } => raw,
        }
    }
}
