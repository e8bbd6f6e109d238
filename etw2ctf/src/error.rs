//! Error classification (spec §7).
//!
//! Skip-event conditions are not runtime errors surfaced to a caller -- they
//! are recovered from inline by falling through to dissectors and then the
//! raw-payload fallback, so they are modeled as a lightweight internal enum
//! used only inside the decode call chain. [`PipelineError`] is the only
//! error type that crosses the library boundary: it covers stop-stream
//! (hard I/O failures) and stop-process (fatal, pre-flight) conditions.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the whole conversion, surfaced to the CLI as a non-zero
/// exit status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {0}")]
    MissingInputFile(PathBuf),

    #[error("could not open output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed writing stream {name}: {source}")]
    StreamWrite {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed writing metadata file: {0}")]
    MetadataWrite(#[source] std::io::Error),

    #[error("provider API error: {0}")]
    Provider(String),
}

/// Recoverable, per-event/per-property decode failures (spec §7,
/// "skip-event"). Never surfaced outside the decode call chain: the caller
/// always rolls back and retries via a dissector or the raw fallback, and the
/// event is always emitted in some form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `(in_type, out_type, size)` combination not present in the scalar
    /// dispatch table (spec §4.4).
    UnrecognizedScalarType,
    /// A struct/parametric-count/parametric-length property (non-zero
    /// property flags); refused per the Open Question in spec §9.
    UnsupportedPropertyFlags,
    /// The event-info decoding source was neither "WBEM" nor "XMLFile".
    UnsupportedDecodingSource,
    /// The provider API's `get_event_info` call failed.
    EventInfoUnavailable,
    /// Array elements after the first decoded to a different `Field`
    /// descriptor than the canonical one established by element 0.
    MismatchedArrayElement,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DecodeError::UnrecognizedScalarType => "unrecognized (in_type, out_type, size)",
            DecodeError::UnsupportedPropertyFlags => "property has unsupported aggregate flags",
            DecodeError::UnsupportedDecodingSource => "unsupported event-info decoding source",
            DecodeError::EventInfoUnavailable => "get_event_info failed",
            DecodeError::MismatchedArrayElement => "array element descriptor mismatch",
        };
        return f.write_str(msg);
    }
}
