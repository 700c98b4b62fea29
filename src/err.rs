use serde::Serialize;
use thiserror::Error;

use std::io;

pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;

#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("invalid utf-16 string for {what} at offset {offset}")]
    InvalidUtf16 { what: &'static str, offset: u64 },

    #[error("failed to decode ansi string (used encoding scheme {encoding_used}), caused by: {inner_message}")]
    AnsiDecodeError {
        encoding_used: &'static str,
        inner_message: String,
    },

    #[error(
        "{what} at offset {offset} declares size {size}, which does not advance past its {minimum} byte header"
    )]
    NonAdvancingRecord {
        what: &'static str,
        offset: u64,
        size: u32,
        minimum: usize,
    },

    #[error("invalid date/time value for {what} at offset {offset}")]
    InvalidDateTime { what: &'static str, offset: u64 },

    #[error("vector at offset {offset} declares {count} elements, more than the input can hold")]
    VectorTooLarge { count: u32, offset: u64 },

    #[error("typed value at offset {offset} nests variants deeper than {depth} levels")]
    NestingTooDeep { offset: u64, depth: usize },

    #[error("failed to decode field `{field}` of {structure} at offset {offset}, caused by: {source}")]
    FailedToDecodeField {
        structure: &'static str,
        field: &'static str,
        offset: u64,
        #[source]
        source: Box<DeserializationError>,
    },

    #[error("field `{field}` of {structure} depends on undeclared field `{dependency}`")]
    UndeclaredDependency {
        structure: &'static str,
        field: &'static str,
        dependency: &'static str,
    },

    #[error("field `{field}` of {structure} was read before it was evaluated")]
    FieldNotEvaluated {
        structure: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` of {structure} is part of a dependency cycle")]
    DependencyCycle {
        structure: &'static str,
        field: &'static str,
    },

    #[error("An I/O error has occurred")]
    Io(#[from] io::Error),
}

/// Coarse classification of a [`DeserializationError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TruncatedInput,
    InvalidEncoding,
    NonAdvancingRecord,
    /// Malformed declaration tables or I/O failures, not a property of the input bytes.
    Internal,
}

impl DeserializationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeserializationError::Truncated { .. }
            | DeserializationError::VectorTooLarge { .. } => ErrorKind::TruncatedInput,
            DeserializationError::InvalidUtf16 { .. }
            | DeserializationError::AnsiDecodeError { .. }
            | DeserializationError::InvalidDateTime { .. }
            | DeserializationError::NestingTooDeep { .. } => ErrorKind::InvalidEncoding,
            DeserializationError::NonAdvancingRecord { .. } => ErrorKind::NonAdvancingRecord,
            DeserializationError::FailedToDecodeField { source, .. } => source.kind(),
            DeserializationError::UndeclaredDependency { .. }
            | DeserializationError::FieldNotEvaluated { .. }
            | DeserializationError::DependencyCycle { .. }
            | DeserializationError::Io(_) => ErrorKind::Internal,
        }
    }

    /// The innermost error, looking through field tags added by the field engine.
    pub fn root_cause(&self) -> &DeserializationError {
        match self {
            DeserializationError::FailedToDecodeField { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Absolute offset at which the failure was detected, if known.
    pub fn offset(&self) -> Option<u64> {
        match self.root_cause() {
            DeserializationError::Truncated { offset, .. }
            | DeserializationError::InvalidUtf16 { offset, .. }
            | DeserializationError::NonAdvancingRecord { offset, .. }
            | DeserializationError::InvalidDateTime { offset, .. }
            | DeserializationError::VectorTooLarge { offset, .. }
            | DeserializationError::NestingTooDeep { offset, .. } => Some(*offset),
            _ => match self {
                DeserializationError::FailedToDecodeField { offset, .. } => Some(*offset),
                _ => None,
            },
        }
    }
}

/// A non-fatal failure which ended a value or storage list early.
///
/// The entries decoded before the failure are kept, the failure itself is recorded next to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub kind: ErrorKind,
    pub offset: Option<u64>,
    pub message: String,
}

impl From<&DeserializationError> for DecodeFailure {
    fn from(err: &DeserializationError) -> Self {
        DecodeFailure {
            kind: err.kind(),
            offset: err.offset(),
            message: err.to_string(),
        }
    }
}
