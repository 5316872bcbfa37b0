//! Error types for transcriptions, archive codecs and the void-cast registry.

use std::io;

use thiserror::Error;

use crate::model::{ObjectId, ObjectKey, ObjectType};

/// Broad error categories.
///
/// Stream and format errors come from bad input. Logic errors mean a caller
/// broke a [`Transcription`](crate::Transcription) precondition; decoding
/// never reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure while reading or writing a primitive.
    Stream,
    /// Invalid signature, unsupported version or malformed content.
    Format,
    /// Violated precondition inside the data model.
    Logic,
    /// Ambiguous cast path in the void-cast registry.
    Cast,
}

/// Violated precondition inside a transcription or composite object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    #[error("object id {id} out of range (num object ids: {num_object_ids})")]
    ObjectIdOutOfRange { id: ObjectId, num_object_ids: usize },

    #[error("object id {id} is reserved for unused slots")]
    ReservedObjectId { id: ObjectId },

    #[error("object {id} has type {actual:?}, expected {expected:?}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("object {id} already added with type {existing:?}")]
    ObjectAlreadyAdded { id: ObjectId, existing: ObjectType },

    #[error("object tag name {name:?} already added")]
    DuplicateObjectTagName { name: String },

    #[error("object tag name id {id} out of range (size: {size})")]
    ObjectTagNameIdOutOfRange { id: u32, size: usize },

    #[error("unique string {value:?} already added")]
    DuplicateUniqueString { value: String },

    #[error("unique string index {index} out of range (size: {size})")]
    UniqueStringIndexOutOfRange { index: u32, size: usize },

    #[error("child {index} of key {key:?} is already set")]
    ChildAlreadySet { key: ObjectKey, index: u32 },

    #[error("key index {index} out of range ({num_keys} keys)")]
    KeyIndexOutOfRange { index: u32, num_keys: u32 },

    #[error("key {key:?} not found in composite object")]
    KeyNotFound { key: ObjectKey },

    #[error("child index {index} out of range for key {key:?} ({num_children} children)")]
    ChildIndexOutOfRange {
        key: ObjectKey,
        index: u32,
        num_children: u32,
    },

    #[error("composite object layout is corrupt: {context}")]
    CorruptComposite { context: &'static str },
}

/// Error while reading an archive.
#[derive(Debug, Error)]
pub enum DecodeError {
    // === Stream errors ===
    #[error("stream read failed: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of stream while reading {context}")]
    UnexpectedEof { context: &'static str },

    // === Format errors ===
    #[error("invalid {format} archive signature")]
    InvalidSignature { format: &'static str },

    #[error("{format} {which} version {version} is newer than supported version {supported}")]
    UnsupportedVersion {
        format: &'static str,
        which: &'static str,
        version: u32,
        supported: u32,
    },

    #[error("varint exceeds maximum length while reading {context}")]
    VarintTooLong { context: &'static str },

    #[error("varint overflows 32 bits while reading {context}")]
    VarintOverflow { context: &'static str },

    #[error("invalid object type code: {code}")]
    InvalidObjectType { code: u32 },

    #[error("invalid token {token:?} while reading {context}")]
    InvalidToken { context: &'static str, token: String },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{dict} index {index} out of bounds (size: {size})")]
    IndexOutOfBounds {
        dict: &'static str,
        index: usize,
        size: usize,
    },

    #[error("composite object {id} has a key with no children")]
    EmptyKey { id: ObjectId },

    #[error("expected element <{expected}>, found {found}")]
    UnexpectedElement { expected: String, found: String },

    #[error("missing attribute {attribute:?} on element <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("object {id} defined more than once")]
    DuplicateObject { id: ObjectId },

    #[error("{dict} entry {value:?} defined more than once")]
    DuplicateEntry { dict: &'static str, value: String },

    #[error("invalid archive content: {0}")]
    InvalidContent(TranscriptionError),
}

/// Readers only feed stream data into the model, so a rejected mutation
/// always means a malformed archive.
impl From<TranscriptionError> for DecodeError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::ObjectAlreadyAdded { id, .. } => DecodeError::DuplicateObject { id },
            TranscriptionError::DuplicateObjectTagName { name } => DecodeError::DuplicateEntry {
                dict: "object tag names",
                value: name,
            },
            TranscriptionError::DuplicateUniqueString { value } => DecodeError::DuplicateEntry {
                dict: "unique strings",
                value,
            },
            other => DecodeError::InvalidContent(other),
        }
    }
}

impl DecodeError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Io(_) | DecodeError::UnexpectedEof { .. } => ErrorKind::Stream,
            _ => ErrorKind::Format,
        }
    }

    /// Maps an I/O error, reporting a short read as end of stream.
    pub(crate) fn from_io(err: io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof { context }
        } else {
            DecodeError::Io(err)
        }
    }
}

/// Error while writing an archive.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("stream write failed: {0}")]
    Io(#[from] io::Error),

    #[error("XML write failed: {0}")]
    Xml(String),

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains U+{:04X}, which XML 1.0 cannot represent", u32::from(*ch))]
    InvalidXmlChar { field: &'static str, ch: char },

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl EncodeError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::Io(_) | EncodeError::Xml(_) => ErrorKind::Stream,
            EncodeError::LengthExceedsLimit { .. } | EncodeError::InvalidXmlChar { .. } => {
                ErrorKind::Format
            }
            EncodeError::Transcription(_) => ErrorKind::Logic,
        }
    }
}

/// Error from the void-cast registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("ambiguous cast from {derived} to {base}: more than one inheritance path")]
    Ambiguous {
        derived: &'static str,
        base: &'static str,
    },
}

impl CastError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Cast
    }
}
