//! Scribe: archive engine for transcribed object graphs.
//!
//! A front end maps application objects to a [`Transcription`]: a dense
//! array of typed object slots (integers, floats, strings, composites) plus
//! interning tables for field names and string payloads. This crate writes
//! transcriptions to, and reads them from, three archive formats.
//!
//! # Quick Start
//!
//! ```rust
//! use scribe::{ArchiveFormat, Transcription, read_archive, write_archive};
//!
//! let mut transcription = Transcription::new();
//! let count = transcription.get_or_create_object_key("count", 0);
//! let name = transcription.get_or_create_object_key("name", 0);
//! let record = transcription.add_composite_object(0).unwrap();
//! record.add_child(count, 1).unwrap();
//! record.add_child(name, 2).unwrap();
//! transcription.add_unsigned_integer(1, 42).unwrap();
//! transcription.add_string(2, "hello").unwrap();
//! assert!(transcription.is_complete(scribe::UNUSED_OBJECT_ID, false));
//!
//! let mut bytes = Vec::new();
//! write_archive(ArchiveFormat::Binary, &mut bytes, &[transcription.clone()]).unwrap();
//!
//! let decoded = read_archive(&mut bytes.as_slice(), 1).unwrap();
//! assert_eq!(decoded[0], transcription);
//! ```
//!
//! # Modules
//!
//! - [`model`]: object ids, composite objects, transcriptions
//! - [`codec`]: binary, text and XML archives
//! - [`void_cast`]: base/derived pointer casts for polymorphic front ends
//! - [`error`]: error types
//! - [`limits`]: signatures, versions and decode limits
//!
//! # Security
//!
//! Readers are designed to handle untrusted input:
//! - Counts and lengths are checked against [`DecodeLimits`] before allocating
//! - Varints are limited to 32 bits
//! - Composite child counts are validated against their buffer on every scan

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod void_cast;

pub use codec::{
    ArchiveFormat, ArchiveReader, ArchiveWriter, BinaryArchiveReader, BinaryArchiveWriter,
    TextArchiveReader, TextArchiveWriter, XmlArchiveReader, XmlArchiveWriter, XmlWriteOptions,
    read_archive, write_archive,
};
pub use error::{CastError, DecodeError, EncodeError, ErrorKind, TranscriptionError};
pub use limits::DecodeLimits;
pub use model::{
    CompositeObject, ObjectId, ObjectKey, ObjectTagNameId, ObjectTagVersion, ObjectType,
    StringIndex, Transcription, UNUSED_OBJECT_ID,
};
pub use void_cast::{SharedCast, VoidCastRegistry};
