//! Data model for transcribed object graphs.
//!
//! - Identifiers and object types
//! - Composite objects (packed child references)
//! - Transcriptions (object slots plus interning tables)

pub mod composite;
pub mod id;
pub mod transcription;

pub use composite::{CompositeObject, Entries};
pub use id::{
    ObjectId, ObjectKey, ObjectTagNameId, ObjectTagVersion, ObjectType, StringIndex,
    UNUSED_OBJECT_ID,
};
pub use transcription::Transcription;
