//! Count-prefixed transcription layout shared by the binary and text codecs.
//!
//! Both codecs write the same sequence of primitives and differ only in how
//! a primitive is represented on the wire:
//!
//! ```text
//! tag_count   { tag_name }*
//! string_count { unique_string }*
//! { group_count group_start_id { type_code payload }*group_count }*
//! 0
//! ```
//!
//! Objects are grouped into runs of contiguous used ids so that an id only
//! has to be written once per run. Unused slots are never written.

use tracing::debug;

use crate::codec::primitives::length_u32;
use crate::error::{DecodeError, EncodeError};
use crate::limits::DecodeLimits;
use crate::model::{ObjectId, ObjectKey, ObjectType, Transcription};

/// Sink for the primitives of the count-prefixed layout.
pub(crate) trait PrimitiveWrite {
    fn write_unsigned(&mut self, value: u32) -> Result<(), EncodeError>;
    fn write_signed(&mut self, value: i32) -> Result<(), EncodeError>;
    fn write_float(&mut self, value: f32) -> Result<(), EncodeError>;
    fn write_double(&mut self, value: f64) -> Result<(), EncodeError>;
    fn write_string(&mut self, value: &str) -> Result<(), EncodeError>;

    /// Marks the end of a logical record (a line break in text archives).
    fn end_record(&mut self) -> Result<(), EncodeError> {
        Ok(())
    }
}

/// Source for the primitives of the count-prefixed layout.
pub(crate) trait PrimitiveRead {
    fn read_unsigned(&mut self, context: &'static str) -> Result<u32, DecodeError>;
    fn read_signed(&mut self, context: &'static str) -> Result<i32, DecodeError>;
    fn read_float(&mut self, context: &'static str) -> Result<f32, DecodeError>;
    fn read_double(&mut self, context: &'static str) -> Result<f64, DecodeError>;
    fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError>;
}

/// Returns `(start_id, count)` for each run of contiguous used object ids.
pub(crate) fn object_runs(transcription: &Transcription) -> Vec<(ObjectId, u32)> {
    let mut runs = Vec::new();
    let mut current: Option<(ObjectId, u32)> = None;

    for id in 0..transcription.num_object_ids() as ObjectId {
        let used = !matches!(transcription.object_type(id), Ok(ObjectType::Unused));
        current = match (current, used) {
            (Some((start, count)), true) => Some((start, count + 1)),
            (None, true) => Some((id, 1)),
            (Some(run), false) => {
                runs.push(run);
                None
            }
            (None, false) => None,
        };
    }
    if let Some(run) = current {
        runs.push(run);
    }

    runs
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writes one transcription in the count-prefixed layout.
pub(crate) fn write_transcription<P: PrimitiveWrite>(
    out: &mut P,
    transcription: &Transcription,
) -> Result<(), EncodeError> {
    // Object tag names, in interning order.
    let num_tags = transcription.num_object_tag_names();
    out.write_unsigned(length_u32(num_tags, "object tag names")?)?;
    for tag_id in 0..num_tags as u32 {
        out.write_string(transcription.object_tag_name(tag_id)?)?;
    }
    out.end_record()?;

    // Unique strings, in pool order.
    let num_strings = transcription.num_unique_strings();
    out.write_unsigned(length_u32(num_strings, "unique strings")?)?;
    for index in 0..num_strings as u32 {
        out.write_string(transcription.unique_string(index)?)?;
    }
    out.end_record()?;

    // Object groups.
    let runs = object_runs(transcription);
    for &(start, count) in &runs {
        out.write_unsigned(count)?;
        out.write_unsigned(start)?;
        out.end_record()?;
        for id in start..start + count {
            write_object(out, transcription, id)?;
            out.end_record()?;
        }
    }
    out.write_unsigned(0)?;
    out.end_record()?;

    debug!(
        tags = num_tags,
        strings = num_strings,
        groups = runs.len(),
        "wrote transcription"
    );
    Ok(())
}

fn write_object<P: PrimitiveWrite>(
    out: &mut P,
    transcription: &Transcription,
    id: ObjectId,
) -> Result<(), EncodeError> {
    let object_type = transcription.object_type(id)?;
    // Runs only contain used ids.
    let Some(code) = object_type.wire_code() else {
        return Ok(());
    };
    out.write_unsigned(code)?;

    match object_type {
        ObjectType::SignedInteger => out.write_signed(transcription.signed_integer(id)?),
        ObjectType::UnsignedInteger => out.write_unsigned(transcription.unsigned_integer(id)?),
        ObjectType::Float => out.write_float(transcription.float(id)?),
        ObjectType::Double => out.write_double(transcription.double(id)?),
        ObjectType::String => out.write_unsigned(transcription.string_object(id)?),
        ObjectType::Composite => {
            let composite = transcription.composite_object(id)?;
            out.write_unsigned(composite.num_keys())?;
            for entry in composite.entries() {
                let (key, children) = entry?;
                out.write_unsigned(key.tag_name_id)?;
                out.write_unsigned(key.tag_version)?;
                out.write_unsigned(length_u32(children.len(), "composite children")?)?;
                for &child in children {
                    out.write_unsigned(child)?;
                }
            }
            Ok(())
        }
        ObjectType::Unused => Ok(()),
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Reads one transcription in the count-prefixed layout.
pub(crate) fn read_transcription<P: PrimitiveRead>(
    input: &mut P,
    limits: &DecodeLimits,
) -> Result<Transcription, DecodeError> {
    let mut transcription = Transcription::new();

    let num_tags = input.read_unsigned("tag_count")?;
    check_count("object tag names", num_tags, limits.max_tag_names)?;
    for _ in 0..num_tags {
        let name = input.read_string(limits.max_string_len, "tag_name")?;
        transcription.add_object_tag_name(&name)?;
    }

    let num_strings = input.read_unsigned("string_count")?;
    check_count("unique strings", num_strings, limits.max_unique_strings)?;
    for _ in 0..num_strings {
        let value = input.read_string(limits.max_string_len, "unique_string")?;
        transcription.add_unique_string(&value)?;
    }

    let mut num_groups = 0usize;
    loop {
        let count = input.read_unsigned("group_count")?;
        if count == 0 {
            break;
        }
        let start = input.read_unsigned("group_start")?;
        let end = start as u64 + count as u64;
        if end > limits.max_object_ids as u64 {
            return Err(DecodeError::LengthExceedsLimit {
                field: "object ids",
                len: end as usize,
                max: limits.max_object_ids as usize,
            });
        }
        for id in start..start + count {
            read_object(input, &mut transcription, id, limits)?;
        }
        num_groups += 1;
    }

    debug!(
        tags = num_tags,
        strings = num_strings,
        groups = num_groups,
        objects = transcription.num_used_object_ids(),
        "read transcription"
    );
    Ok(transcription)
}

fn read_object<P: PrimitiveRead>(
    input: &mut P,
    transcription: &mut Transcription,
    id: ObjectId,
    limits: &DecodeLimits,
) -> Result<(), DecodeError> {
    let code = input.read_unsigned("object_type")?;
    let object_type =
        ObjectType::from_wire_code(code).ok_or(DecodeError::InvalidObjectType { code })?;

    match object_type {
        ObjectType::SignedInteger => {
            transcription.add_signed_integer(id, input.read_signed("signed_integer")?)?
        }
        ObjectType::UnsignedInteger => {
            transcription.add_unsigned_integer(id, input.read_unsigned("unsigned_integer")?)?
        }
        ObjectType::Float => transcription.add_float(id, input.read_float("float")?)?,
        ObjectType::Double => transcription.add_double(id, input.read_double("double")?)?,
        ObjectType::String => {
            let index = input.read_unsigned("string_index")?;
            check_index("unique strings", index, transcription.num_unique_strings())?;
            transcription.add_string_object(id, index)?;
        }
        ObjectType::Composite => {
            let num_tags = transcription.num_object_tag_names();
            let composite = transcription.add_composite_object(id)?;
            let num_keys = input.read_unsigned("key_count")?;
            for _ in 0..num_keys {
                let tag_name_id = input.read_unsigned("tag_id")?;
                check_index("object tag names", tag_name_id, num_tags)?;
                let tag_version = input.read_unsigned("tag_version")?;
                let key = ObjectKey::new(tag_name_id, tag_version);

                let num_children = input.read_unsigned("child_count")?;
                if num_children == 0 {
                    return Err(DecodeError::EmptyKey { id });
                }
                check_count("composite children", num_children, limits.max_children_per_key)?;
                for _ in 0..num_children {
                    composite.add_child(key, input.read_unsigned("child_id")?)?;
                }
            }
        }
        ObjectType::Unused => return Err(DecodeError::InvalidObjectType { code }),
    }

    Ok(())
}

fn check_count(field: &'static str, count: u32, max: u32) -> Result<(), DecodeError> {
    if count > max {
        return Err(DecodeError::LengthExceedsLimit {
            field,
            len: count as usize,
            max: max as usize,
        });
    }
    Ok(())
}

fn check_index(dict: &'static str, index: u32, size: usize) -> Result<(), DecodeError> {
    if index as usize >= size {
        return Err(DecodeError::IndexOutOfBounds {
            dict,
            index: index as usize,
            size,
        });
    }
    Ok(())
}
