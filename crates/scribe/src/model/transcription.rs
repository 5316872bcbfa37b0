//! The in-memory transcription of an object graph.
//!
//! A transcription is a dense array of typed object slots plus two interning
//! tables: object tag names (field names of composite objects) and unique
//! strings (payloads of string objects).
//!
//! Tag names and unique strings are interned in insertion order. Readers add
//! them in the order they appear in an archive; writers emit them in the
//! order they were interned, so a round trip reproduces the same ids.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::TranscriptionError;
use crate::model::{
    CompositeObject, ObjectId, ObjectKey, ObjectTagNameId, ObjectTagVersion, ObjectType,
    StringIndex, UNUSED_OBJECT_ID,
};

/// Relative tolerance used when comparing float objects.
const FLOAT_EPSILON: f64 = 1e-5;

/// Relative tolerance used when comparing double objects.
const DOUBLE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
enum ObjectSlot {
    Unused,
    SignedInteger(i32),
    UnsignedInteger(u32),
    Float(f32),
    Double(f64),
    String(StringIndex),
    /// Index into `Transcription::composite_objects`.
    Composite(usize),
}

impl ObjectSlot {
    fn object_type(&self) -> ObjectType {
        match self {
            ObjectSlot::Unused => ObjectType::Unused,
            ObjectSlot::SignedInteger(_) => ObjectType::SignedInteger,
            ObjectSlot::UnsignedInteger(_) => ObjectType::UnsignedInteger,
            ObjectSlot::Float(_) => ObjectType::Float,
            ObjectSlot::Double(_) => ObjectType::Double,
            ObjectSlot::String(_) => ObjectType::String,
            ObjectSlot::Composite(_) => ObjectType::Composite,
        }
    }
}

/// A transcribed object graph.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    objects: Vec<ObjectSlot>,
    composite_objects: Vec<CompositeObject>,
    object_tag_names: Vec<String>,
    object_tag_name_ids: FxHashMap<String, ObjectTagNameId>,
    unique_strings: Vec<String>,
    unique_string_indices: FxHashMap<String, StringIndex>,
}

impl Transcription {
    /// Creates an empty transcription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of object slots, unused holes included.
    pub fn num_object_ids(&self) -> usize {
        self.objects.len()
    }

    /// Returns the number of slots holding an object.
    pub fn num_used_object_ids(&self) -> usize {
        self.objects
            .iter()
            .filter(|slot| !matches!(slot, ObjectSlot::Unused))
            .count()
    }

    /// Returns the type of object `id`.
    pub fn object_type(&self, id: ObjectId) -> Result<ObjectType, TranscriptionError> {
        Ok(self.slot(id)?.object_type())
    }

    // =========================================================================
    // Integers and floating point
    // =========================================================================

    pub fn signed_integer(&self, id: ObjectId) -> Result<i32, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::SignedInteger(value) => Ok(*value),
            other => Err(type_mismatch(id, ObjectType::SignedInteger, other)),
        }
    }

    pub fn add_signed_integer(&mut self, id: ObjectId, value: i32) -> Result<(), TranscriptionError> {
        self.add_slot(id, ObjectSlot::SignedInteger(value))
    }

    pub fn set_signed_integer(&mut self, id: ObjectId, value: i32) -> Result<(), TranscriptionError> {
        match self.slot_mut(id)? {
            ObjectSlot::SignedInteger(slot) => {
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(id, ObjectType::SignedInteger, other)),
        }
    }

    pub fn unsigned_integer(&self, id: ObjectId) -> Result<u32, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::UnsignedInteger(value) => Ok(*value),
            other => Err(type_mismatch(id, ObjectType::UnsignedInteger, other)),
        }
    }

    pub fn add_unsigned_integer(&mut self, id: ObjectId, value: u32) -> Result<(), TranscriptionError> {
        self.add_slot(id, ObjectSlot::UnsignedInteger(value))
    }

    pub fn set_unsigned_integer(&mut self, id: ObjectId, value: u32) -> Result<(), TranscriptionError> {
        match self.slot_mut(id)? {
            ObjectSlot::UnsignedInteger(slot) => {
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(id, ObjectType::UnsignedInteger, other)),
        }
    }

    pub fn float(&self, id: ObjectId) -> Result<f32, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::Float(value) => Ok(*value),
            other => Err(type_mismatch(id, ObjectType::Float, other)),
        }
    }

    pub fn add_float(&mut self, id: ObjectId, value: f32) -> Result<(), TranscriptionError> {
        self.add_slot(id, ObjectSlot::Float(value))
    }

    pub fn set_float(&mut self, id: ObjectId, value: f32) -> Result<(), TranscriptionError> {
        match self.slot_mut(id)? {
            ObjectSlot::Float(slot) => {
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(id, ObjectType::Float, other)),
        }
    }

    pub fn double(&self, id: ObjectId) -> Result<f64, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::Double(value) => Ok(*value),
            other => Err(type_mismatch(id, ObjectType::Double, other)),
        }
    }

    pub fn add_double(&mut self, id: ObjectId, value: f64) -> Result<(), TranscriptionError> {
        self.add_slot(id, ObjectSlot::Double(value))
    }

    pub fn set_double(&mut self, id: ObjectId, value: f64) -> Result<(), TranscriptionError> {
        match self.slot_mut(id)? {
            ObjectSlot::Double(slot) => {
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(id, ObjectType::Double, other)),
        }
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Adds a string object, interning `value` in the unique string pool.
    pub fn add_string(&mut self, id: ObjectId, value: &str) -> Result<(), TranscriptionError> {
        let index = match self.find_unique_string(value) {
            Some(index) => index,
            None => self.add_unique_string(value)?,
        };
        self.add_string_object(id, index)
    }

    /// Returns the string value of object `id`, dereferenced through the pool.
    pub fn string(&self, id: ObjectId) -> Result<&str, TranscriptionError> {
        let index = self.string_object(id)?;
        self.unique_string(index)
    }

    /// Adds a string object referencing an existing pool entry.
    pub fn add_string_object(
        &mut self,
        id: ObjectId,
        index: StringIndex,
    ) -> Result<(), TranscriptionError> {
        if index as usize >= self.unique_strings.len() {
            return Err(TranscriptionError::UniqueStringIndexOutOfRange {
                index,
                size: self.unique_strings.len(),
            });
        }
        self.add_slot(id, ObjectSlot::String(index))
    }

    /// Returns the pool index referenced by string object `id`.
    pub fn string_object(&self, id: ObjectId) -> Result<StringIndex, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::String(index) => Ok(*index),
            other => Err(type_mismatch(id, ObjectType::String, other)),
        }
    }

    /// Appends a new entry to the unique string pool.
    ///
    /// Each distinct value may be added only once.
    pub fn add_unique_string(&mut self, value: &str) -> Result<StringIndex, TranscriptionError> {
        if self.unique_string_indices.contains_key(value) {
            return Err(TranscriptionError::DuplicateUniqueString {
                value: value.to_string(),
            });
        }
        let index = self.unique_strings.len() as StringIndex;
        self.unique_strings.push(value.to_string());
        self.unique_string_indices.insert(value.to_string(), index);
        Ok(index)
    }

    /// Looks up the pool index of `value`.
    pub fn find_unique_string(&self, value: &str) -> Option<StringIndex> {
        self.unique_string_indices.get(value).copied()
    }

    /// Returns pool entry `index`.
    pub fn unique_string(&self, index: StringIndex) -> Result<&str, TranscriptionError> {
        self.unique_strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or(TranscriptionError::UniqueStringIndexOutOfRange {
                index,
                size: self.unique_strings.len(),
            })
    }

    /// Returns the number of entries in the unique string pool.
    pub fn num_unique_strings(&self) -> usize {
        self.unique_strings.len()
    }

    // =========================================================================
    // Composite objects
    // =========================================================================

    /// Adds an empty composite object and returns it for population.
    pub fn add_composite_object(
        &mut self,
        id: ObjectId,
    ) -> Result<&mut CompositeObject, TranscriptionError> {
        let index = self.composite_objects.len();
        self.add_slot(id, ObjectSlot::Composite(index))?;
        self.composite_objects.push(CompositeObject::new());
        Ok(&mut self.composite_objects[index])
    }

    pub fn composite_object(&self, id: ObjectId) -> Result<&CompositeObject, TranscriptionError> {
        match self.slot(id)? {
            ObjectSlot::Composite(index) => Ok(&self.composite_objects[*index]),
            other => Err(type_mismatch(id, ObjectType::Composite, other)),
        }
    }

    pub fn composite_object_mut(
        &mut self,
        id: ObjectId,
    ) -> Result<&mut CompositeObject, TranscriptionError> {
        match *self.slot(id)? {
            ObjectSlot::Composite(index) => Ok(&mut self.composite_objects[index]),
            other => Err(type_mismatch(id, ObjectType::Composite, &other)),
        }
    }

    // =========================================================================
    // Object tag names and keys
    // =========================================================================

    /// Appends a new object tag name.
    ///
    /// Each distinct name may be added only once.
    pub fn add_object_tag_name(&mut self, name: &str) -> Result<ObjectTagNameId, TranscriptionError> {
        if self.object_tag_name_ids.contains_key(name) {
            return Err(TranscriptionError::DuplicateObjectTagName {
                name: name.to_string(),
            });
        }
        let id = self.object_tag_names.len() as ObjectTagNameId;
        self.object_tag_names.push(name.to_string());
        self.object_tag_name_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn object_tag_name(&self, id: ObjectTagNameId) -> Result<&str, TranscriptionError> {
        self.object_tag_names
            .get(id as usize)
            .map(String::as_str)
            .ok_or(TranscriptionError::ObjectTagNameIdOutOfRange {
                id,
                size: self.object_tag_names.len(),
            })
    }

    pub fn num_object_tag_names(&self) -> usize {
        self.object_tag_names.len()
    }

    /// Looks up the id of an interned tag name.
    pub fn object_tag_name_id(&self, name: &str) -> Option<ObjectTagNameId> {
        self.object_tag_name_ids.get(name).copied()
    }

    /// Returns the key for `(name, version)`, interning `name` if needed.
    pub fn get_or_create_object_key(&mut self, name: &str, version: ObjectTagVersion) -> ObjectKey {
        let tag_name_id = match self.object_tag_name_ids.get(name) {
            Some(&id) => id,
            None => {
                let id = self.object_tag_names.len() as ObjectTagNameId;
                self.object_tag_names.push(name.to_string());
                self.object_tag_name_ids.insert(name.to_string(), id);
                id
            }
        };
        ObjectKey::new(tag_name_id, version)
    }

    /// Returns the key for `(name, version)` if `name` has been interned.
    pub fn object_key(&self, name: &str, version: ObjectTagVersion) -> Option<ObjectKey> {
        self.object_tag_name_id(name)
            .map(|tag_name_id| ObjectKey::new(tag_name_id, version))
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks that the object graph is fully connected and consistently typed.
    ///
    /// Every composite child other than `null_pointer_object_id` must refer to
    /// an in-range, used object, and all children sharing one key must have
    /// the same type. Violations are reported (one `warn!` each when
    /// `emit_warnings` is set) rather than returned as errors, so callers can
    /// recover from a partially loaded archive.
    pub fn is_complete(&self, null_pointer_object_id: ObjectId, emit_warnings: bool) -> bool {
        let mut complete = true;

        for (object_id, slot) in self.objects.iter().enumerate() {
            let ObjectSlot::Composite(index) = slot else {
                continue;
            };
            let object_id = object_id as ObjectId;

            for entry in self.composite_objects[*index].entries() {
                let (key, children) = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        complete = false;
                        if emit_warnings {
                            warn!(object_id, error = %err, "corrupt composite object");
                        }
                        break;
                    }
                };

                let mut key_type = None;
                for &child in children {
                    if child == null_pointer_object_id {
                        continue;
                    }
                    let child_type = match self.objects.get(child as usize) {
                        Some(slot) if !matches!(slot, ObjectSlot::Unused) => slot.object_type(),
                        _ => {
                            complete = false;
                            if emit_warnings {
                                warn!(
                                    object_id,
                                    child,
                                    tag_name = self.tag_name_for_log(key),
                                    tag_version = key.tag_version,
                                    "composite child refers to a missing object"
                                );
                            }
                            continue;
                        }
                    };
                    match key_type {
                        None => key_type = Some(child_type),
                        Some(expected) if expected != child_type => {
                            complete = false;
                            if emit_warnings {
                                warn!(
                                    object_id,
                                    child,
                                    tag_name = self.tag_name_for_log(key),
                                    tag_version = key.tag_version,
                                    expected = ?expected,
                                    actual = ?child_type,
                                    "composite children under one key have different types"
                                );
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        complete
    }

    fn tag_name_for_log(&self, key: ObjectKey) -> &str {
        self.object_tag_name(key.tag_name_id).unwrap_or("<unknown>")
    }

    // =========================================================================
    // Slots
    // =========================================================================

    fn slot(&self, id: ObjectId) -> Result<&ObjectSlot, TranscriptionError> {
        self.objects
            .get(id as usize)
            .ok_or(TranscriptionError::ObjectIdOutOfRange {
                id,
                num_object_ids: self.objects.len(),
            })
    }

    fn slot_mut(&mut self, id: ObjectId) -> Result<&mut ObjectSlot, TranscriptionError> {
        let num_object_ids = self.objects.len();
        self.objects
            .get_mut(id as usize)
            .ok_or(TranscriptionError::ObjectIdOutOfRange { id, num_object_ids })
    }

    /// Stores a new object, allocating slots up to `id` on first use.
    fn add_slot(&mut self, id: ObjectId, slot: ObjectSlot) -> Result<(), TranscriptionError> {
        if id == UNUSED_OBJECT_ID {
            return Err(TranscriptionError::ReservedObjectId { id });
        }
        let index = id as usize;
        if index >= self.objects.len() {
            self.objects.resize(index + 1, ObjectSlot::Unused);
        }
        match self.objects[index] {
            ObjectSlot::Unused => {
                self.objects[index] = slot;
                Ok(())
            }
            existing => Err(TranscriptionError::ObjectAlreadyAdded {
                id,
                existing: existing.object_type(),
            }),
        }
    }

    fn slot_or_unused(&self, index: usize) -> ObjectSlot {
        self.objects.get(index).copied().unwrap_or(ObjectSlot::Unused)
    }
}

fn type_mismatch(id: ObjectId, expected: ObjectType, actual: &ObjectSlot) -> TranscriptionError {
    TranscriptionError::TypeMismatch {
        id,
        expected,
        actual: actual.object_type(),
    }
}

/// Compares with a relative tolerance. Two NaNs compare equal.
fn relative_eq(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= epsilon * a.abs().max(b.abs())
}

/// Structural equality.
///
/// Floats and doubles compare with a relative tolerance because text and
/// XML round trips may lose precision. Trailing unused slots are ignored
/// since readers only allocate ids that appear in an archive.
impl PartialEq for Transcription {
    fn eq(&self, other: &Self) -> bool {
        if self.object_tag_names != other.object_tag_names
            || self.unique_strings != other.unique_strings
        {
            return false;
        }

        let len = self.objects.len().max(other.objects.len());
        (0..len).all(|index| {
            match (self.slot_or_unused(index), other.slot_or_unused(index)) {
                (ObjectSlot::Unused, ObjectSlot::Unused) => true,
                (ObjectSlot::SignedInteger(a), ObjectSlot::SignedInteger(b)) => a == b,
                (ObjectSlot::UnsignedInteger(a), ObjectSlot::UnsignedInteger(b)) => a == b,
                (ObjectSlot::Float(a), ObjectSlot::Float(b)) => {
                    relative_eq(a as f64, b as f64, FLOAT_EPSILON)
                }
                (ObjectSlot::Double(a), ObjectSlot::Double(b)) => relative_eq(a, b, DOUBLE_EPSILON),
                (ObjectSlot::String(a), ObjectSlot::String(b)) => a == b,
                (ObjectSlot::Composite(a), ObjectSlot::Composite(b)) => {
                    self.composite_objects[a] == other.composite_objects[b]
                }
                _ => false,
            }
        })
    }
}
