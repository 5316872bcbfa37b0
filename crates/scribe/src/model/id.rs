//! Identifier types for transcribed objects.

/// Dense, zero-based handle into a transcription's object slots.
pub type ObjectId = u32;

/// Reserved object id marking "no object" or a hole in a child list.
pub const UNUSED_OBJECT_ID: ObjectId = ObjectId::MAX;

/// Interned id of an object tag name.
pub type ObjectTagNameId = u32;

/// Version of an object tag.
pub type ObjectTagVersion = u32;

/// Index into a transcription's unique string pool.
pub type StringIndex = u32;

/// Identifies one field (slot) of a composite object.
///
/// The version lets the same logical field carry differently shaped data
/// across protocol revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub tag_name_id: ObjectTagNameId,
    pub tag_version: ObjectTagVersion,
}

impl ObjectKey {
    /// Creates a key from an interned tag name id and version.
    pub fn new(tag_name_id: ObjectTagNameId, tag_version: ObjectTagVersion) -> Self {
        Self {
            tag_name_id,
            tag_version,
        }
    }
}

/// Type of an object slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    SignedInteger,
    UnsignedInteger,
    Float,
    Double,
    String,
    Composite,
    Unused,
}

impl ObjectType {
    /// Returns the wire code written by the count-prefixed codecs.
    ///
    /// `Unused` has no code because unused slots are never written.
    pub fn wire_code(self) -> Option<u32> {
        match self {
            ObjectType::SignedInteger => Some(0),
            ObjectType::UnsignedInteger => Some(1),
            ObjectType::Float => Some(2),
            ObjectType::Double => Some(3),
            ObjectType::String => Some(4),
            ObjectType::Composite => Some(5),
            ObjectType::Unused => None,
        }
    }

    /// Creates an ObjectType from its wire code.
    pub fn from_wire_code(code: u32) -> Option<ObjectType> {
        match code {
            0 => Some(ObjectType::SignedInteger),
            1 => Some(ObjectType::UnsignedInteger),
            2 => Some(ObjectType::Float),
            3 => Some(ObjectType::Double),
            4 => Some(ObjectType::String),
            5 => Some(ObjectType::Composite),
            _ => None,
        }
    }

    /// Returns the XML element name for this type.
    pub fn element_name(self) -> Option<&'static str> {
        match self {
            ObjectType::SignedInteger => Some("signed"),
            ObjectType::UnsignedInteger => Some("unsigned"),
            ObjectType::Float => Some("float"),
            ObjectType::Double => Some("double"),
            ObjectType::String => Some("string"),
            ObjectType::Composite => Some("composite"),
            ObjectType::Unused => None,
        }
    }

    /// Creates an ObjectType from its XML element name.
    pub fn from_element_name(name: &[u8]) -> Option<ObjectType> {
        match name {
            b"signed" => Some(ObjectType::SignedInteger),
            b"unsigned" => Some(ObjectType::UnsignedInteger),
            b"float" => Some(ObjectType::Float),
            b"double" => Some(ObjectType::Double),
            b"string" => Some(ObjectType::String),
            b"composite" => Some(ObjectType::Composite),
            _ => None,
        }
    }
}
