//! Archive signatures, format versions and decode limits.
//!
//! The decode limits bound every count read from an archive so that a
//! corrupt or hostile stream cannot trigger an unbounded allocation.

/// Signature at the start of every binary archive.
pub const BINARY_SIGNATURE: &[u8] = b"ScribeBinaryArchive";

/// Signature at the start of every text archive.
pub const TEXT_SIGNATURE: &[u8] = b"ScribeTextArchive";

/// Value of the `signature` attribute on the XML root element.
pub const XML_SIGNATURE: &str = "ScribeXmlArchive";

/// Current binary format version.
pub const BINARY_FORMAT_VERSION: u32 = 1;

/// Current text format version.
pub const TEXT_FORMAT_VERSION: u32 = 1;

/// Current XML format version.
pub const XML_FORMAT_VERSION: u32 = 1;

/// Current protocol ("scribe") version.
///
/// This versions the meaning of transcribed objects rather than the wire
/// framing, and is exposed to callers so they can read older layouts.
pub const SCRIBE_VERSION: u32 = 1;

/// Maximum bytes for a 32-bit varint.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Maximum byte length of a tag name or unique string.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum number of object ids (slots) in one transcription.
pub const MAX_OBJECT_IDS: u32 = 64 * 1024 * 1024;

/// Maximum number of object tag names in one transcription.
pub const MAX_TAG_NAMES: u32 = 1024 * 1024;

/// Maximum number of unique strings in one transcription.
pub const MAX_UNIQUE_STRINGS: u32 = 16 * 1024 * 1024;

/// Maximum number of children under a single composite object key.
pub const MAX_CHILDREN_PER_KEY: u32 = 64 * 1024 * 1024;

/// Limits applied by archive readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_string_len: usize,
    pub max_object_ids: u32,
    pub max_tag_names: u32,
    pub max_unique_strings: u32,
    pub max_children_per_key: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_string_len: MAX_STRING_LEN,
            max_object_ids: MAX_OBJECT_IDS,
            max_tag_names: MAX_TAG_NAMES,
            max_unique_strings: MAX_UNIQUE_STRINGS,
            max_children_per_key: MAX_CHILDREN_PER_KEY,
        }
    }
}
