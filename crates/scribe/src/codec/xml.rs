//! XML archive codec.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
//!   <scribe_transcription>
//!     <scribe_object_tag_group>
//!       <tag>count</tag>
//!     </scribe_object_tag_group>
//!     <scribe_string_group>
//!       <str>hello</str>
//!     </scribe_string_group>
//!     <scribe_object_group>
//!       <composite id="0">
//!         <key>
//!           <tag_id>0</tag_id>
//!           <tag_version>0</tag_version>
//!           <oid>1</oid>
//!         </key>
//!       </composite>
//!       <unsigned id="1">42</unsigned>
//!     </scribe_object_group>
//!   </scribe_transcription>
//! </scribe_serialization>
//! ```
//!
//! Groups are not count-prefixed; the reader detects the end of a group by
//! optional start-element lookahead. An `<oid>` may carry an explicit
//! `index` attribute, in which case the child is placed at that position.
//!
//! Tag names and strings must consist of characters allowed by XML 1.0.
//! Control characters other than tab, line feed and carriage return are
//! rejected with [`EncodeError::InvalidXmlChar`]; use the binary or text
//! codec for such data.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;

use crate::codec::primitives::{
    format_f32, format_f64, parse_f32, parse_f64, parse_i32, parse_u32,
};
use crate::codec::stream::object_runs;
use crate::codec::{ArchiveReader, ArchiveWriter};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{DecodeLimits, SCRIBE_VERSION, XML_FORMAT_VERSION, XML_SIGNATURE};
use crate::model::{ObjectId, ObjectKey, ObjectType, Transcription};

const ROOT: &str = "scribe_serialization";
const TRANSCRIPTION: &str = "scribe_transcription";
const TAG_GROUP: &str = "scribe_object_tag_group";
const STRING_GROUP: &str = "scribe_string_group";
const OBJECT_GROUP: &str = "scribe_object_group";

/// Options for [`XmlArchiveWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlWriteOptions {
    /// Spaces per nesting level, or `None` for a single-line document.
    pub indent: Option<usize>,
}

impl Default for XmlWriteOptions {
    fn default() -> Self {
        Self { indent: Some(2) }
    }
}

// =============================================================================
// ENCODING
// =============================================================================

fn xml_write_error(err: impl std::fmt::Display) -> EncodeError {
    EncodeError::Xml(err.to_string())
}

/// True for characters matching the XML 1.0 `Char` production.
fn is_xml_char(ch: char) -> bool {
    matches!(ch, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
        || ch >= '\u{10000}'
}

fn check_xml_text(field: &'static str, text: &str) -> Result<(), EncodeError> {
    match text.chars().find(|&ch| !is_xml_char(ch)) {
        Some(ch) => Err(EncodeError::InvalidXmlChar { field, ch }),
        None => Ok(()),
    }
}

/// Writes transcriptions to an XML archive.
///
/// The XML declaration and root start element are written on construction;
/// [`close`](ArchiveWriter::close) writes the root end element.
pub struct XmlArchiveWriter<'a, W: Write + ?Sized> {
    writer: quick_xml::Writer<&'a mut W>,
    closed: bool,
}

impl<'a, W: Write + ?Sized> XmlArchiveWriter<'a, W> {
    /// Writes the document header with default options.
    pub fn new(output: &'a mut W) -> Result<Self, EncodeError> {
        Self::with_options(output, XmlWriteOptions::default())
    }

    /// Writes the document header.
    pub fn with_options(output: &'a mut W, options: XmlWriteOptions) -> Result<Self, EncodeError> {
        let writer = match options.indent {
            Some(indent) => quick_xml::Writer::new_with_indent(output, b' ', indent),
            None => quick_xml::Writer::new(output),
        };
        let mut this = Self {
            writer,
            closed: false,
        };

        this.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let format_version = XML_FORMAT_VERSION.to_string();
        let scribe_version = SCRIBE_VERSION.to_string();
        this.event(Event::Start(BytesStart::new(ROOT).with_attributes([
            ("signature", XML_SIGNATURE),
            ("xml_version", format_version.as_str()),
            ("scribe_version", scribe_version.as_str()),
        ])))?;

        debug!(
            format_version = XML_FORMAT_VERSION,
            scribe_version = SCRIBE_VERSION,
            "wrote xml archive header"
        );
        Ok(this)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), EncodeError> {
        self.writer.write_event(event).map_err(xml_write_error)
    }

    fn start(&mut self, name: &str) -> Result<(), EncodeError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), EncodeError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    /// Writes `<name>text</name>`. The text event is always written so that
    /// an empty value stays on one line.
    fn text_element(&mut self, start: BytesStart<'_>, text: &str) -> Result<(), EncodeError> {
        let end = start.to_end().into_owned();
        self.event(Event::Start(start))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.event(Event::End(end))
    }

    fn write_object(&mut self, transcription: &Transcription, id: ObjectId) -> Result<(), EncodeError> {
        let object_type = transcription.object_type(id)?;
        let Some(name) = object_type.element_name() else {
            return Ok(());
        };
        let id_text = id.to_string();
        let start = BytesStart::new(name).with_attributes([("id", id_text.as_str())]);

        let value = match object_type {
            ObjectType::SignedInteger => transcription.signed_integer(id)?.to_string(),
            ObjectType::UnsignedInteger => transcription.unsigned_integer(id)?.to_string(),
            ObjectType::Float => format_f32(transcription.float(id)?),
            ObjectType::Double => format_f64(transcription.double(id)?),
            ObjectType::String => transcription.string_object(id)?.to_string(),
            ObjectType::Composite => {
                self.event(Event::Start(start))?;
                for entry in transcription.composite_object(id)?.entries() {
                    let (key, children) = entry?;
                    self.start("key")?;
                    self.text_element(BytesStart::new("tag_id"), &key.tag_name_id.to_string())?;
                    self.text_element(BytesStart::new("tag_version"), &key.tag_version.to_string())?;
                    for child in children {
                        self.text_element(BytesStart::new("oid"), &child.to_string())?;
                    }
                    self.end("key")?;
                }
                return self.end(name);
            }
            ObjectType::Unused => return Ok(()),
        };
        self.text_element(start, &value)
    }
}

impl<W: Write + ?Sized> ArchiveWriter for XmlArchiveWriter<'_, W> {
    fn write_transcription(&mut self, transcription: &Transcription) -> Result<(), EncodeError> {
        self.start(TRANSCRIPTION)?;

        self.start(TAG_GROUP)?;
        for tag_id in 0..transcription.num_object_tag_names() as u32 {
            let name = transcription.object_tag_name(tag_id)?;
            check_xml_text("object tag name", name)?;
            self.text_element(BytesStart::new("tag"), name)?;
        }
        self.end(TAG_GROUP)?;

        self.start(STRING_GROUP)?;
        for index in 0..transcription.num_unique_strings() as u32 {
            let value = transcription.unique_string(index)?;
            check_xml_text("unique string", value)?;
            self.text_element(BytesStart::new("str"), value)?;
        }
        self.end(STRING_GROUP)?;

        self.start(OBJECT_GROUP)?;
        for (start, count) in object_runs(transcription) {
            for id in start..start + count {
                self.write_object(transcription, id)?;
            }
        }
        self.end(OBJECT_GROUP)?;

        self.end(TRANSCRIPTION)?;
        debug!(
            tags = transcription.num_object_tag_names(),
            strings = transcription.num_unique_strings(),
            objects = transcription.num_used_object_ids(),
            "wrote xml transcription"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        if !self.closed {
            self.end(ROOT)?;
            self.closed = true;
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

// =============================================================================
// DECODING
// =============================================================================

fn xml_read_error(err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Xml(err.to_string())
}

fn describe(event: &Event<'_>) -> String {
    match event {
        Event::Start(e) => format!("<{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::End(e) => format!("</{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::Text(_) | Event::CData(_) => "text".to_string(),
        Event::Eof => "end of document".to_string(),
        _ => "markup".to_string(),
    }
}

/// Reads the value of a required attribute.
fn attribute(
    start: &BytesStart<'_>,
    element: &'static str,
    name: &'static str,
) -> Result<String, DecodeError> {
    let attr = start
        .try_get_attribute(name)
        .map_err(xml_read_error)?
        .ok_or(DecodeError::MissingAttribute {
            element,
            attribute: name,
        })?;
    Ok(attr.unescape_value().map_err(xml_read_error)?.into_owned())
}

/// Pull parser over element and text events with one event of lookahead.
struct PullReader<'a, R: BufRead + ?Sized> {
    reader: quick_xml::Reader<&'a mut R>,
    buf: Vec<u8>,
    peeked: Option<Event<'static>>,
}

impl<'a, R: BufRead + ?Sized> PullReader<'a, R> {
    fn new(input: &'a mut R) -> Self {
        let mut reader = quick_xml::Reader::from_reader(input);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            buf: Vec::new(),
            peeked: None,
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>, DecodeError> {
        if let Some(event) = self.peeked.take() {
            return Ok(event);
        }
        self.buf.clear();
        let event = self
            .reader
            .read_event_into(&mut self.buf)
            .map_err(xml_read_error)?;
        Ok(event.into_owned())
    }

    fn push_back(&mut self, event: Event<'static>) {
        self.peeked = Some(event);
    }

    /// Returns the next event that is not whitespace, a comment, or a
    /// declaration.
    fn next_element_event(&mut self) -> Result<Event<'static>, DecodeError> {
        loop {
            match self.next_event()? {
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
                event => return Ok(event),
            }
        }
    }

    fn read_start(&mut self, name: &'static str) -> Result<BytesStart<'static>, DecodeError> {
        match self.next_element_event()? {
            Event::Start(start) if start.name().as_ref() == name.as_bytes() => Ok(start),
            other => Err(DecodeError::UnexpectedElement {
                expected: name.to_string(),
                found: describe(&other),
            }),
        }
    }

    /// Consumes `<name>` if it is the next element, else leaves the stream
    /// untouched.
    fn read_optional_start(
        &mut self,
        name: &'static str,
    ) -> Result<Option<BytesStart<'static>>, DecodeError> {
        match self.next_element_event()? {
            Event::Start(start) if start.name().as_ref() == name.as_bytes() => Ok(Some(start)),
            other => {
                self.push_back(other);
                Ok(None)
            }
        }
    }

    /// Consumes the next start element of any name, if there is one.
    fn read_optional_any_start(&mut self) -> Result<Option<BytesStart<'static>>, DecodeError> {
        match self.next_element_event()? {
            Event::Start(start) => Ok(Some(start)),
            other => {
                self.push_back(other);
                Ok(None)
            }
        }
    }

    fn read_end(&mut self, name: &str) -> Result<(), DecodeError> {
        match self.next_element_event()? {
            Event::End(end) if end.name().as_ref() == name.as_bytes() => Ok(()),
            other => Err(DecodeError::UnexpectedElement {
                expected: format!("/{name}"),
                found: describe(&other),
            }),
        }
    }

    /// Reads the text content up to the next end element, leaving the end
    /// element unread. Whitespace is preserved.
    fn read_text(&mut self, context: &'static str) -> Result<String, DecodeError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(xml_read_error)?),
                Event::CData(data) => {
                    let raw = String::from_utf8(data.into_inner().into_owned())
                        .map_err(|_| DecodeError::InvalidUtf8 { field: context })?;
                    text.push_str(&raw);
                }
                Event::Comment(_) | Event::PI(_) => {}
                Event::End(end) => {
                    self.push_back(Event::End(end));
                    return Ok(text);
                }
                Event::Eof => return Err(DecodeError::UnexpectedEof { context }),
                other => {
                    return Err(DecodeError::UnexpectedElement {
                        expected: format!("text of {context}"),
                        found: describe(&other),
                    });
                }
            }
        }
    }

    /// Reads `<name>text</name>`.
    fn read_text_element(&mut self, name: &'static str) -> Result<String, DecodeError> {
        self.read_start(name)?;
        let text = self.read_text(name)?;
        self.read_end(name)?;
        Ok(text)
    }
}

/// Reads transcriptions from an XML archive.
pub struct XmlArchiveReader<'a, R: BufRead + ?Sized> {
    reader: PullReader<'a, R>,
    format_version: u32,
    scribe_version: u32,
    limits: DecodeLimits,
}

impl<'a, R: BufRead + ?Sized> XmlArchiveReader<'a, R> {
    /// Reads and validates the root element.
    pub fn new(input: &'a mut R) -> Result<Self, DecodeError> {
        let mut reader = PullReader::new(input);

        let root = match reader.next_element_event()? {
            Event::Start(start) if start.name().as_ref() == ROOT.as_bytes() => start,
            _ => return Err(DecodeError::InvalidSignature { format: "xml" }),
        };
        if attribute(&root, ROOT, "signature")? != XML_SIGNATURE {
            return Err(DecodeError::InvalidSignature { format: "xml" });
        }

        let format_version = parse_u32(&attribute(&root, ROOT, "xml_version")?, "xml_version")?;
        if format_version > XML_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "xml",
                which: "format",
                version: format_version,
                supported: XML_FORMAT_VERSION,
            });
        }
        let scribe_version =
            parse_u32(&attribute(&root, ROOT, "scribe_version")?, "scribe_version")?;
        if scribe_version > SCRIBE_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "xml",
                which: "scribe",
                version: scribe_version,
                supported: SCRIBE_VERSION,
            });
        }

        debug!(format_version, scribe_version, "read xml archive header");
        Ok(Self {
            reader,
            format_version,
            scribe_version,
            limits: DecodeLimits::default(),
        })
    }

    /// Replaces the decode limits.
    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    fn read_tags(&mut self, transcription: &mut Transcription) -> Result<(), DecodeError> {
        self.reader.read_start(TAG_GROUP)?;
        while self.reader.read_optional_start("tag")?.is_some() {
            let name = self.read_limited_text("tag")?;
            self.reader.read_end("tag")?;
            transcription.add_object_tag_name(&name)?;
            check_limit(
                "object tag names",
                transcription.num_object_tag_names(),
                self.limits.max_tag_names,
            )?;
        }
        self.reader.read_end(TAG_GROUP)
    }

    fn read_strings(&mut self, transcription: &mut Transcription) -> Result<(), DecodeError> {
        self.reader.read_start(STRING_GROUP)?;
        while self.reader.read_optional_start("str")?.is_some() {
            let value = self.read_limited_text("str")?;
            self.reader.read_end("str")?;
            transcription.add_unique_string(&value)?;
            check_limit(
                "unique strings",
                transcription.num_unique_strings(),
                self.limits.max_unique_strings,
            )?;
        }
        self.reader.read_end(STRING_GROUP)
    }

    fn read_limited_text(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let text = self.reader.read_text(field)?;
        if text.len() > self.limits.max_string_len {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len: text.len(),
                max: self.limits.max_string_len,
            });
        }
        Ok(text)
    }

    fn read_objects(&mut self, transcription: &mut Transcription) -> Result<(), DecodeError> {
        self.reader.read_start(OBJECT_GROUP)?;
        while let Some(start) = self.reader.read_optional_any_start()? {
            let object_type = ObjectType::from_element_name(start.name().as_ref()).ok_or_else(|| {
                DecodeError::UnexpectedElement {
                    expected: "object element".to_string(),
                    found: describe(&Event::Start(start.clone())),
                }
            })?;
            let element = object_type.element_name().unwrap_or("object");
            let id = parse_u32(attribute(&start, element, "id")?.trim(), "object id")?;
            if id >= self.limits.max_object_ids {
                return Err(DecodeError::LengthExceedsLimit {
                    field: "object ids",
                    len: id as usize + 1,
                    max: self.limits.max_object_ids as usize,
                });
            }

            match object_type {
                ObjectType::SignedInteger => {
                    let value = parse_i32(self.reader.read_text(element)?.trim(), "signed_integer")?;
                    transcription.add_signed_integer(id, value)?;
                }
                ObjectType::UnsignedInteger => {
                    let value = parse_u32(self.reader.read_text(element)?.trim(), "unsigned_integer")?;
                    transcription.add_unsigned_integer(id, value)?;
                }
                ObjectType::Float => {
                    let value = parse_f32(self.reader.read_text(element)?.trim(), "float")?;
                    transcription.add_float(id, value)?;
                }
                ObjectType::Double => {
                    let value = parse_f64(self.reader.read_text(element)?.trim(), "double")?;
                    transcription.add_double(id, value)?;
                }
                ObjectType::String => {
                    let index = parse_u32(self.reader.read_text(element)?.trim(), "string_index")?;
                    let size = transcription.num_unique_strings();
                    if index as usize >= size {
                        return Err(DecodeError::IndexOutOfBounds {
                            dict: "unique strings",
                            index: index as usize,
                            size,
                        });
                    }
                    transcription.add_string_object(id, index)?;
                }
                ObjectType::Composite => self.read_composite(transcription, id)?,
                ObjectType::Unused => {}
            }
            self.reader.read_end(element)?;
        }
        self.reader.read_end(OBJECT_GROUP)
    }

    fn read_composite(
        &mut self,
        transcription: &mut Transcription,
        id: ObjectId,
    ) -> Result<(), DecodeError> {
        let num_tags = transcription.num_object_tag_names();
        let composite = transcription.add_composite_object(id)?;

        while self.reader.read_optional_start("key")?.is_some() {
            let tag_name_id = parse_u32(self.reader.read_text_element("tag_id")?.trim(), "tag_id")?;
            if tag_name_id as usize >= num_tags {
                return Err(DecodeError::IndexOutOfBounds {
                    dict: "object tag names",
                    index: tag_name_id as usize,
                    size: num_tags,
                });
            }
            let tag_version =
                parse_u32(self.reader.read_text_element("tag_version")?.trim(), "tag_version")?;
            let key = ObjectKey::new(tag_name_id, tag_version);

            let mut num_children = 0u32;
            while let Some(oid) = self.reader.read_optional_start("oid")? {
                let child = parse_u32(self.reader.read_text("oid")?.trim(), "child_id")?;
                self.reader.read_end("oid")?;
                match oid.try_get_attribute("index").map_err(xml_read_error)? {
                    Some(index) => {
                        let index = parse_u32(
                            &index.unescape_value().map_err(xml_read_error)?,
                            "child index",
                        )?;
                        if index >= self.limits.max_children_per_key {
                            return Err(DecodeError::LengthExceedsLimit {
                                field: "composite children",
                                len: index as usize + 1,
                                max: self.limits.max_children_per_key as usize,
                            });
                        }
                        composite.set_child(key, child, index)?;
                    }
                    None => composite.add_child(key, child)?,
                }
                num_children += 1;
                check_limit(
                    "composite children",
                    num_children as usize,
                    self.limits.max_children_per_key,
                )?;
            }
            if num_children == 0 {
                return Err(DecodeError::EmptyKey { id });
            }
            self.reader.read_end("key")?;
        }
        Ok(())
    }
}

fn check_limit(field: &'static str, len: usize, max: u32) -> Result<(), DecodeError> {
    if len > max as usize {
        return Err(DecodeError::LengthExceedsLimit {
            field,
            len,
            max: max as usize,
        });
    }
    Ok(())
}

impl<R: BufRead + ?Sized> ArchiveReader for XmlArchiveReader<'_, R> {
    fn read_transcription(&mut self) -> Result<Transcription, DecodeError> {
        let mut transcription = Transcription::new();
        self.reader.read_start(TRANSCRIPTION)?;
        self.read_tags(&mut transcription)?;
        self.read_strings(&mut transcription)?;
        self.read_objects(&mut transcription)?;
        self.reader.read_end(TRANSCRIPTION)?;

        debug!(
            tags = transcription.num_object_tag_names(),
            strings = transcription.num_unique_strings(),
            objects = transcription.num_used_object_ids(),
            "read xml transcription"
        );
        Ok(transcription)
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        self.reader.read_end(ROOT)
    }

    fn format_version(&self) -> u32 {
        self.format_version
    }

    fn scribe_version(&self) -> u32 {
        self.scribe_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::UNUSED_OBJECT_ID;

    fn encode(t: &Transcription, options: XmlWriteOptions) -> String {
        let mut bytes = Vec::new();
        let mut writer = XmlArchiveWriter::with_options(&mut bytes, options).unwrap();
        writer.write_transcription(t).unwrap();
        writer.close().unwrap();
        String::from_utf8(bytes).unwrap()
    }

    fn decode(xml: &str) -> Result<Transcription, DecodeError> {
        let mut input = xml.as_bytes();
        let mut reader = XmlArchiveReader::new(&mut input)?;
        let t = reader.read_transcription()?;
        reader.close()?;
        Ok(t)
    }

    fn sample() -> Transcription {
        let mut t = Transcription::new();
        let count = t.get_or_create_object_key("count", 0);
        let name = t.get_or_create_object_key("name", 0);
        let composite = t.add_composite_object(0).unwrap();
        composite.add_child(count, 1).unwrap();
        composite.add_child(name, 2).unwrap();
        t.add_unsigned_integer(1, 42).unwrap();
        t.add_string(2, "hello").unwrap();
        t
    }

    #[test]
    fn test_compact_layout() {
        let xml = encode(&sample(), XmlWriteOptions { indent: None });
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(
            "<scribe_serialization signature=\"ScribeXmlArchive\" xml_version=\"1\" scribe_version=\"1\">"
        ));
        assert!(xml.contains(
            "<composite id=\"0\"><key><tag_id>0</tag_id><tag_version>0</tag_version><oid>1</oid></key>"
        ));
        assert!(xml.contains("<unsigned id=\"1\">42</unsigned>"));
        assert!(xml.contains("<string id=\"2\">0</string>"));
        assert!(xml.ends_with("</scribe_serialization>"));
    }

    #[test]
    fn test_roundtrip_indented_and_compact() {
        let t = sample();
        for indent in [None, Some(2), Some(4)] {
            let xml = encode(&t, XmlWriteOptions { indent });
            assert_eq!(decode(&xml).unwrap(), t);
        }
    }

    #[test]
    fn test_strings_preserve_whitespace_and_markup() {
        let mut t = Transcription::new();
        t.add_string(0, "  padded  ").unwrap();
        t.add_string(1, "a < b && c > \"d\"").unwrap();
        t.add_string(2, "").unwrap();
        t.add_string(3, "line\nbreak").unwrap();

        let decoded = decode(&encode(&t, XmlWriteOptions::default())).unwrap();
        assert_eq!(decoded.string(0).unwrap(), "  padded  ");
        assert_eq!(decoded.string(1).unwrap(), "a < b && c > \"d\"");
        assert_eq!(decoded.string(2).unwrap(), "");
        assert_eq!(decoded.string(3).unwrap(), "line\nbreak");
    }

    #[test]
    fn test_non_finite_floats() {
        let mut t = Transcription::new();
        t.add_float(0, f32::INFINITY).unwrap();
        t.add_double(1, f64::NEG_INFINITY).unwrap();
        t.add_double(2, f64::NAN).unwrap();

        let xml = encode(&t, XmlWriteOptions::default());
        assert!(xml.contains("<float id=\"0\">inf</float>"));
        assert!(xml.contains("<double id=\"1\">-inf</double>"));
        assert!(xml.contains("<double id=\"2\">nan</double>"));

        let decoded = decode(&xml).unwrap();
        assert_eq!(decoded.float(0).unwrap(), f32::INFINITY);
        assert_eq!(decoded.double(1).unwrap(), f64::NEG_INFINITY);
        assert!(decoded.double(2).unwrap().is_nan());
    }

    #[test]
    fn test_comments_and_explicit_indices() {
        let xml = r#"<?xml version="1.0"?>
            <!-- produced by hand -->
            <scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
              <scribe_transcription>
                <scribe_object_tag_group><tag>items</tag></scribe_object_tag_group>
                <scribe_string_group/>
                <scribe_object_group>
                  <!-- array with a hole at index 1 -->
                  <composite id="0">
                    <key>
                      <tag_id>0</tag_id>
                      <tag_version>0</tag_version>
                      <oid index="2">2</oid>
                      <oid index="0">1</oid>
                    </key>
                  </composite>
                  <signed id="1">-5</signed>
                  <signed id="2">7</signed>
                </scribe_object_group>
              </scribe_transcription>
            </scribe_serialization>"#;

        let t = decode(xml).unwrap();
        let key = ObjectKey::new(0, 0);
        let composite = t.composite_object(0).unwrap();
        assert_eq!(composite.num_children_with_key(key).unwrap(), 3);
        assert_eq!(composite.child(key, 0).unwrap(), 1);
        assert_eq!(composite.child(key, 1).unwrap(), UNUSED_OBJECT_ID);
        assert_eq!(composite.child(key, 2).unwrap(), 2);
        assert_eq!(t.signed_integer(1).unwrap(), -5);
    }

    #[test]
    fn test_invalid_signature() {
        let xml = r#"<scribe_serialization signature="Other" xml_version="1" scribe_version="1"/>"#;
        assert!(matches!(
            decode(xml),
            Err(DecodeError::InvalidSignature { format: "xml" })
        ));
        assert!(matches!(
            decode("<other/>"),
            Err(DecodeError::InvalidSignature { format: "xml" })
        ));
    }

    #[test]
    fn test_future_version() {
        let xml = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="9">"#;
        assert!(matches!(
            decode(xml),
            Err(DecodeError::UnsupportedVersion { which: "scribe", version: 9, .. })
        ));
    }

    #[test]
    fn test_unknown_object_element() {
        let xml = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group/>
              <scribe_string_group/>
              <scribe_object_group><int64 id="0">5</int64></scribe_object_group>
            </scribe_transcription>
            </scribe_serialization>"#;
        assert!(matches!(
            decode(xml),
            Err(DecodeError::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn test_missing_id_attribute() {
        let xml = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group/>
              <scribe_string_group/>
              <scribe_object_group><signed>5</signed></scribe_object_group>
            </scribe_transcription>
            </scribe_serialization>"#;
        assert!(matches!(
            decode(xml),
            Err(DecodeError::MissingAttribute { element: "signed", attribute: "id" })
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let xml = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group><tag>a</tag></scribe_object_tag_group>
              <scribe_string_group/>
              <scribe_object_group>
                <composite id="0"><key><tag_id>0</tag_id><tag_version>0</tag_version></key></composite>
              </scribe_object_group>
            </scribe_transcription>
            </scribe_serialization>"#;
        assert!(matches!(decode(xml), Err(DecodeError::EmptyKey { id: 0 })));
    }

    #[test]
    fn test_duplicate_object_is_format_error() {
        let xml = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group/>
              <scribe_string_group/>
              <scribe_object_group>
                <signed id="0">1</signed>
                <double id="0">2.5</double>
              </scribe_object_group>
            </scribe_transcription>
            </scribe_serialization>"#;
        let Err(err) = decode(xml) else {
            panic!("duplicate object id accepted");
        };
        assert!(matches!(err, DecodeError::DuplicateObject { id: 0 }));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_duplicate_dictionary_entries_are_format_errors() {
        let tags = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group><tag>a</tag><tag>a</tag></scribe_object_tag_group>
              <scribe_string_group/>
              <scribe_object_group/>
            </scribe_transcription>
            </scribe_serialization>"#;
        let Err(err) = decode(tags) else {
            panic!("duplicate tag name accepted");
        };
        assert!(matches!(
            err,
            DecodeError::DuplicateEntry { dict: "object tag names", .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);

        let strings = r#"<scribe_serialization signature="ScribeXmlArchive" xml_version="1" scribe_version="1">
            <scribe_transcription>
              <scribe_object_tag_group/>
              <scribe_string_group><str>x</str><str>x</str></scribe_string_group>
              <scribe_object_group/>
            </scribe_transcription>
            </scribe_serialization>"#;
        let Err(err) = decode(strings) else {
            panic!("duplicate unique string accepted");
        };
        assert!(matches!(
            err,
            DecodeError::DuplicateEntry { dict: "unique strings", .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_control_characters_rejected() {
        let mut t = Transcription::new();
        t.add_string(0, "bell\u{7}").unwrap();
        let mut bytes = Vec::new();
        let mut writer = XmlArchiveWriter::new(&mut bytes).unwrap();
        let Err(err) = writer.write_transcription(&t) else {
            panic!("control character written");
        };
        assert!(matches!(
            err,
            EncodeError::InvalidXmlChar { field: "unique string", ch: '\u{7}' }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);

        let mut t = Transcription::new();
        t.get_or_create_object_key("nul\u{0}", 0);
        let mut bytes = Vec::new();
        let mut writer = XmlArchiveWriter::new(&mut bytes).unwrap();
        assert!(matches!(
            writer.write_transcription(&t),
            Err(EncodeError::InvalidXmlChar { field: "object tag name", ch: '\u{0}' })
        ));

        assert!(is_xml_char('\t') && is_xml_char('\r') && is_xml_char('\u{1F600}'));
        assert!(!is_xml_char('\u{FFFE}'));
    }
}
