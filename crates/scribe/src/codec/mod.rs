//! Archive encoding/decoding.
//!
//! Three interchangeable codecs share one abstract layout: a header
//! (signature, format version, scribe version) followed by any number of
//! transcriptions.
//!
//! - [`binary`]: varint integers, raw floats; compact and fast
//! - [`text`]: space-separated decimal tokens; diffable
//! - [`xml`]: element tree; inspectable with standard tools
//!
//! Readers and writers borrow the stream they are given and never outlive it.

pub mod binary;
pub mod primitives;
pub(crate) mod stream;
pub mod text;
pub mod xml;

use std::io::{BufRead, Write};

use crate::error::{DecodeError, EncodeError};
use crate::limits::{BINARY_SIGNATURE, TEXT_SIGNATURE};
use crate::model::Transcription;

pub use binary::{BinaryArchiveReader, BinaryArchiveWriter};
pub use primitives::{Reader, Writer, zigzag_decode, zigzag_encode};
pub use text::{TextArchiveReader, TextArchiveWriter};
pub use xml::{XmlArchiveReader, XmlArchiveWriter, XmlWriteOptions};

/// Sink for transcriptions in one archive format.
pub trait ArchiveWriter {
    /// Appends one transcription to the archive.
    fn write_transcription(&mut self, transcription: &Transcription) -> Result<(), EncodeError>;

    /// Finishes the archive and flushes the stream.
    ///
    /// Must be called once after the last transcription; XML archives are not
    /// well formed until it is.
    fn close(&mut self) -> Result<(), EncodeError>;
}

/// Source of transcriptions in one archive format.
pub trait ArchiveReader {
    /// Reads the next transcription.
    ///
    /// On error the stream position is unspecified and the reader should be
    /// discarded.
    fn read_transcription(&mut self) -> Result<Transcription, DecodeError>;

    /// Verifies the end of the archive where the format has one.
    fn close(&mut self) -> Result<(), DecodeError>;

    /// Format version found in the archive header.
    fn format_version(&self) -> u32;

    /// Scribe protocol version found in the archive header.
    fn scribe_version(&self) -> u32;
}

/// Archive wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Binary,
    Text,
    Xml,
}

impl ArchiveFormat {
    /// Short lowercase name, as used in error messages and tools.
    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Binary => "binary",
            ArchiveFormat::Text => "text",
            ArchiveFormat::Xml => "xml",
        }
    }

    /// Creates a writer, writing the archive header immediately.
    pub fn create_writer<'a, W: Write + ?Sized + 'a>(
        self,
        output: &'a mut W,
    ) -> Result<Box<dyn ArchiveWriter + 'a>, EncodeError> {
        Ok(match self {
            ArchiveFormat::Binary => Box::new(BinaryArchiveWriter::new(output)?),
            ArchiveFormat::Text => Box::new(TextArchiveWriter::new(output)?),
            ArchiveFormat::Xml => Box::new(XmlArchiveWriter::new(output)?),
        })
    }

    /// Creates a reader, reading and validating the archive header
    /// immediately.
    pub fn create_reader<'a, R: BufRead + ?Sized + 'a>(
        self,
        input: &'a mut R,
    ) -> Result<Box<dyn ArchiveReader + 'a>, DecodeError> {
        Ok(match self {
            ArchiveFormat::Binary => Box::new(BinaryArchiveReader::new(input)?),
            ArchiveFormat::Text => Box::new(TextArchiveReader::new(input)?),
            ArchiveFormat::Xml => Box::new(XmlArchiveReader::new(input)?),
        })
    }

    /// Guesses the format from the first bytes of an archive.
    pub fn detect(prefix: &[u8]) -> Option<ArchiveFormat> {
        if prefix.starts_with(BINARY_SIGNATURE) {
            return Some(ArchiveFormat::Binary);
        }
        if prefix.starts_with(TEXT_SIGNATURE) {
            return Some(ArchiveFormat::Text);
        }
        let body = prefix.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(prefix);
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => Some(ArchiveFormat::Xml),
            _ => None,
        }
    }

    /// Guesses the format from the buffered prefix of a stream without
    /// consuming it.
    pub fn detect_from<R: BufRead + ?Sized>(input: &mut R) -> Result<Option<ArchiveFormat>, DecodeError> {
        let prefix = input.fill_buf()?;
        Ok(Self::detect(prefix))
    }
}

/// Writes a complete archive holding `transcriptions`.
pub fn write_archive<W: Write + ?Sized>(
    format: ArchiveFormat,
    output: &mut W,
    transcriptions: &[Transcription],
) -> Result<(), EncodeError> {
    let mut writer = format.create_writer(output)?;
    for transcription in transcriptions {
        writer.write_transcription(transcription)?;
    }
    writer.close()
}

/// Reads `count` transcriptions from an archive of any format.
pub fn read_archive<R: BufRead + ?Sized>(
    input: &mut R,
    count: usize,
) -> Result<Vec<Transcription>, DecodeError> {
    let format = ArchiveFormat::detect_from(input)?
        .ok_or(DecodeError::InvalidSignature { format: "archive" })?;
    let mut reader = format.create_reader(input)?;
    let transcriptions = (0..count)
        .map(|_| reader.read_transcription())
        .collect::<Result<Vec<_>, _>>()?;
    reader.close()?;
    Ok(transcriptions)
}
