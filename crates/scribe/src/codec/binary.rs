//! Binary archive codec.
//!
//! Wire layout:
//!
//! ```text
//! [signature bytes][format_version: varint][scribe_version: varint]
//! { transcription }*
//! ```
//!
//! Each transcription uses the count-prefixed layout from
//! [`stream`](crate::codec::stream) with varint integers, zig-zag signed
//! integers, raw little-endian floats and length-prefixed strings.

use std::io::{Read, Write};

use tracing::debug;

use crate::codec::primitives::{Reader, Writer};
use crate::codec::stream::{self, PrimitiveRead, PrimitiveWrite};
use crate::codec::{ArchiveReader, ArchiveWriter};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{BINARY_FORMAT_VERSION, BINARY_SIGNATURE, DecodeLimits, SCRIBE_VERSION};
use crate::model::Transcription;

impl<W: Write + ?Sized> PrimitiveWrite for Writer<'_, W> {
    fn write_unsigned(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_varint(value)
    }

    fn write_signed(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_signed_varint(value)
    }

    fn write_float(&mut self, value: f32) -> Result<(), EncodeError> {
        self.write_f32(value)
    }

    fn write_double(&mut self, value: f64) -> Result<(), EncodeError> {
        self.write_f64(value)
    }

    fn write_string(&mut self, value: &str) -> Result<(), EncodeError> {
        Writer::write_string(self, value)
    }
}

impl<R: Read + ?Sized> PrimitiveRead for Reader<'_, R> {
    fn read_unsigned(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        self.read_varint(context)
    }

    fn read_signed(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        self.read_signed_varint(context)
    }

    fn read_float(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        self.read_f32(context)
    }

    fn read_double(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        self.read_f64(context)
    }

    fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        Reader::read_string(self, max_len, field)
    }
}

/// Writes transcriptions to a binary archive.
///
/// The header is written on construction. The writer borrows the stream and
/// does not buffer.
#[derive(Debug)]
pub struct BinaryArchiveWriter<'a, W: Write + ?Sized> {
    writer: Writer<'a, W>,
}

impl<'a, W: Write + ?Sized> BinaryArchiveWriter<'a, W> {
    /// Writes the archive header and returns the writer.
    pub fn new(output: &'a mut W) -> Result<Self, EncodeError> {
        let mut writer = Writer::new(output);
        // One byte at a time, never as a length-prefixed string.
        for &byte in BINARY_SIGNATURE {
            writer.write_byte(byte)?;
        }
        writer.write_varint(BINARY_FORMAT_VERSION)?;
        writer.write_varint(SCRIBE_VERSION)?;
        debug!(
            format_version = BINARY_FORMAT_VERSION,
            scribe_version = SCRIBE_VERSION,
            "wrote binary archive header"
        );
        Ok(Self { writer })
    }
}

impl<W: Write + ?Sized> ArchiveWriter for BinaryArchiveWriter<'_, W> {
    fn write_transcription(&mut self, transcription: &Transcription) -> Result<(), EncodeError> {
        stream::write_transcription(&mut self.writer, transcription)
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        self.writer.flush()
    }
}

/// Reads transcriptions from a binary archive.
#[derive(Debug)]
pub struct BinaryArchiveReader<'a, R: Read + ?Sized> {
    reader: Reader<'a, R>,
    format_version: u32,
    scribe_version: u32,
    limits: DecodeLimits,
}

impl<'a, R: Read + ?Sized> BinaryArchiveReader<'a, R> {
    /// Reads and validates the archive header.
    pub fn new(input: &'a mut R) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(input);

        for &expected in BINARY_SIGNATURE {
            let byte = reader.read_byte("signature")?;
            if byte != expected {
                return Err(DecodeError::InvalidSignature { format: "binary" });
            }
        }

        let format_version = reader.read_varint("format_version")?;
        if format_version > BINARY_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "binary",
                which: "format",
                version: format_version,
                supported: BINARY_FORMAT_VERSION,
            });
        }
        let scribe_version = reader.read_varint("scribe_version")?;
        if scribe_version > SCRIBE_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "binary",
                which: "scribe",
                version: scribe_version,
                supported: SCRIBE_VERSION,
            });
        }

        debug!(format_version, scribe_version, "read binary archive header");
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
}

impl<R: Read + ?Sized> ArchiveReader for BinaryArchiveReader<'_, R> {
    fn read_transcription(&mut self) -> Result<Transcription, DecodeError> {
        stream::read_transcription(&mut self.reader, &self.limits)
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn format_version(&self) -> u32 {
        self.format_version
    }

    fn scribe_version(&self) -> u32 {
        self.scribe_version
    }
}
