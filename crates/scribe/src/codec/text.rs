//! Text archive codec.
//!
//! Same logical layout as the binary codec, with every primitive written as
//! decimal text preceded by a single space. Records end with a newline, which
//! the reader treats as ordinary whitespace.
//!
//! Strings are written as ` <byte length> <raw bytes>` with no quoting or
//! escaping, so they may contain spaces and line breaks. Non-finite floats are
//! written as `inf`, `-inf` and `nan`.
//!
//! ```text
//! ScribeTextArchive 1 1
//!  2 5 count 4 name
//!  1 5 hello
//!  3 0
//!  5 2 0 0 1 1 1 0 1 2
//!  1 42
//!  4 0
//!  0
//! ```

use std::io::{self, Read, Write};

use tracing::debug;

use crate::codec::primitives::{
    format_f32, format_f64, parse_f32, parse_f64, parse_i32, parse_u32,
};
use crate::codec::stream::{self, PrimitiveRead, PrimitiveWrite};
use crate::codec::{ArchiveReader, ArchiveWriter};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{DecodeLimits, SCRIBE_VERSION, TEXT_FORMAT_VERSION, TEXT_SIGNATURE};
use crate::model::Transcription;

/// Longest numeric token accepted by the reader.
const MAX_TOKEN_LEN: usize = 64;

// =============================================================================
// ENCODING
// =============================================================================

struct TokenWriter<'a, W: Write + ?Sized> {
    output: &'a mut W,
}

impl<W: Write + ?Sized> TokenWriter<'_, W> {
    fn write_token(&mut self, token: impl std::fmt::Display) -> Result<(), EncodeError> {
        write!(self.output, " {token}")?;
        Ok(())
    }
}

impl<W: Write + ?Sized> PrimitiveWrite for TokenWriter<'_, W> {
    fn write_unsigned(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_token(value)
    }

    fn write_signed(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_token(value)
    }

    fn write_float(&mut self, value: f32) -> Result<(), EncodeError> {
        self.write_token(format_f32(value))
    }

    fn write_double(&mut self, value: f64) -> Result<(), EncodeError> {
        self.write_token(format_f64(value))
    }

    fn write_string(&mut self, value: &str) -> Result<(), EncodeError> {
        write!(self.output, " {} ", value.len())?;
        self.output.write_all(value.as_bytes())?;
        Ok(())
    }

    fn end_record(&mut self) -> Result<(), EncodeError> {
        self.output.write_all(b"\n")?;
        Ok(())
    }
}

/// Writes transcriptions to a text archive.
pub struct TextArchiveWriter<'a, W: Write + ?Sized> {
    writer: TokenWriter<'a, W>,
}

impl<'a, W: Write + ?Sized> TextArchiveWriter<'a, W> {
    /// Writes the archive header and returns the writer.
    pub fn new(output: &'a mut W) -> Result<Self, EncodeError> {
        let mut writer = TokenWriter { output };
        writer.output.write_all(TEXT_SIGNATURE)?;
        writer.write_unsigned(TEXT_FORMAT_VERSION)?;
        writer.write_unsigned(SCRIBE_VERSION)?;
        writer.end_record()?;
        debug!(
            format_version = TEXT_FORMAT_VERSION,
            scribe_version = SCRIBE_VERSION,
            "wrote text archive header"
        );
        Ok(Self { writer })
    }
}

impl<W: Write + ?Sized> ArchiveWriter for TextArchiveWriter<'_, W> {
    fn write_transcription(&mut self, transcription: &Transcription) -> Result<(), EncodeError> {
        stream::write_transcription(&mut self.writer, transcription)
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        self.writer.output.flush()?;
        Ok(())
    }
}

// =============================================================================
// DECODING
// =============================================================================

struct TokenReader<'a, R: Read + ?Sized> {
    input: &'a mut R,
}

impl<R: Read + ?Sized> TokenReader<'_, R> {
    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }

    /// Reads the next whitespace-delimited token, consuming exactly one
    /// trailing delimiter.
    fn read_token(&mut self, context: &'static str) -> Result<String, DecodeError> {
        let mut token = Vec::new();
        loop {
            match self.next_byte()? {
                None if token.is_empty() => return Err(DecodeError::UnexpectedEof { context }),
                None => break,
                Some(byte) if byte.is_ascii_whitespace() => {
                    if !token.is_empty() {
                        break;
                    }
                }
                Some(byte) => {
                    if token.len() == MAX_TOKEN_LEN {
                        return Err(DecodeError::LengthExceedsLimit {
                            field: context,
                            len: token.len() + 1,
                            max: MAX_TOKEN_LEN,
                        });
                    }
                    token.push(byte);
                }
            }
        }
        String::from_utf8(token).map_err(|_| DecodeError::InvalidUtf8 { field: context })
    }
}

impl<R: Read + ?Sized> PrimitiveRead for TokenReader<'_, R> {
    fn read_unsigned(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        parse_u32(&self.read_token(context)?, context)
    }

    fn read_signed(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        parse_i32(&self.read_token(context)?, context)
    }

    fn read_float(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        parse_f32(&self.read_token(context)?, context)
    }

    fn read_double(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        parse_f64(&self.read_token(context)?, context)
    }

    fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let len = parse_u32(&self.read_token(field)?, field)? as usize;
        if len > max_len {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len,
                max: max_len,
            });
        }
        let mut bytes = vec![0u8; len];
        self.input
            .read_exact(&mut bytes)
            .map_err(|e| DecodeError::from_io(e, field))?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }
}

/// Reads transcriptions from a text archive.
pub struct TextArchiveReader<'a, R: Read + ?Sized> {
    reader: TokenReader<'a, R>,
    format_version: u32,
    scribe_version: u32,
    limits: DecodeLimits,
}

impl<'a, R: Read + ?Sized> TextArchiveReader<'a, R> {
    /// Reads and validates the archive header.
    pub fn new(input: &'a mut R) -> Result<Self, DecodeError> {
        let mut reader = TokenReader { input };

        for &expected in TEXT_SIGNATURE {
            match reader.next_byte()? {
                Some(byte) if byte == expected => {}
                Some(_) => return Err(DecodeError::InvalidSignature { format: "text" }),
                None => return Err(DecodeError::UnexpectedEof { context: "signature" }),
            }
        }

        let format_version = reader.read_unsigned("format_version")?;
        if format_version > TEXT_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "text",
                which: "format",
                version: format_version,
                supported: TEXT_FORMAT_VERSION,
            });
        }
        let scribe_version = reader.read_unsigned("scribe_version")?;
        if scribe_version > SCRIBE_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                format: "text",
                which: "scribe",
                version: scribe_version,
                supported: SCRIBE_VERSION,
            });
        }

        debug!(format_version, scribe_version, "read text archive header");
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

impl<R: Read + ?Sized> ArchiveReader for TextArchiveReader<'_, R> {
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
