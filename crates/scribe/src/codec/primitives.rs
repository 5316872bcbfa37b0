//! Primitive encoding/decoding shared by the archive codecs.
//!
//! Implements 32-bit varints, zig-zag signed varints, raw IEEE-754 floats,
//! length-prefixed strings, and the locale-independent float tokens used by
//! the text and XML codecs.

use std::io::{Read, Write};

use crate::error::{DecodeError, EncodeError};
use crate::limits::MAX_VARINT32_BYTES;

// =============================================================================
// DECODING
// =============================================================================

/// Reader for binary primitives.
///
/// Borrows the underlying stream and performs no buffering of its own.
#[derive(Debug)]
pub struct Reader<'a, R: Read + ?Sized> {
    input: &'a mut R,
}

impl<'a, R: Read + ?Sized> Reader<'a, R> {
    /// Creates a new reader over a stream.
    pub fn new(input: &'a mut R) -> Self {
        Self { input }
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let mut byte = [0u8; 1];
        self.input
            .read_exact(&mut byte)
            .map_err(|e| DecodeError::from_io(e, context))?;
        Ok(byte[0])
    }

    /// Reads exactly `N` bytes.
    #[inline]
    pub fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let mut bytes = [0u8; N];
        self.input
            .read_exact(&mut bytes)
            .map_err(|e| DecodeError::from_io(e, context))?;
        Ok(bytes)
    }

    /// Reads an unsigned 32-bit varint (LEB128).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        let mut result: u32 = 0;

        for i in 0..MAX_VARINT32_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u32;

            // The fifth byte carries only the top four bits.
            if i == MAX_VARINT32_BYTES - 1 && value > 0x0F {
                return Err(DecodeError::VarintOverflow { context });
            }

            result |= value << (7 * i);

            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(DecodeError::VarintTooLong { context })
    }

    /// Reads a signed varint (zigzag encoded).
    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        let unsigned = self.read_varint(context)?;
        Ok(zigzag_decode(unsigned))
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_varint(field)? as usize;
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

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for binary primitives.
#[derive(Debug)]
pub struct Writer<'a, W: Write + ?Sized> {
    output: &'a mut W,
}

impl<'a, W: Write + ?Sized> Writer<'a, W> {
    /// Creates a new writer over a stream.
    pub fn new(output: &'a mut W) -> Self {
        Self { output }
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<(), EncodeError> {
        self.output.write_all(&[byte])?;
        Ok(())
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.output.write_all(bytes)?;
        Ok(())
    }

    /// Writes an unsigned 32-bit varint (LEB128).
    pub fn write_varint(&mut self, value: u32) -> Result<(), EncodeError> {
        let mut buf = [0u8; MAX_VARINT32_BYTES];
        let len = encode_varint(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_signed_varint(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_varint(zigzag_encode(value))
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, value: f32) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian f64.
    pub fn write_f64(&mut self, value: f64) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        self.write_varint(length_u32(s.len(), "string")?)?;
        self.write_bytes(s.as_bytes())
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.output.flush()?;
        Ok(())
    }
}

/// Encodes `value` into `buf`, returning the number of bytes used.
pub fn encode_varint(mut value: u32, buf: &mut [u8; MAX_VARINT32_BYTES]) -> usize {
    let mut len = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf[len] = byte;
        len += 1;
        if value == 0 {
            return len;
        }
    }
}

/// Converts a length or count to the 32-bit wire representation.
pub(crate) fn length_u32(len: usize, field: &'static str) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::LengthExceedsLimit {
        field,
        len,
        max: u32::MAX as usize,
    })
}

// =============================================================================
// ZIGZAG ENCODING
// =============================================================================

/// Encodes a signed integer using zigzag encoding.
///
/// Maps negative numbers to odd positive numbers:
/// 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decodes a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

// =============================================================================
// FLOAT TOKENS
// =============================================================================

// Rust float formatting and parsing ignore the process locale, so the
// output is always "C" locale text. Non-finite values use fixed tokens.

/// Formats an f32 as a round-trippable token.
pub fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        format!("{value:?}")
    }
}

/// Formats an f64 as a round-trippable token.
pub fn format_f64(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        format!("{value:?}")
    }
}

/// Parses an f32 token written by [`format_f32`].
pub fn parse_f32(token: &str, context: &'static str) -> Result<f32, DecodeError> {
    match token {
        "inf" => Ok(f32::INFINITY),
        "-inf" => Ok(f32::NEG_INFINITY),
        "nan" => Ok(f32::NAN),
        _ => token.parse().map_err(|_| invalid_token(token, context)),
    }
}

/// Parses an f64 token written by [`format_f64`].
pub fn parse_f64(token: &str, context: &'static str) -> Result<f64, DecodeError> {
    match token {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => token.parse().map_err(|_| invalid_token(token, context)),
    }
}

/// Parses a decimal u32 token.
pub fn parse_u32(token: &str, context: &'static str) -> Result<u32, DecodeError> {
    token.parse().map_err(|_| invalid_token(token, context))
}

/// Parses a decimal i32 token.
pub fn parse_i32(token: &str, context: &'static str) -> Result<i32, DecodeError> {
    token.parse().map_err(|_| invalid_token(token, context))
}

fn invalid_token(token: &str, context: &'static str) -> DecodeError {
    DecodeError::InvalidToken {
        context,
        token: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_varint(v: u32) -> (u32, usize) {
        let mut bytes = Vec::new();
        Writer::new(&mut bytes).write_varint(v).unwrap();
        let len = bytes.len();
        let mut input = bytes.as_slice();
        (Reader::new(&mut input).read_varint("test").unwrap(), len)
    }

    #[test]
    fn test_zigzag_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
        assert_eq!(zigzag_encode(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag_encode(i32::MIN), u32::MAX);
    }

    #[test]
    fn test_zigzag_roundtrip() {
        for v in [0i32, 1, -1, 63, -64, i32::MAX, i32::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(roundtrip_varint(0), (0, 1));
        assert_eq!(roundtrip_varint(127), (127, 1));
        assert_eq!(roundtrip_varint(128), (128, 2));
        assert_eq!(roundtrip_varint(16383), (16383, 2));
        assert_eq!(roundtrip_varint(16384), (16384, 3));
        assert_eq!(roundtrip_varint(u32::MAX), (u32::MAX, 5));
    }

    #[test]
    fn test_varint_wire_bytes() {
        let mut bytes = Vec::new();
        Writer::new(&mut bytes).write_varint(300).unwrap();
        assert_eq!(bytes, [0xAC, 0x02]);
    }

    #[test]
    fn test_varint_too_long() {
        let data = [0x80u8; 6];
        let result = Reader::new(&mut &data[..]).read_varint("test");
        assert!(matches!(result, Err(DecodeError::VarintTooLong { .. })));

        let data = [0x80u8, 0x80, 0x80, 0x80, 0x8F, 0x01];
        let result = Reader::new(&mut &data[..]).read_varint("test");
        assert!(matches!(result, Err(DecodeError::VarintTooLong { .. })));
    }

    #[test]
    fn test_varint_overflow() {
        let data = [0xFFu8, 0xFF, 0xFF, 0xFF, 0x1F];
        let result = Reader::new(&mut &data[..]).read_varint("test");
        assert!(matches!(result, Err(DecodeError::VarintOverflow { .. })));
    }

    #[test]
    fn test_truncated_varint() {
        let data = [0x80u8];
        let result = Reader::new(&mut &data[..]).read_varint("count");
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { context: "count" })));
    }

    #[test]
    fn test_string_roundtrip() {
        for s in ["", "hello", "line\nbreak", "unicode: \u{1F600}"] {
            let mut bytes = Vec::new();
            Writer::new(&mut bytes).write_string(s).unwrap();
            let decoded = Reader::new(&mut bytes.as_slice()).read_string(1000, "test").unwrap();
            assert_eq!(s, decoded);
        }
    }

    #[test]
    fn test_string_too_long() {
        let mut bytes = Vec::new();
        Writer::new(&mut bytes).write_string(&"x".repeat(200)).unwrap();
        let result = Reader::new(&mut bytes.as_slice()).read_string(100, "test");
        assert!(matches!(result, Err(DecodeError::LengthExceedsLimit { max: 100, .. })));
    }

    #[test]
    fn test_float_bits_roundtrip() {
        let mut bytes = Vec::new();
        let mut writer = Writer::new(&mut bytes);
        writer.write_f32(f32::NAN).unwrap();
        writer.write_f64(f64::NEG_INFINITY).unwrap();
        writer.write_f64(-0.0).unwrap();

        let mut input = bytes.as_slice();
        let mut reader = Reader::new(&mut input);
        assert!(reader.read_f32("f").unwrap().is_nan());
        assert_eq!(reader.read_f64("d").unwrap(), f64::NEG_INFINITY);
        assert!(reader.read_f64("d").unwrap().is_sign_negative());
    }

    #[test]
    fn test_float_tokens() {
        assert_eq!(format_f64(f64::INFINITY), "inf");
        assert_eq!(format_f64(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_f32(f32::NAN), "nan");
        assert!(parse_f64("nan", "t").unwrap().is_nan());
        assert_eq!(parse_f32("-inf", "t").unwrap(), f32::NEG_INFINITY);

        for v in [0.1f64, -1.0e-300, 123456.789, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(parse_f64(&format_f64(v), "t").unwrap(), v);
        }
        for v in [0.1f32, -3.5e-38, f32::MAX] {
            assert_eq!(parse_f32(&format_f32(v), "t").unwrap(), v);
        }
        assert!(matches!(parse_f64("1,5", "t"), Err(DecodeError::InvalidToken { .. })));
    }
}
