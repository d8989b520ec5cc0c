//! 紧凑编码原语：无符号 LEB128 变长整数与小端 IEEE-754 `f64`。
use std::io::{self, ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::net::StateId;

const MAX_VARINT_BYTES: usize = 10;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stream ended inside {0}")]
    UnexpectedEof(&'static str),
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
    #[error("value {0} does not fit a state id")]
    IdOutOfRange(u64),
    #[error("unknown state classification byte {0:#04x}")]
    InvalidKind(u8),
    #[error("state {0} appears twice in the mapping stream")]
    DuplicateState(StateId),
    #[error("record for state {0} appears twice")]
    DuplicateRecord(StateId),
    #[error("record for state {from} lists successor {to} twice")]
    DuplicateSuccessor { from: StateId, to: StateId },
    #[error("state {0} has no record")]
    MissingRecord(StateId),
    #[error("record for state {from} references unmapped state {to}")]
    DanglingState { from: StateId, to: StateId },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub fn write_varint<W: Write>(out: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return out.write_u8(byte);
        }
        out.write_u8(byte | 0x80)?;
    }
}

/// Reads a varint, returning `None` if the stream ends before its first byte.
pub fn read_varint_or_eof<R: Read>(
    input: &mut R,
    context: &'static str,
) -> Result<Option<u64>, DecodeError> {
    let mut value = 0u64;
    for idx in 0..MAX_VARINT_BYTES {
        let byte = match input.read_u8() {
            Ok(byte) => byte,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                if idx == 0 {
                    return Ok(None);
                }
                return Err(DecodeError::UnexpectedEof(context));
            }
            Err(err) => return Err(err.into()),
        };
        // the 10th byte may only carry the top bit of a u64
        if idx == MAX_VARINT_BYTES - 1 && byte > 0x01 {
            return Err(DecodeError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * idx);
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Err(DecodeError::VarintOverflow)
}

pub fn read_varint<R: Read>(input: &mut R, context: &'static str) -> Result<u64, DecodeError> {
    read_varint_or_eof(input, context)?.ok_or(DecodeError::UnexpectedEof(context))
}

pub fn write_state_id<W: Write>(out: &mut W, id: StateId) -> io::Result<()> {
    write_varint(out, u64::from(id.raw()))
}

pub fn state_id_from(raw: u64) -> Result<StateId, DecodeError> {
    u32::try_from(raw)
        .map(StateId::new)
        .map_err(|_| DecodeError::IdOutOfRange(raw))
}

pub fn read_state_id<R: Read>(input: &mut R, context: &'static str) -> Result<StateId, DecodeError> {
    state_id_from(read_varint(input, context)?)
}

pub fn write_rate<W: Write>(out: &mut W, rate: f64) -> io::Result<()> {
    out.write_f64::<LittleEndian>(rate)
}

pub fn read_rate<R: Read>(input: &mut R, context: &'static str) -> Result<f64, DecodeError> {
    input.read_f64::<LittleEndian>().map_err(|err| eof_in(err, context))
}

pub fn read_byte<R: Read>(input: &mut R, context: &'static str) -> Result<u8, DecodeError> {
    input.read_u8().map_err(|err| eof_in(err, context))
}

fn eof_in(err: io::Error, context: &'static str) -> DecodeError {
    if err.kind() == ErrorKind::UnexpectedEof {
        DecodeError::UnexpectedEof(context)
    } else {
        DecodeError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn varint_uses_seven_bits_per_byte() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0).unwrap();
        write_varint(&mut buf, 127).unwrap();
        write_varint(&mut buf, 300).unwrap();
        assert_eq!(buf, vec![0x00, 0x7f, 0xac, 0x02]);

        let mut input = Cursor::new(buf);
        assert_eq!(read_varint(&mut input, "test").unwrap(), 0);
        assert_eq!(read_varint(&mut input, "test").unwrap(), 127);
        assert_eq!(read_varint(&mut input, "test").unwrap(), 300);
        assert_eq!(read_varint_or_eof(&mut input, "test").unwrap(), None);
    }

    #[test]
    fn varint_extremes() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::MAX).unwrap();
        assert_eq!(buf.len(), MAX_VARINT_BYTES);
        assert_eq!(read_varint(&mut Cursor::new(buf), "test").unwrap(), u64::MAX);

        let overlong = vec![0xff; MAX_VARINT_BYTES + 1];
        assert!(matches!(
            read_varint(&mut Cursor::new(overlong), "test"),
            Err(DecodeError::VarintOverflow)
        ));
    }

    #[test]
    fn truncated_varint_is_eof_error() {
        let mut input = Cursor::new(vec![0x80]);
        assert!(matches!(
            read_varint_or_eof(&mut input, "state id"),
            Err(DecodeError::UnexpectedEof("state id"))
        ));
    }

    #[test]
    fn rates_are_eight_bytes_exact() {
        let mut buf = Vec::new();
        write_rate(&mut buf, 1.0 / 3.0).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(read_rate(&mut Cursor::new(&buf), "rate").unwrap(), 1.0 / 3.0);
        assert!(matches!(
            read_rate(&mut Cursor::new(&buf[..5]), "rate"),
            Err(DecodeError::UnexpectedEof("rate"))
        ));
    }

    #[test]
    fn oversized_id_is_rejected() {
        assert!(matches!(
            state_id_from(u64::from(u32::MAX) + 1),
            Err(DecodeError::IdOutOfRange(_))
        ));
    }
}
