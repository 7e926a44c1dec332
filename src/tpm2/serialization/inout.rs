use crate::tpm2::errors::{DecodeError, EncodeError};
use std::convert::TryFrom;
use std::result;

// Upper bounds for a single command and a single response. Buffers are never
// grown past these values.
pub const MAX_COMMAND_SIZE: usize = 4096;
pub const MAX_RESPONSE_SIZE: usize = 4096;

const RESERVATION_SIZE: usize = size_of!(u32);

// Reservation marks a 4 bytes size field that has been written as zero and
// must be backfilled once the content following it is known. It can only be
// obtained from WriteCursor::reserve_u32.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    offset: usize,
}

impl Reservation {
    pub fn offset(&self) -> usize {
        self.offset
    }
}

// WriteCursor writes big endian data into a caller owned, fixed capacity
// buffer. The write pointer only moves forward.
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    wrptr: usize,
}

impl<'a> WriteCursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        WriteCursor { buf, wrptr: 0 }
    }

    // len returns the number of bytes written so far
    pub fn len(&self) -> usize {
        self.wrptr
    }

    pub fn is_empty(&self) -> bool {
        self.wrptr == 0
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.wrptr
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> result::Result<(), EncodeError> {
        if bytes.len() > self.remaining() {
            return Err(EncodeError::BufferFull {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.buf[self.wrptr..self.wrptr + bytes.len()].copy_from_slice(bytes);
        self.wrptr += bytes.len();
        Ok(())
    }

    // reserve_u32 writes a zero placeholder and remembers where it lives
    pub fn reserve_u32(&mut self) -> result::Result<Reservation, EncodeError> {
        let offset = self.wrptr;
        self.write_bytes(&[0; RESERVATION_SIZE])?;
        Ok(Reservation { offset })
    }

    // written_since returns the number of bytes written after the reserved
    // field, the field itself excluded
    pub fn written_since(&self, reservation: Reservation) -> usize {
        self.wrptr
            .saturating_sub(reservation.offset + RESERVATION_SIZE)
    }

    // patch_u32 overwrites a reserved field. The write pointer does not move.
    pub fn patch_u32(
        &mut self,
        reservation: Reservation,
        value: u32,
    ) -> result::Result<(), EncodeError> {
        let end = reservation.offset + RESERVATION_SIZE;
        if end > self.wrptr {
            return Err(EncodeError::Unreserved {
                offset: reservation.offset,
            });
        }
        self.buf[reservation.offset..end].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    // scrub zeroes everything written so far and rewinds the cursor
    pub fn scrub(&mut self) {
        for b in self.buf[..self.wrptr].iter_mut() {
            *b = 0;
        }
        self.wrptr = 0;
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.buf[..self.wrptr]
    }
}

// ReadCursor reads big endian data out of a borrowed buffer. Reads never go
// past the end of the buffer.
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    rdptr: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ReadCursor { buf, rdptr: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.rdptr
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    // consumed returns the number of bytes read so far
    pub fn consumed(&self) -> usize {
        self.rdptr
    }

    pub fn read_bytes(&mut self, size: usize) -> result::Result<&'a [u8], DecodeError> {
        if size > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: size,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.rdptr..self.rdptr + size];
        self.rdptr += size;
        Ok(bytes)
    }

    // read_rest consumes whatever is left in the buffer
    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.rdptr..];
        self.rdptr = self.buf.len();
        bytes
    }
}

// Tpm2StructOut is a trait for TPM objects which can be serialized in
// big endian byte stream for TPM operations
pub trait Tpm2StructOut {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError>;
}

// Tpm2StructIn is a trait for TPM objects which can be deserialized from
// a byte stream
pub trait Tpm2StructIn {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError>;
}

// impl_tpm2_io is a macro which implements Tpm2StructIn and Tpm2StructOut for
// primitive types.
macro_rules! impl_tpm2_io {
    ($T: ident) => {
        impl Tpm2StructOut for $T {
            fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
                buff.write_bytes(&self.to_be_bytes()[..])
            }
        }

        impl Tpm2StructIn for $T {
            fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
                let bytes = buff.read_bytes(size_of!($T))?;
                let byte_array = <[u8; size_of!($T)]>::try_from(bytes).map_err(|_| {
                    DecodeError::Truncated {
                        needed: size_of!($T),
                        remaining: bytes.len(),
                    }
                })?;
                *self = $T::from_be_bytes(byte_array);
                Ok(())
            }
        }
    };
}

impl_tpm2_io! { u8 }
impl_tpm2_io! { u16 }
impl_tpm2_io! { u32 }
impl_tpm2_io! { u64 }
impl_tpm2_io! { i32 }

// Commands and responses without parameters
impl Tpm2StructOut for () {
    fn pack(&self, _buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        Ok(())
    }
}

impl Tpm2StructIn for () {
    fn unpack(&mut self, _buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        Ok(())
    }
}

// pack serializes a list of fields in order
pub fn pack(
    fields: &[&dyn Tpm2StructOut],
    buff: &mut WriteCursor<'_>,
) -> result::Result<(), EncodeError> {
    for field in fields.iter() {
        field.pack(buff)?;
    }
    Ok(())
}

// unpack_exact deserializes a T which must span the whole input
pub fn unpack_exact<T: Tpm2StructIn + Default>(bytes: &[u8]) -> result::Result<T, DecodeError> {
    let mut buff = ReadCursor::new(bytes);
    let mut value: T = Default::default();
    value.unpack(&mut buff)?;
    if !buff.is_empty() {
        return Err(DecodeError::SizeMismatch {
            declared: bytes.len(),
            consumed: buff.consumed(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(value: T, width: usize) -> T
    where
        T: Tpm2StructOut + Tpm2StructIn + Default,
    {
        let mut buf = [0u8; 16];
        let mut writer = WriteCursor::new(&mut buf);
        value.pack(&mut writer).unwrap();
        assert_eq!(writer.len(), width);
        let written = writer.len();
        unpack_exact(&buf[..written]).unwrap()
    }

    #[test]
    fn test_primitives_boundaries() {
        for v in [0u8, 1, u8::MAX].iter() {
            assert_eq!(roundtrip(*v, 1), *v);
        }
        for v in [0u16, 0x8001, u16::MAX].iter() {
            assert_eq!(roundtrip(*v, 2), *v);
        }
        for v in [0u32, 0x0000_0151, u32::MAX].iter() {
            assert_eq!(roundtrip(*v, 4), *v);
        }
        for v in [0u64, 1 << 40, u64::MAX].iter() {
            assert_eq!(roundtrip(*v, 8), *v);
        }
        for v in [0i32, -1, i32::MIN, i32::MAX].iter() {
            assert_eq!(roundtrip(*v, 4), *v);
        }
    }

    #[test]
    fn test_big_endian_layout() {
        let mut buf = [0u8; 8];
        let mut writer = WriteCursor::new(&mut buf);
        0x0102u16.pack(&mut writer).unwrap();
        (-2i32).pack(&mut writer).unwrap();
        assert_eq!(writer.to_bytes(), &[0x01, 0x02, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn test_buffer_full_leaves_cursor_untouched() {
        let mut buf = [0u8; 3];
        let mut writer = WriteCursor::new(&mut buf);
        0xAAu8.pack(&mut writer).unwrap();
        let err = 0x1234_5678u32.pack(&mut writer).unwrap_err();
        assert_eq!(
            err,
            EncodeError::BufferFull {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.remaining(), 2);
    }

    #[test]
    fn test_truncated_read() {
        let bytes = [0x00, 0x01, 0x02];
        let mut reader = ReadCursor::new(&bytes);
        let mut value: u32 = 0;
        let err = value.unpack(&mut reader).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                needed: 4,
                remaining: 3
            }
        );
        assert_eq!(reader.consumed(), 0);
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut buf = [0xEEu8; 16];
        let mut writer = WriteCursor::new(&mut buf);
        0x8002u16.pack(&mut writer).unwrap();
        let size = writer.reserve_u32().unwrap();
        assert_eq!(size.offset(), 2);
        writer.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(writer.written_since(size), 3);
        writer.patch_u32(size, 3).unwrap();
        assert_eq!(writer.len(), 9);
        assert_eq!(
            writer.to_bytes(),
            &[0x80, 0x02, 0x00, 0x00, 0x00, 0x03, 1, 2, 3]
        );
    }

    #[test]
    fn test_patch_outside_written_area() {
        let mut buf = [0u8; 16];
        let mut other = [0u8; 16];
        let reservation = {
            let mut writer = WriteCursor::new(&mut other);
            writer.write_bytes(&[0; 8]).unwrap();
            writer.reserve_u32().unwrap()
        };
        let mut writer = WriteCursor::new(&mut buf);
        assert_eq!(
            writer.patch_u32(reservation, 1).unwrap_err(),
            EncodeError::Unreserved { offset: 8 }
        );
    }

    #[test]
    fn test_scrub() {
        let mut buf = [0u8; 4];
        {
            let mut writer = WriteCursor::new(&mut buf);
            writer.write_bytes(&[9, 9, 9]).unwrap();
            writer.scrub();
            assert!(writer.is_empty());
        }
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn test_unpack_exact_rejects_trailing_bytes() {
        let err = unpack_exact::<u16>(&[0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::SizeMismatch {
                declared: 3,
                consumed: 2
            }
        );
    }

    #[test]
    fn test_pack_field_list() {
        let mut buf = [0u8; 16];
        let mut writer = WriteCursor::new(&mut buf);
        let tag: u16 = 0x8001;
        let code: u32 = 0x144;
        let su: u16 = 0;
        pack(&[&tag, &code, &su], &mut writer).unwrap();
        assert_eq!(writer.to_bytes(), &[0x80, 0x01, 0, 0, 0x01, 0x44, 0, 0]);
    }
}
