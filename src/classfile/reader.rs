//! A big-endian, positioned byte reader over an immutable span. Grounded in
//! `rsvm::classfile::reader::ClassReader` (same `read_ubyteN` naming, same
//! "trait over a byte slice + cursor" shape), widened to cover every width
//! and numeric kind the decoder needs (`rsvm` only needed u8/u16/u32; this
//! core also needs i8/i64/f32/f64 for immediates, `ldc2_w`, and the `Code`
//! attribute's raw bytes).

use super::ClassFileError;

/// An immutable byte span with a cursor. `base` is this span's offset
/// within the original file, so a sub-slice can still report
/// `original_offset`.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader {
            bytes,
            cursor: 0,
            base: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn original_offset(&self) -> usize {
        self.base + self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    fn require(&self, n: usize, component: &'static str) -> Result<(), ClassFileError> {
        if self.cursor + n > self.bytes.len() {
            return Err(ClassFileError::UnexpectedEnd { component });
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize, component: &'static str) -> Result<(), ClassFileError> {
        self.require(n, component)?;
        self.cursor += n;
        Ok(())
    }

    pub fn read_u8(&mut self, component: &'static str) -> Result<u8, ClassFileError> {
        self.require(1, component)?;
        let v = self.bytes[self.cursor];
        self.cursor += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self, component: &'static str) -> Result<i8, ClassFileError> {
        Ok(self.read_u8(component)? as i8)
    }

    pub fn read_u16(&mut self, component: &'static str) -> Result<u16, ClassFileError> {
        self.require(2, component)?;
        let v = u16::from_be_bytes([self.bytes[self.cursor], self.bytes[self.cursor + 1]]);
        self.cursor += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self, component: &'static str) -> Result<i16, ClassFileError> {
        Ok(self.read_u16(component)? as i16)
    }

    pub fn read_u32(&mut self, component: &'static str) -> Result<u32, ClassFileError> {
        self.require(4, component)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_i32(&mut self, component: &'static str) -> Result<i32, ClassFileError> {
        Ok(self.read_u32(component)? as i32)
    }

    pub fn read_u64(&mut self, component: &'static str) -> Result<u64, ClassFileError> {
        self.require(8, component)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_i64(&mut self, component: &'static str) -> Result<i64, ClassFileError> {
        Ok(self.read_u64(component)? as i64)
    }

    pub fn read_f32(&mut self, component: &'static str) -> Result<f32, ClassFileError> {
        Ok(f32::from_bits(self.read_u32(component)?))
    }

    pub fn read_f64(&mut self, component: &'static str) -> Result<f64, ClassFileError> {
        Ok(f64::from_bits(self.read_u64(component)?))
    }

    pub fn read_bytes(&mut self, n: usize, component: &'static str) -> Result<&'a [u8], ClassFileError> {
        self.require(n, component)?;
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    /// Returns a reader over the next `n` bytes and skips them in `self`,
    /// atomically: either both the bounds check and the cursor advance
    /// succeed, or neither does.
    pub fn slice(&mut self, n: usize, component: &'static str) -> Result<ByteReader<'a>, ClassFileError> {
        self.require(n, component)?;
        let sub = ByteReader {
            bytes: &self.bytes[self.cursor..self.cursor + n],
            cursor: 0,
            base: self.base + self.cursor,
        };
        self.cursor += n;
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_widths() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0xFF];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u32("magic").unwrap(), 0xCAFEBABE);
        assert_eq!(r.read_u16("minor").unwrap(), 0x0034);
        assert_eq!(r.read_u8("tag").unwrap(), 0xFF);
    }

    #[test]
    fn unexpected_end_names_the_component() {
        let bytes = [0x00];
        let mut r = ByteReader::new(&bytes);
        match r.read_u16("constant pool tag") {
            Err(ClassFileError::UnexpectedEnd { component }) => {
                assert_eq!(component, "constant pool tag")
            }
            other => panic!("expected UnexpectedEnd, got {other:?}"),
        }
    }

    #[test]
    fn slice_reserves_and_skips_atomically() {
        let bytes = [1, 2, 3, 4, 5];
        let mut r = ByteReader::new(&bytes);
        let sub = r.slice(3, "code").unwrap();
        assert_eq!(sub.remaining(), 3);
        assert_eq!(r.offset(), 3);
        assert_eq!(r.read_u8("rest").unwrap(), 4);
    }

    #[test]
    fn original_offset_accounts_for_slice_base() {
        let bytes = [0, 0, 9, 9, 9];
        let mut r = ByteReader::new(&bytes);
        r.skip(2, "pad").unwrap();
        let mut sub = r.slice(3, "code").unwrap();
        sub.skip(1, "pad").unwrap();
        assert_eq!(sub.original_offset(), 3);
    }

    #[test]
    fn reads_float_and_double() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        bytes.extend_from_slice(&(-2.25f64).to_be_bytes());
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_f32("f").unwrap(), 1.5);
        assert_eq!(r.read_f64("d").unwrap(), -2.25);
    }
}
