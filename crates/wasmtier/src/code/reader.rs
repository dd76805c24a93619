//! Cursor over raw bytecode with LEB128 decoding.

use super::error::ValidationError;

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ValidationError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(ValidationError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn peek_u8(&self) -> Result<u8, ValidationError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(ValidationError::UnexpectedEof)
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], ValidationError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ValidationError::UnexpectedEof)?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub(crate) fn read_f32_bits(&mut self) -> Result<u32, ValidationError> {
        Ok(u32::from_le_bytes(self.read_bytes()?))
    }

    pub(crate) fn read_f64_bits(&mut self) -> Result<u64, ValidationError> {
        Ok(u64::from_le_bytes(self.read_bytes()?))
    }

    fn read_unsigned(&mut self, bits: u32) -> Result<u64, ValidationError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= bits {
                return Err(ValidationError::MalformedLeb);
            }
            let low = (byte & 0x7f) as u64;
            if shift + 7 > bits && (low >> (bits - shift)) != 0 {
                return Err(ValidationError::MalformedLeb);
            }
            result |= low << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    fn read_signed(&mut self, bits: u32) -> Result<i64, ValidationError> {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= bits {
                return Err(ValidationError::MalformedLeb);
            }
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                if shift > bits {
                    // Unused high bits must replicate the sign bit.
                    let value_bits = 64 - bits;
                    if (result << value_bits) >> value_bits != result {
                        return Err(ValidationError::MalformedLeb);
                    }
                }
                return Ok(result);
            }
        }
    }

    pub(crate) fn read_var_u32(&mut self) -> Result<u32, ValidationError> {
        Ok(self.read_unsigned(32)? as u32)
    }

    pub(crate) fn read_var_i32(&mut self) -> Result<i32, ValidationError> {
        Ok(self.read_signed(32)? as i32)
    }

    pub(crate) fn read_var_i64(&mut self) -> Result<i64, ValidationError> {
        self.read_signed(64)
    }

    pub(crate) fn read_var_s33(&mut self) -> Result<i64, ValidationError> {
        self.read_signed(33)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_leb() {
        let mut r = Reader::new(&[0xe5, 0x8e, 0x26, 0x7f]);
        assert_eq!(r.read_var_u32().unwrap(), 624485);
        assert_eq!(r.read_var_u32().unwrap(), 127);
        assert!(r.is_empty());
    }

    #[test]
    fn signed_leb() {
        let mut r = Reader::new(&[0xc0, 0xbb, 0x78, 0x7f, 0x80, 0x7f]);
        assert_eq!(r.read_var_i32().unwrap(), -123456);
        assert_eq!(r.read_var_i32().unwrap(), -1);
        assert_eq!(r.read_var_i64().unwrap(), -128);
    }

    #[test]
    fn i64_min() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f];
        assert_eq!(Reader::new(&bytes).read_var_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn overlong_u32_is_rejected() {
        let mut r = Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(r.read_var_u32(), Err(ValidationError::MalformedLeb));
    }

    #[test]
    fn truncated_input() {
        let mut r = Reader::new(&[0x80]);
        assert_eq!(r.read_var_u32(), Err(ValidationError::UnexpectedEof));
    }
}
