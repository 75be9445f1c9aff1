//! Big-endian genotype byte codec: `int32`, `float64`, `bool`, UTF-16 strings.

use crate::error::GenomeError;

#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// `int32` code-unit count followed by the UTF-16 code units.
    pub fn utf16(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.i32(units.len() as i32);
        for u in units {
            self.buf.extend_from_slice(&u.to_be_bytes());
        }
    }

    /// `int32` length followed by the raw bytes.
    pub fn bytes(&mut self, b: &[u8]) {
        self.i32(b.len() as i32);
        self.buf.extend_from_slice(b);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], GenomeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(GenomeError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], GenomeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn i32(&mut self) -> Result<i32, GenomeError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, GenomeError> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> Result<bool, GenomeError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn u8(&mut self) -> Result<u8, GenomeError> {
        Ok(self.take(1)?[0])
    }

    /// Reads an `int32` length and rejects negatives.
    pub fn len(&mut self) -> Result<usize, GenomeError> {
        let offset = self.pos;
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| GenomeError::NegativeLength { len, offset })
    }

    pub fn utf16(&mut self) -> Result<String, GenomeError> {
        let n = self.len()?;
        let mut units = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            units.push(u16::from_be_bytes(self.array()?));
        }
        String::from_utf16(&units).map_err(|_| GenomeError::InvalidKey)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, GenomeError> {
        let n = self.len()?;
        Ok(self.take(n)?.to_vec())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fails if any bytes are left unread.
    pub fn finish(self) -> Result<(), GenomeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(GenomeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_key_layout_matches_java_data_output() {
        let mut w = ByteWriter::new();
        w.utf16("ab");
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 2, 0, b'a', 0, b'b']);
    }

    #[test]
    fn truncated_stream_reports_offset() {
        let mut r = ByteReader::new(&[0, 0, 0]);
        assert_eq!(r.i32(), Err(GenomeError::Truncated { offset: 0 }));
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut w = ByteWriter::new();
        w.i32(-3);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(r.utf16(), Err(GenomeError::NegativeLength { len: -3, .. })));
    }
}
