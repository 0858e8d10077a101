//! Wire codec primitives.
//!
//! All handshake structures are built from big-endian integers and
//! length-prefixed byte strings. [`TlsReader`] walks a borrowed buffer and
//! fails with a decode_error alert on any truncation; [`TlsWriter`] grows a
//! buffer and supports back-patching 16-bit length fields whose value is
//! only known after the enclosed content has been written.

use rtls_types::TlsError;

/// Cursor over a received byte buffer.
pub struct TlsReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlsReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        if self.remaining() < n {
            return Err(TlsError::decode_error(format!(
                "need {n} bytes, {} remaining",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TlsError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a 24-bit big-endian length, as used by handshake headers.
    pub fn read_u24(&mut self) -> Result<u32, TlsError> {
        let b = self.take(3)?;
        Ok((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    pub fn read_u32(&mut self) -> Result<u32, TlsError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        self.take(n)
    }

    /// Read an `n`-byte prefix and return a reader over exactly that many
    /// following bytes. Used for nested length-prefixed vectors.
    pub fn sub_reader(&mut self, len: usize) -> Result<TlsReader<'a>, TlsError> {
        Ok(TlsReader::new(self.take(len)?))
    }

    /// Fail unless the whole buffer was consumed. Decoders call this last so
    /// that trailing garbage in a message is rejected rather than ignored.
    pub fn expect_consumed(&self) -> Result<(), TlsError> {
        if self.remaining() != 0 {
            return Err(TlsError::decode_error(format!(
                "{} trailing bytes after message",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Position of a reserved 16-bit length field awaiting a patch.
#[derive(Debug, Clone, Copy)]
pub struct LengthMarker(usize);

/// Growable output buffer for handshake structures.
#[derive(Default)]
pub struct TlsWriter {
    buf: Vec<u8>,
}

impl TlsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u24(&mut self, v: u32) {
        debug_assert!(v <= 0x00FF_FFFF);
        self.buf.push((v >> 16) as u8);
        self.buf.push((v >> 8) as u8);
        self.buf.push(v as u8);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a byte string with a one-byte length prefix.
    pub fn write_vec_u8(&mut self, v: &[u8]) {
        debug_assert!(v.len() <= u8::MAX as usize);
        self.write_u8(v.len() as u8);
        self.write_bytes(v);
    }

    /// Write a byte string with a two-byte length prefix.
    pub fn write_vec_u16(&mut self, v: &[u8]) {
        debug_assert!(v.len() <= u16::MAX as usize);
        self.write_u16(v.len() as u16);
        self.write_bytes(v);
    }

    /// Reserve space for a 16-bit length and return a marker for
    /// [`patch_u16`](Self::patch_u16) once the content length is known.
    pub fn reserve_u16(&mut self) -> LengthMarker {
        let marker = LengthMarker(self.buf.len());
        self.buf.extend_from_slice(&[0, 0]);
        marker
    }

    /// Patch a reserved length field with the number of bytes written since
    /// the reservation.
    pub fn patch_u16(&mut self, marker: LengthMarker) {
        let len = self.buf.len() - marker.0 - 2;
        debug_assert!(len <= u16::MAX as usize);
        self.buf[marker.0..marker.0 + 2].copy_from_slice(&(len as u16).to_be_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
