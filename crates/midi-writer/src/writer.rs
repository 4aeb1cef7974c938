//! Byte-level output buffer.

/// Growable big-endian byte buffer with MIDI variable-length quantities
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16_be(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Low 24 bits, most significant first
    pub fn u24_be(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes()[1..]);
        self
    }

    pub fn u32_be(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// MIDI variable-length quantity: 7 bits per byte, most significant
    /// group first, 0x80 set on every byte but the last
    pub fn vlq(&mut self, value: u32) -> &mut Self {
        let mut groups = [0u8; 5];
        let mut n = 0;
        let mut rest = value;
        loop {
            groups[n] = (rest & 0x7F) as u8;
            n += 1;
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            let continuation = if i > 0 { 0x80 } else { 0 };
            self.buf.push(groups[i] | continuation);
        }
        self
    }

    /// A chunk: 4-byte tag, 32-bit big-endian length, payload
    pub fn chunk(&mut self, tag: &[u8; 4], payload: &[u8]) -> &mut Self {
        self.bytes(tag).u32_be(payload.len() as u32).bytes(payload)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
