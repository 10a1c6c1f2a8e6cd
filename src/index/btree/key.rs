use std::fmt;
use byteorder::{ByteOrder, LittleEndian};

/// A fixed-width, totally ordered key the B+ tree can store in its packed
/// page entry arrays.
pub trait IndexKey: Copy + Ord + Default + fmt::Debug + Send + Sync + 'static {
    /// Encoded width in bytes; every key of the type occupies exactly this.
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl IndexKey for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut buf = [0u8; 8];
        let key: i64 = -123456789;
        key.encode(&mut buf);
        assert_eq!(i64::decode(&buf), key);

        let key: i32 = i32::MIN;
        key.encode(&mut buf[..4]);
        assert_eq!(i32::decode(&buf[..4]), key);
    }
}
