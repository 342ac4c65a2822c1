//! Packet memory: the byte region a program inspects.

use crate::consts::MAX_PACKET_SIZE;
use crate::error::MemoryAccessError;

/// Byte order applied to multi-byte packet reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    /// Network order, the BPF default.
    #[default]
    BigEndian,
    /// For non-network buffers.
    LittleEndian,
}

/// Owns the packet bytes and performs every bounds-checked read.
///
/// The buffer is reused across packets: [`PacketMemory::load_packet`] grows
/// it on demand up to [`MAX_PACKET_SIZE`] and never shrinks it, so steady
/// state execution does not allocate.
#[derive(Debug, Clone, Default)]
pub struct PacketMemory {
    buf: Vec<u8>,
    len: usize,
    original_len: usize,
    truncated: bool,
    initialized: bool,
    byte_order: ByteOrder,
}

impl PacketMemory {
    /// Creates empty, uninitialized packet memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` in as the current packet.
    ///
    /// Resets the truncation state and marks the memory initialized.
    pub fn load_packet(&mut self, bytes: &[u8]) -> Result<(), MemoryAccessError> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(MemoryAccessError::PacketTooLarge { len: bytes.len() });
        }

        if self.buf.len() < bytes.len() {
            self.buf.resize(bytes.len(), 0);
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        self.original_len = bytes.len();
        self.truncated = false;
        self.initialized = true;
        Ok(())
    }

    /// Shrinks the visible length and marks the packet truncated.
    ///
    /// Never extends: a `new_len` at or beyond the current length is a no-op.
    pub fn set_truncated(&mut self, new_len: usize) {
        if new_len < self.len {
            self.len = new_len;
            self.truncated = true;
        }
    }

    /// Switches the byte order for subsequent multi-byte reads.
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Byte order currently applied to reads.
    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Visible packet length.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when no packet bytes are visible.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length the packet had when it was loaded.
    pub const fn original_len(&self) -> usize {
        self.original_len
    }

    /// Whether the visible length is shorter than the captured length.
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether a packet has been loaded since the last reset.
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The visible packet bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Reads one byte at `offset`.
    pub fn read_u8(&self, offset: u64) -> Result<u8, MemoryAccessError> {
        self.slice(offset, 1).map(|b| b[0])
    }

    /// Reads two bytes at `offset` in the configured byte order.
    pub fn read_u16(&self, offset: u64) -> Result<u16, MemoryAccessError> {
        let b = self.slice(offset, 2)?;
        let b = [b[0], b[1]];
        Ok(match self.byte_order {
            ByteOrder::BigEndian => u16::from_be_bytes(b),
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
        })
    }

    /// Reads four bytes at `offset` in the configured byte order.
    pub fn read_u32(&self, offset: u64) -> Result<u32, MemoryAccessError> {
        let b = self.slice(offset, 4)?;
        let b = [b[0], b[1], b[2], b[3]];
        Ok(match self.byte_order {
            ByteOrder::BigEndian => u32::from_be_bytes(b),
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
        })
    }

    /// Reads eight bytes at `offset` in the configured byte order.
    pub fn read_u64(&self, offset: u64) -> Result<u64, MemoryAccessError> {
        let b = self.slice(offset, 8)?;
        let b: [u8; 8] = b.try_into().expect("slice length checked");
        Ok(match self.byte_order {
            ByteOrder::BigEndian => u64::from_be_bytes(b),
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
        })
    }

    /// Returns the context to the zero state without freeing the buffer.
    pub fn reset(&mut self) {
        self.len = 0;
        self.original_len = 0;
        self.truncated = false;
        self.initialized = false;
        self.byte_order = ByteOrder::default();
    }

    /// Bounds-checked view of `size` bytes at `offset`.
    ///
    /// Reads are checked against the visible length, not the buffer
    /// capacity, so bytes of a previous larger packet can never leak.
    fn slice(&self, offset: u64, size: usize) -> Result<&[u8], MemoryAccessError> {
        if !self.initialized {
            return Err(MemoryAccessError::Uninitialized);
        }
        let out_of_bounds = || MemoryAccessError::OutOfBounds {
            offset,
            size,
            len: self.len,
        };

        let offset = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = offset.checked_add(size).ok_or_else(out_of_bounds)?;
        if end > self.len {
            return Err(out_of_bounds());
        }
        Ok(&self.buf[offset..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_use_network_order_by_default() {
        let mut mem = PacketMemory::new();
        mem.load_packet(&[0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(mem.read_u16(0), Ok(0x1234));
        assert_eq!(mem.read_u32(0), Ok(0x1234_5678));
    }

    #[test]
    fn little_endian_reads_can_be_requested() {
        let mut mem = PacketMemory::new();
        mem.load_packet(&[0x12, 0x34]).unwrap();
        mem.set_byte_order(ByteOrder::LittleEndian);
        assert_eq!(mem.read_u16(0), Ok(0x3412));
    }

    #[test]
    fn reads_stop_at_the_visible_length() {
        let mut mem = PacketMemory::new();
        mem.load_packet(&[0xAA; 64]).unwrap();
        mem.load_packet(&[0xBB; 4]).unwrap();

        // The buffer still holds 64 bytes, the packet only 4.
        assert_eq!(
            mem.read_u8(4),
            Err(MemoryAccessError::OutOfBounds {
                offset: 4,
                size: 1,
                len: 4
            })
        );
        assert_eq!(
            mem.read_u32(1),
            Err(MemoryAccessError::OutOfBounds {
                offset: 1,
                size: 4,
                len: 4
            })
        );
    }

    #[test]
    fn truncation_shrinks_but_never_extends() {
        let mut mem = PacketMemory::new();
        mem.load_packet(&[0; 20]).unwrap();

        mem.set_truncated(40);
        assert!(!mem.is_truncated());
        assert_eq!(mem.len(), 20);

        mem.set_truncated(10);
        assert!(mem.is_truncated());
        assert_eq!(mem.len(), 10);
        assert_eq!(mem.original_len(), 20);
        assert!(mem.read_u8(15).is_err());
    }

    #[test]
    fn oversized_packets_are_refused() {
        let mut mem = PacketMemory::new();
        let huge = vec![0u8; MAX_PACKET_SIZE + 1];
        assert_eq!(
            mem.load_packet(&huge),
            Err(MemoryAccessError::PacketTooLarge {
                len: MAX_PACKET_SIZE + 1
            })
        );
    }

    #[test]
    fn uninitialized_memory_rejects_reads() {
        let mem = PacketMemory::new();
        assert_eq!(mem.read_u8(0), Err(MemoryAccessError::Uninitialized));
    }
}
