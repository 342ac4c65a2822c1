//! Per-layer protocol metadata attached to an execution context.

use std::collections::HashMap;

/// What a dissector recorded about one protocol layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolInfo {
    /// Numeric protocol type (EtherType, IP protocol number, ...).
    proto: u32,
    /// Byte offset of the header in the packet.
    offset: u32,
    /// Header length in bytes.
    header_len: u32,
    /// Arbitrary decoded fields, keyed by dissector-defined ids.
    fields: HashMap<u32, u64>,
    /// Dissector-defined flag bits.
    flags: u64,
    /// Whether this layer has been recorded at all.
    present: bool,
}

impl ProtocolInfo {
    /// Records a layer at `offset` with the given type and header length.
    pub fn record(&mut self, proto: u32, offset: u32, header_len: u32) {
        self.proto = proto;
        self.offset = offset;
        self.header_len = header_len;
        self.present = true;
    }

    /// Numeric protocol type.
    pub const fn proto(&self) -> u32 {
        self.proto
    }

    /// Byte offset of the header.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Header length in bytes.
    pub const fn header_len(&self) -> u32 {
        self.header_len
    }

    /// Whether the layer has been recorded.
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Looks up a decoded field.
    pub fn field(&self, id: u32) -> Option<u64> {
        self.fields.get(&id).copied()
    }

    /// Stores a decoded field.
    pub fn set_field(&mut self, id: u32, value: u64) {
        self.fields.insert(id, value);
    }

    /// Flag bits.
    pub const fn flags(&self) -> u64 {
        self.flags
    }

    /// Replaces the flag bits.
    pub fn set_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    /// Forgets everything recorded about the layer.
    ///
    /// The field map keeps its allocation.
    pub fn clear(&mut self) {
        self.proto = 0;
        self.offset = 0;
        self.header_len = 0;
        self.flags = 0;
        self.present = false;
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_marks_the_layer_present() {
        let mut layer = ProtocolInfo::default();
        assert!(!layer.is_present());
        layer.record(0x0800, 14, 20);
        assert!(layer.is_present());
        assert_eq!(layer.offset(), 14);
    }

    #[test]
    fn clearing_keeps_the_field_map_allocation() {
        let mut layer = ProtocolInfo::default();
        layer.record(6, 34, 20);
        layer.set_field(1, 80);
        layer.clear();
        assert!(!layer.is_present());
        assert_eq!(layer.field(1), None);
    }
}
