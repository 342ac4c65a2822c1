//! The built-in check opcodes, packaged as an ordinary extension.

use super::{checksum, Extension, ExtensionCtx, RegistrationCtx};
use crate::error::ExtensionError;
use crate::registers::ErrorFlags;

const CHK_CRC: u8 = 0xE0;
const CHK_L3_CSUM: u8 = 0xE1;
const CHK_L4_CSUM: u8 = 0xE2;
const CHK_TRUNC: u8 = 0xE3;
const CHK_FRAME_LEN: u8 = 0xE4;
const CHK_PROTO_LOC: u8 = 0xE5;

/// CRC, checksum, truncation, frame-length and locator assertions.
///
/// Every check reports through the error register and falls through to
/// the next instruction; none of them aborts execution.
#[derive(Debug, Default)]
pub struct BuiltinChecks;

impl Extension for BuiltinChecks {
    fn name(&self) -> &str {
        "builtin-checks"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn initialize(&mut self, ctx: &mut RegistrationCtx<'_>) -> Result<(), ExtensionError> {
        for opcode in CHK_CRC..=CHK_PROTO_LOC {
            ctx.register_opcode(opcode)?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        opcode: u8,
        imm: u32,
        dst: u8,
        src: u8,
        ctx: &mut ExtensionCtx<'_>,
    ) -> Result<bool, ExtensionError> {
        match opcode {
            CHK_CRC => {
                let len = (dst as usize) << 8 | src as usize;
                if !crc_region_matches(ctx.memory().as_slice(), imm as usize, len) {
                    ctx.set_error(ErrorFlags::CRC);
                }
            }
            CHK_L3_CSUM => {
                let l3 = ctx.registers().l3_offset() as usize;
                match ipv4_header(ctx.memory().as_slice(), l3) {
                    Some(header) if checksum::ipv4_header_is_valid(header) => {}
                    Some(_) => ctx.set_error(ErrorFlags::L3_CHECKSUM),
                    None => ctx.set_error(ErrorFlags::MALFORMED),
                }
            }
            CHK_L4_CSUM => {
                let l3 = ctx.registers().l3_offset() as usize;
                let l4 = ctx.registers().l4_offset() as usize;
                match l4_segment(ctx.memory().as_slice(), l3, l4) {
                    Some((src_ip, dst_ip, proto, segment))
                        if checksum::ipv4_l4_is_valid(src_ip, dst_ip, proto, segment) => {}
                    Some(_) => ctx.set_error(ErrorFlags::L4_CHECKSUM),
                    None => ctx.set_error(ErrorFlags::MALFORMED),
                }
            }
            CHK_TRUNC => {
                if ctx.memory().is_truncated() {
                    ctx.set_error(ErrorFlags::TRUNCATED);
                }
            }
            CHK_FRAME_LEN => {
                if ctx.registers().frame_len() < imm as u64 {
                    ctx.set_error(ErrorFlags::MALFORMED);
                }
            }
            CHK_PROTO_LOC => {
                let located = ctx
                    .layer(dst as usize)
                    .map(|layer| layer.is_present() && layer.offset() == imm);
                if located != Some(true) {
                    ctx.set_error(ErrorFlags::MALFORMED);
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// CRC-32 of `[offset, offset+len)` against the big-endian word after it.
fn crc_region_matches(packet: &[u8], offset: usize, len: usize) -> bool {
    let end = match offset.checked_add(len) {
        Some(end) => end,
        None => return false,
    };
    let (region, fcs) = match (packet.get(offset..end), packet.get(end..end + 4)) {
        (Some(region), Some(fcs)) => (region, fcs),
        _ => return false,
    };
    let expected = u32::from_be_bytes([fcs[0], fcs[1], fcs[2], fcs[3]]);
    checksum::crc32(region) == expected
}

/// The IHL-sized IPv4 header at `l3`, when the packet can hold one.
fn ipv4_header(packet: &[u8], l3: usize) -> Option<&[u8]> {
    let first = *packet.get(l3)?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = ((first & 0x0F) as usize) << 2;
    if ihl < 20 {
        return None;
    }
    packet.get(l3..l3 + ihl)
}

/// Addresses, protocol and L4 segment for a packet with IPv4 at `l3`.
///
/// The segment runs from `l4` to the end of the IP datagram as declared
/// by the total length field, so Ethernet padding does not poison the sum.
fn l4_segment(packet: &[u8], l3: usize, l4: usize) -> Option<([u8; 4], [u8; 4], u8, &[u8])> {
    let header = ipv4_header(packet, l3)?;
    let total_len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let proto = header[9];
    let src: [u8; 4] = header[12..16].try_into().expect("header holds 20 bytes");
    let dst: [u8; 4] = header[16..20].try_into().expect("header holds 20 bytes");

    let ip_end = l3.checked_add(total_len)?;
    if l4 <= l3 || ip_end > packet.len() {
        return None;
    }
    let segment = packet.get(l4..ip_end)?;
    if segment.is_empty() {
        return None;
    }
    Some((src, dst, proto, segment))
}
