//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use bpf_vm::extension::checksum::{
    fold, internet_checksum, ipv4_pseudo_header_sum, ones_complement_sum,
};
use bpf_vm::prelude::*;

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;

/// Runs `program` over `packet` with a fresh interpreter and context.
pub fn run(program: Program, packet: &[u8]) -> (u32, ErrorFlags) {
    let mut vm = Interpreter::new();
    vm.load_program(program).expect("test program must validate");

    let mut ctx = ExecutionContext::new();
    ctx.load_packet(packet).expect("test packet must fit");
    let verdict = vm.execute(&mut ctx).expect("test program must terminate");
    (verdict, ctx.registers().error())
}

/// Same as [`run`], for programs given in a textual form.
pub fn run_text(program: &str, packet: &[u8]) -> (u32, ErrorFlags) {
    run(
        Program::from_text(program).expect("test program must parse"),
        packet,
    )
}

/// An Ethernet/IPv4/TCP SYN with valid layer-3 and layer-4 checksums.
pub fn tcp_syn_packet(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    ipv4_packet(src, dst, 6, &tcp_syn_header(src, dst, sport, dport))
}

/// An Ethernet/IPv4/UDP datagram with valid checksums.
pub fn udp_packet(
    src: [u8; 4],
    dst: [u8; 4],
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut udp = Vec::with_capacity(8 + payload.len());
    udp.extend_from_slice(&sport.to_be_bytes());
    udp.extend_from_slice(&dport.to_be_bytes());
    udp.extend_from_slice(&(8 + payload.len() as u16).to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);

    let pseudo = ipv4_pseudo_header_sum(src, dst, 17, udp.len() as u16);
    let checksum = !fold(ones_complement_sum(&udp, pseudo));
    udp[6..8].copy_from_slice(&checksum.to_be_bytes());

    ipv4_packet(src, dst, 17, &udp)
}

fn tcp_syn_header(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&sport.to_be_bytes());
    tcp[2..4].copy_from_slice(&dport.to_be_bytes());
    tcp[12] = 5 << 4;
    tcp[13] = 0x02;
    tcp[14..16].copy_from_slice(&0x7210u16.to_be_bytes());

    let pseudo = ipv4_pseudo_header_sum(src, dst, 6, tcp.len() as u16);
    let checksum = !fold(ones_complement_sum(&tcp, pseudo));
    tcp[16..18].copy_from_slice(&checksum.to_be_bytes());
    tcp
}

/// Wraps an L4 segment in Ethernet and IPv4 framing.
pub fn ipv4_packet(src: [u8; 4], dst: [u8; 4], proto: u8, segment: &[u8]) -> Vec<u8> {
    let mut ip = vec![0u8; IPV4_HDR_LEN];
    ip[0] = 0x45;
    let total_len = (IPV4_HDR_LEN + segment.len()) as u16;
    ip[2..4].copy_from_slice(&total_len.to_be_bytes());
    ip[4..6].copy_from_slice(&0x1c46u16.to_be_bytes());
    ip[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
    ip[8] = 64;
    ip[9] = proto;
    ip[12..16].copy_from_slice(&src);
    ip[16..20].copy_from_slice(&dst);
    let checksum = internet_checksum(&ip);
    ip[10..12].copy_from_slice(&checksum.to_be_bytes());

    let mut packet = ethernet_header(0x0800);
    packet.extend_from_slice(&ip);
    packet.extend_from_slice(segment);
    packet
}

/// An Ethernet header with the given EtherType and fixed MACs.
pub fn ethernet_header(ethertype: u16) -> Vec<u8> {
    let mut eth = vec![0u8; ETH_HDR_LEN];
    eth[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    eth[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    eth[12..14].copy_from_slice(&ethertype.to_be_bytes());
    eth
}

/// Records the usual layer offsets for an Ethernet/IPv4/L4 packet.
pub fn record_ipv4_layers(ctx: &mut ExecutionContext) {
    let l3 = ETH_HDR_LEN as u64;
    let l4 = (ETH_HDR_LEN + IPV4_HDR_LEN) as u64;
    ctx.registers_mut().set_l3_offset(l3);
    ctx.registers_mut().set_l4_offset(l4);
    ctx.registers_mut().set_payload_offset(l4);
}
