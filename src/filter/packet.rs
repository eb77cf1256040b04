use etherparse::Ipv4HeaderSlice;
use std::net::Ipv4Addr;

use crate::error::CoreError;

/// Fields of an IPv4 header the filter looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub protocol: u8,
    pub destination: Ipv4Addr,
}

/// IP version from the high nibble of the first byte
pub fn ip_version(packet: &[u8]) -> Option<u8> {
    packet.first().map(|b| b >> 4)
}

/// Classify a raw packet
///
/// Anything that is not a well-formed IPv4 header comes back as
/// `PacketParseSkipped`; such packets are forwarded unfiltered.
pub fn inspect(packet: &[u8]) -> Result<Ipv4Header, CoreError> {
    if ip_version(packet) != Some(4) {
        return Err(CoreError::PacketParseSkipped("not IPv4"));
    }

    let header = Ipv4HeaderSlice::from_slice(packet)
        .map_err(|_| CoreError::PacketParseSkipped("malformed IPv4 header"))?;

    Ok(Ipv4Header {
        protocol: header.protocol().0,
        destination: header.destination_addr(),
    })
}

#[cfg(test)]
pub mod testing {
    use std::net::Ipv4Addr;

    const HEADER_LEN: usize = 20;

    /// Minimal IPv4/UDP packet toward `destination`
    pub fn ipv4_packet(destination: Ipv4Addr) -> Vec<u8> {
        let mut packet = vec![0u8; HEADER_LEN + 8];
        let total_len = packet.len() as u16;
        packet[0] = 0x45;
        packet[2..4].copy_from_slice(&total_len.to_be_bytes());
        packet[8] = 64;
        packet[9] = 17;
        packet[12..16].copy_from_slice(&[10, 0, 0, 2]);
        packet[16..20].copy_from_slice(&destination.octets());
        packet
    }

    pub fn ipv6_packet() -> Vec<u8> {
        let mut packet = vec![0u8; 48];
        packet[0] = 0x60;
        packet
    }
}
