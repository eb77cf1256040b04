use anyhow::{Context, Result};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::registry::{is_usable_mac, normalize_mac};

/// Default location of the kernel neighbor (ARP) table
pub const PROC_NET_ARP: &str = "/proc/net/arp";

/// One neighbor-table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub ip: String,
    pub mac: String,
}

/// Source of (IP, MAC) pairs for hosts on the local segment
pub trait NeighborTableReader: Send + Sync {
    fn read_neighbors(&self) -> Result<Vec<Neighbor>>;
}

/// Parse the `/proc/net/arp` text format
///
/// The first line is a header. Field 0 is the IP address and field 3 the
/// hardware address. Short rows and unusable addresses are skipped.
pub fn parse_neighbor_table(content: &str) -> Vec<Neighbor> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || !is_usable_mac(fields[3]) {
                return None;
            }
            Some(Neighbor {
                ip: fields[0].to_string(),
                mac: normalize_mac(fields[3]),
            })
        })
        .collect()
}

/// Reads the neighbor table from a procfs-style file
#[derive(Debug, Clone)]
pub struct ProcArpReader {
    path: PathBuf,
}

impl ProcArpReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcArpReader {
    fn default() -> Self {
        Self::new(PROC_NET_ARP)
    }
}

impl NeighborTableReader for ProcArpReader {
    fn read_neighbors(&self) -> Result<Vec<Neighbor>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read neighbor table: {}", self.path.display()))?;
        Ok(parse_neighbor_table(&content))
    }
}

/// Friendly names for newly discovered devices
pub trait DeviceNamer: Send + Sync {
    /// `None` means the caller falls back to an address-derived name
    fn device_name(&self, ip: &str, mac: &str) -> Option<String>;
}

/// Names devices through reverse lookup of their IP address
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameNamer;

impl DeviceNamer for HostnameNamer {
    fn device_name(&self, ip: &str, _mac: &str) -> Option<String> {
        let ip: IpAddr = ip.parse().ok()?;
        crate::platform::lookup_hostname(ip)
    }
}

/// Never resolves a name
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookupNamer;

impl DeviceNamer for NoLookupNamer {
    fn device_name(&self, _ip: &str, _mac: &str) -> Option<String> {
        None
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const ARP_TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         AA:BB:CC:00:11:22     *        wlan0
192.168.1.23     0x1         0x2         3c:22:fb:12:34:56     *        wlan0
192.168.1.40     0x1         0x0         00:00:00:00:00:00     *        wlan0
192.168.1.50     0x1
";

    #[test]
    fn test_parse_neighbor_table() {
        let rows = parse_neighbor_table(ARP_TABLE);
        assert_eq!(
            rows,
            vec![
                Neighbor {
                    ip: "192.168.1.1".to_string(),
                    mac: "aa:bb:cc:00:11:22".to_string(),
                },
                Neighbor {
                    ip: "192.168.1.23".to_string(),
                    mac: "3c:22:fb:12:34:56".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_header_only_table() {
        assert!(parse_neighbor_table("IP address HW type Flags HW address Mask Device\n").is_empty());
        assert!(parse_neighbor_table("").is_empty());
    }

    #[test]
    fn test_proc_arp_reader_reads_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("arp");
        file.write_str(ARP_TABLE).unwrap();

        let rows = ProcArpReader::new(file.path()).read_neighbors().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_proc_arp_reader_missing_file_fails() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = ProcArpReader::new(temp.child("missing").path())
            .read_neighbors()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read neighbor table"));
    }

    #[test]
    fn test_hostname_namer_rejects_bad_ip() {
        assert_eq!(HostnameNamer.device_name("not-an-ip", "aa:bb:cc:dd:ee:ff"), None);
        assert_eq!(NoLookupNamer.device_name("192.168.1.2", "aa:bb:cc:dd:ee:ff"), None);
    }
}
