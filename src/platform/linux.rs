use anyhow::{Context, Result};
use async_trait::async_trait;
use libc::{c_char, c_short};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::net::IpAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::OnceLock;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, warn};

use super::common::{MAX_INTERFACE_NAME, command_output, run_command};
use etherparse::{Ipv4HeaderSlice, Ipv6HeaderSlice};

use crate::filter::packet::ip_version;
use crate::filter::{PacketForwarder, Tunnel, TunnelConfig, TunnelProvider};

const TUN_CLONE_DEVICE: &str = "/dev/net/tun";

// linux/if_tun.h
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const IFF_TUN: c_short = 0x0001;
const IFF_NO_PI: c_short = 0x1000;

/// `struct ifreq` restricted to the name and flags members
#[repr(C)]
struct IfReq {
    name: [c_char; libc::IFNAMSIZ],
    flags: c_short,
    _pad: [u8; 22],
}

impl IfReq {
    fn new(name: &str, flags: c_short) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
            anyhow::bail!("Invalid interface name: '{}'", name);
        }

        let mut req = Self {
            name: [0; libc::IFNAMSIZ],
            flags,
            _pad: [0; 22],
        };
        for (dst, src) in req.name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        Ok(req)
    }

    fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// A kernel TUN interface driven by the tokio reactor
pub struct TunDevice {
    name: String,
    fd: AsyncFd<File>,
}

impl TunDevice {
    /// Create (or attach to) the named TUN interface
    pub fn open(name: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(TUN_CLONE_DEVICE)
            .with_context(|| format!("Failed to open {}", TUN_CLONE_DEVICE))?;

        let mut req = IfReq::new(name, IFF_TUN | IFF_NO_PI)?;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF as _, &mut req as *mut IfReq) };
        if rc < 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("Failed to create TUN interface {}", name));
        }

        let fd = AsyncFd::with_interest(file, Interest::READABLE)
            .context("Failed to register TUN device with the runtime")?;

        Ok(Self {
            name: req.name(),
            fd,
        })
    }
}

#[async_trait]
impl Tunnel for TunDevice {
    async fn read_packet(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| inner.get_ref().read(buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens a TUN device and routes all IPv4 traffic through it
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxTunnelProvider;

impl TunnelProvider for LinuxTunnelProvider {
    fn establish(&self, config: &TunnelConfig) -> Result<Box<dyn Tunnel>> {
        let device = TunDevice::open(&config.interface)?;
        configure_interface(device.name(), config)?;
        info!("TUN interface {} is up", device.name());
        Ok(Box::new(device))
    }
}

fn configure_interface(name: &str, config: &TunnelConfig) -> Result<()> {
    let address = format!("{}/{}", config.address, config.prefix_len);
    let mtu = config.mtu.to_string();
    let route = format!("{}/{}", config.route.0, config.route.1);

    run_command("ip", &["addr", "add", &address, "dev", name])
        .with_context(|| format!("Failed to assign {} to {}", address, name))?;
    run_command("ip", &["link", "set", "dev", name, "mtu", &mtu, "up"])
        .with_context(|| format!("Failed to bring up {}", name))?;
    run_command("ip", &["route", "add", &route, "dev", name, "metric", "1"])
        .with_context(|| format!("Failed to route {} through {}", route, name))?;

    if !config.dns.is_empty() {
        let servers: Vec<String> = config.dns.iter().map(|s| s.to_string()).collect();
        let mut args = vec!["dns", name];
        args.extend(servers.iter().map(String::as_str));
        if let Err(e) = run_command("resolvectl", &args) {
            warn!("Could not set tunnel DNS servers: {:#}", e);
        }
    }

    Ok(())
}

/// Interface carrying the current default route, if any
pub fn default_route_interface() -> Result<Option<String>> {
    let output = command_output("ip", &["-4", "route", "show", "default"])?;
    Ok(parse_route_device(&output))
}

fn parse_route_device(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        while let Some(field) = fields.next() {
            if field == "dev" {
                return fields.next().map(str::to_string);
            }
        }
        None
    })
}

/// Hostname for an address from the system resolver (`getent hosts`)
pub fn lookup_hostname(ip: IpAddr) -> Option<String> {
    let output = command_output("getent", &["hosts", &ip.to_string()]).ok()?;
    parse_getent_hosts(&output)
}

fn parse_getent_hosts(output: &str) -> Option<String> {
    let name = output.lines().next()?.split_whitespace().nth(1)?;
    let short = name.split('.').next().unwrap_or(name);
    (!short.is_empty()).then(|| short.to_string())
}

/// Re-injects allowed packets through raw IP sockets
pub struct RawSocketForwarder {
    v4: OwnedFd,
    v6: OnceLock<Option<OwnedFd>>,
    uplink: Option<String>,
}

impl RawSocketForwarder {
    /// Open the IPv4 socket, optionally bound to the uplink interface
    pub fn new(uplink: Option<String>) -> Result<Self> {
        let v4 = open_raw_socket(libc::AF_INET, uplink.as_deref())
            .context("Failed to open raw IPv4 socket")?;

        match &uplink {
            Some(dev) => info!("Forwarding allowed traffic via {}", dev),
            None => warn!("No uplink interface; forwarded traffic may loop back into the tunnel"),
        }

        Ok(Self {
            v4,
            v6: OnceLock::new(),
            uplink,
        })
    }

    fn v6_socket(&self) -> Option<&OwnedFd> {
        self.v6
            .get_or_init(|| match open_raw_socket(libc::AF_INET6, self.uplink.as_deref()) {
                Ok(fd) => Some(fd),
                Err(e) => {
                    warn!("IPv6 forwarding unavailable: {}", e);
                    None
                }
            })
            .as_ref()
    }

    fn send_v4(&self, packet: &[u8]) -> io::Result<()> {
        let header = Ipv4HeaderSlice::from_slice(packet)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr = libc::in_addr {
            s_addr: u32::from_ne_bytes(header.destination()),
        };

        send_to(&self.v4, packet, &addr)
    }

    fn send_v6(&self, packet: &[u8]) -> io::Result<()> {
        let socket = self
            .v6_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no IPv6 raw socket"))?;
        let header = Ipv6HeaderSlice::from_slice(packet)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut addr: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        addr.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        addr.sin6_addr.s6_addr = header.destination();

        send_to(socket, packet, &addr)
    }
}

impl PacketForwarder for RawSocketForwarder {
    fn forward(&self, packet: &[u8]) -> io::Result<()> {
        match ip_version(packet) {
            Some(4) => self.send_v4(packet),
            Some(6) => self.send_v6(packet),
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot forward IP version {:?}", other),
            )),
        }
    }
}

fn open_raw_socket(domain: libc::c_int, uplink: Option<&str>) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::socket(domain, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::IPPROTO_RAW) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    if let Some(dev) = uplink {
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                dev.as_ptr() as *const libc::c_void,
                dev.len() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("Raw socket bound to {}", dev);
    }

    Ok(fd)
}

fn send_to<A>(socket: &OwnedFd, packet: &[u8], addr: &A) -> io::Result<()> {
    let rc = unsafe {
        libc::sendto(
            socket.as_raw_fd(),
            packet.as_ptr() as *const libc::c_void,
            packet.len(),
            0,
            addr as *const A as *const libc::sockaddr,
            std::mem::size_of::<A>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifreq_layout_matches_kernel() {
        assert_eq!(std::mem::size_of::<IfReq>(), 40);
        assert_eq!(MAX_INTERFACE_NAME, libc::IFNAMSIZ - 1);
    }

    #[test]
    fn test_ifreq_name_round_trip() {
        let req = IfReq::new("nf0", IFF_TUN | IFF_NO_PI).unwrap();
        assert_eq!(req.name(), "nf0");
        assert_eq!(req.flags, 0x1001);

        assert!(IfReq::new("", IFF_TUN).is_err());
        assert!(IfReq::new("a-very-long-name0", IFF_TUN).is_err());
    }

    #[test]
    fn test_parse_route_device() {
        let output = "default via 192.168.1.1 dev wlp3s0 proto dhcp metric 600\n";
        assert_eq!(parse_route_device(output), Some("wlp3s0".to_string()));
        assert_eq!(parse_route_device(""), None);
        assert_eq!(parse_route_device("default via 10.0.0.1"), None);
    }

    #[test]
    fn test_parse_getent_hosts() {
        assert_eq!(
            parse_getent_hosts("192.168.1.20    kids-laptop.lan\n"),
            Some("kids-laptop".to_string())
        );
        assert_eq!(parse_getent_hosts("192.168.1.20\n"), None);
        assert_eq!(parse_getent_hosts(""), None);
    }
}
