pub mod common;

#[cfg(target_os = "linux")]
pub mod linux;

use anyhow::Result;
use std::net::IpAddr;
use std::sync::Arc;

use crate::filter::{PacketForwarder, TunnelProvider};

pub use common::ensure_admin_privileges;

/// Tunnel provider and forwarder for the current platform
pub fn traffic_backend(uplink: Option<String>) -> Result<(Arc<dyn TunnelProvider>, Arc<dyn PacketForwarder>)> {
    #[cfg(target_os = "linux")]
    {
        let uplink = match uplink {
            Some(uplink) => Some(uplink),
            None => linux::default_route_interface()?,
        };
        let forwarder = linux::RawSocketForwarder::new(uplink)?;
        Ok((Arc::new(linux::LinuxTunnelProvider), Arc::new(forwarder)))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = uplink;
        anyhow::bail!("Traffic filtering is only supported on Linux");
    }
}

/// Hostname for a neighbor address, if the system resolver knows one
pub fn lookup_hostname(ip: IpAddr) -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        linux::lookup_hostname(ip)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = ip;
        None
    }
}
