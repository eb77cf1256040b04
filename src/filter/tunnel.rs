use anyhow::Result;
use async_trait::async_trait;
use std::io;
use std::net::Ipv4Addr;

/// Address assigned to the local end of the tunnel
pub const TUNNEL_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const TUNNEL_PREFIX_LEN: u8 = 24;
/// Route sent through the tunnel (all IPv4 traffic)
pub const TUNNEL_ROUTE: (Ipv4Addr, u8) = (Ipv4Addr::UNSPECIFIED, 0);
pub const TUNNEL_DNS: [Ipv4Addr; 2] = [Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)];
pub const TUNNEL_MTU: u32 = 1500;
/// Read buffer size for a single packet
pub const MAX_PACKET_SIZE: usize = 32767;

/// Parameters used to establish the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub interface: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub route: (Ipv4Addr, u8),
    pub dns: Vec<Ipv4Addr>,
    pub mtu: u32,
}

impl TunnelConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            address: TUNNEL_ADDRESS,
            prefix_len: TUNNEL_PREFIX_LEN,
            route: TUNNEL_ROUTE,
            dns: TUNNEL_DNS.to_vec(),
            mtu: TUNNEL_MTU,
        }
    }
}

/// An established tunnel the filter reads outbound packets from
///
/// Dropping the tunnel closes it.
#[async_trait]
pub trait Tunnel: Send {
    /// Read one packet. `Ok(0)` means the tunnel was closed.
    async fn read_packet(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn name(&self) -> &str;
}

/// Creates tunnels
pub trait TunnelProvider: Send + Sync {
    fn establish(&self, config: &TunnelConfig) -> Result<Box<dyn Tunnel>>;
}

/// Sends allowed packets on toward their destination
pub trait PacketForwarder: Send + Sync {
    fn forward(&self, packet: &[u8]) -> io::Result<()>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Tunnel fed from a channel; closing the sender closes the tunnel
    pub struct ChannelTunnel {
        packets: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    #[async_trait]
    impl Tunnel for ChannelTunnel {
        async fn read_packet(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.packets.recv().await {
                Some(packet) => {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    Ok(len)
                }
                None => Ok(0),
            }
        }

        fn name(&self) -> &str {
            "test0"
        }
    }

    /// Hands out one channel tunnel per `establish`, or fails when told to
    #[derive(Default)]
    pub struct ChannelTunnelProvider {
        senders: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
        fail: Mutex<bool>,
        established: Mutex<Vec<TunnelConfig>>,
    }

    impl ChannelTunnelProvider {
        pub fn failing() -> Self {
            let provider = Self::default();
            *provider.fail.lock().unwrap() = true;
            provider
        }

        /// Sender of the most recently established tunnel
        pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
            self.senders.lock().unwrap().last().cloned().expect("no tunnel established")
        }

        pub fn close_all(&self) {
            self.senders.lock().unwrap().clear();
        }

        pub fn established(&self) -> Vec<TunnelConfig> {
            self.established.lock().unwrap().clone()
        }
    }

    impl TunnelProvider for ChannelTunnelProvider {
        fn establish(&self, config: &TunnelConfig) -> Result<Box<dyn Tunnel>> {
            if *self.fail.lock().unwrap() {
                anyhow::bail!("Failed to open /dev/net/tun: permission denied");
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            self.established.lock().unwrap().push(config.clone());
            Ok(Box::new(ChannelTunnel { packets: rx }))
        }
    }

    /// Forwarder that records every packet it is given
    #[derive(Default)]
    pub struct RecordingForwarder {
        packets: Mutex<Vec<Vec<u8>>>,
        fail: Mutex<bool>,
    }

    impl RecordingForwarder {
        pub fn packets(&self) -> Vec<Vec<u8>> {
            self.packets.lock().unwrap().clone()
        }

        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    impl PacketForwarder for RecordingForwarder {
        fn forward(&self, packet: &[u8]) -> io::Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(io::Error::other("network unreachable"));
            }
            self.packets.lock().unwrap().push(packet.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_config_defaults() {
        let config = TunnelConfig::new("nf0");
        assert_eq!(config.address.to_string(), "10.0.0.2");
        assert_eq!(config.prefix_len, 24);
        assert_eq!(config.route, (Ipv4Addr::new(0, 0, 0, 0), 0));
        assert_eq!(config.dns, vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]);
        assert_eq!(config.mtu, 1500);
        assert_eq!(MAX_PACKET_SIZE, 32767);
    }
}
