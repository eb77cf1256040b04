use thiserror::Error;

/// Failures raised by the filtering and accounting core
///
/// `TunnelUnavailable` is returned by the control surface and
/// `PersistenceFailure` by management actions. Inside the loops every kind is
/// absorbed by the loop that hit it and only shows up in logs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The virtual interface could not be established
    #[error("Tunnel unavailable: {0:#}")]
    TunnelUnavailable(#[source] anyhow::Error),

    /// A packet could not be classified and was forwarded as-is
    #[error("Packet parse skipped: {0}")]
    PacketParseSkipped(&'static str),

    /// A discovery cycle was abandoned
    #[error("Scan cycle failed: {0:#}")]
    ScanCycleFailed(#[source] anyhow::Error),

    /// The settings store could not be read or written
    #[error("Persistence failure: {0:#}")]
    PersistenceFailure(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_unavailable_includes_cause_chain() {
        let cause = anyhow::anyhow!("permission denied").context("Failed to open /dev/net/tun");
        let err = CoreError::TunnelUnavailable(cause);
        let message = err.to_string();
        assert!(message.starts_with("Tunnel unavailable"));
        assert!(message.contains("permission denied"));
    }
}
