use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a device stays in the active view after it was last seen
pub const STALE_AFTER: Duration = Duration::seconds(60);

const ZERO_MAC: &str = "00:00:00:00:00:00";

/// A host discovered on the local segment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub mac_address: String,
    pub ip_address: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub is_blocked: bool,
    /// Daily budget in milliseconds (0 = unlimited)
    #[serde(default)]
    pub time_limit: u64,
    /// Usage accrued today in milliseconds
    #[serde(default)]
    pub time_used_today: u64,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub first_connected: DateTime<Utc>,
}

fn default_device_name() -> String {
    "Unknown Device".to_string()
}

impl Device {
    pub fn new(mac_address: &str, ip_address: &str, device_name: String, now: DateTime<Utc>) -> Self {
        Self {
            mac_address: normalize_mac(mac_address),
            ip_address: ip_address.to_string(),
            device_name,
            is_blocked: false,
            time_limit: 0,
            time_used_today: 0,
            last_seen: now,
            first_connected: now,
        }
    }

    /// Whether the device belongs to the active view
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen <= STALE_AFTER
    }

    pub fn is_time_limit_reached(&self) -> bool {
        self.time_limit > 0 && self.time_used_today >= self.time_limit
    }

    /// Remaining budget in milliseconds, `None` when unlimited
    pub fn time_remaining(&self) -> Option<u64> {
        (self.time_limit > 0).then(|| self.time_limit.saturating_sub(self.time_used_today))
    }

    pub fn formatted_time_remaining(&self) -> String {
        match self.time_remaining() {
            None => "Unlimited".to_string(),
            Some(remaining) => {
                let hours = remaining / (1000 * 60 * 60);
                let minutes = (remaining % (1000 * 60 * 60)) / (1000 * 60);
                format!("{}h {}m", hours, minutes)
            }
        }
    }
}

/// Canonical form of a link-layer address
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase()
}

/// Whether a neighbor-table address identifies a real host
pub fn is_usable_mac(mac: &str) -> bool {
    let mac = normalize_mac(mac);
    !mac.is_empty() && mac != ZERO_MAC
}

/// Name used when no hostname is known: `Device-` and the trailing bytes of
/// the address
pub fn fallback_device_name(mac: &str) -> String {
    let mac = normalize_mac(mac);
    let start = mac.len().saturating_sub(8);
    let tail = mac.get(start..).unwrap_or(&mac);
    format!("Device-{}", tail.replace(':', ""))
}

/// Outcome of recording a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Updated,
    Created,
}

/// Device table keyed by link-layer address
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn get(&self, mac: &str) -> Option<&Device> {
        let mac = normalize_mac(mac);
        self.devices.iter().find(|d| d.mac_address == mac)
    }

    pub fn get_mut(&mut self, mac: &str) -> Option<&mut Device> {
        let mac = normalize_mac(mac);
        self.devices.iter_mut().find(|d| d.mac_address == mac)
    }

    /// Record that `mac` was seen at `ip`
    ///
    /// Existing entries get their address and last-seen time refreshed. New
    /// entries are built by `create`, which is only invoked for unknown
    /// addresses.
    pub fn observe<F>(&mut self, mac: &str, ip: &str, now: DateTime<Utc>, create: F) -> Observation
    where
        F: FnOnce() -> Device,
    {
        match self.get_mut(mac) {
            Some(device) => {
                device.ip_address = ip.to_string();
                device.last_seen = now;
                Observation::Updated
            }
            None => {
                let mut device = create();
                device.mac_address = normalize_mac(mac);
                device.ip_address = ip.to_string();
                device.last_seen = now;
                self.devices.push(device);
                Observation::Created
            }
        }
    }

    /// Devices currently in the active view
    pub fn active(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.is_online(now))
    }

    /// Mutable access to devices in the active view
    pub fn active_mut(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut().filter(move |d| d.is_online(now))
    }

    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.active(now).count()
    }

    /// Drop a device entirely, returning it if it existed
    pub fn remove(&mut self, mac: &str) -> Option<Device> {
        let mac = normalize_mac(mac);
        let index = self.devices.iter().position(|d| d.mac_address == mac)?;
        Some(self.devices.remove(index))
    }

    /// Zero every device's usage for a new day
    pub fn reset_daily_usage(&mut self) {
        for device in &mut self.devices {
            device.time_used_today = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(mac: &str, now: DateTime<Utc>) -> Device {
        Device::new(mac, "192.168.1.10", fallback_device_name(mac), now)
    }

    #[test]
    fn test_fallback_device_name_uses_trailing_bytes() {
        assert_eq!(fallback_device_name("AA:BB:CC:DD:EE:FF"), "Device-ddeeff");
        assert_eq!(fallback_device_name("ab"), "Device-ab");
    }

    #[test]
    fn test_is_usable_mac() {
        assert!(is_usable_mac("aa:bb:cc:dd:ee:ff"));
        assert!(!is_usable_mac("00:00:00:00:00:00"));
        assert!(!is_usable_mac(""));
    }

    #[test]
    fn test_observe_creates_then_updates() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);
        let mut registry = DeviceRegistry::default();

        let first = registry.observe("AA:BB:CC:DD:EE:FF", "192.168.1.10", t0, || {
            device("aa:bb:cc:dd:ee:ff", t0)
        });
        assert_eq!(first, Observation::Created);

        let second = registry.observe("aa:bb:cc:dd:ee:ff", "192.168.1.11", t1, || {
            panic!("existing device must not be recreated")
        });
        assert_eq!(second, Observation::Updated);

        assert_eq!(registry.len(), 1);
        let entry = registry.get("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(entry.ip_address, "192.168.1.11");
        assert_eq!(entry.last_seen, t1);
        assert_eq!(entry.first_connected, t0);
    }

    #[test]
    fn test_active_view_excludes_stale_devices() {
        let now = Utc::now();
        let mut registry = DeviceRegistry::new(vec![
            device("aa:aa:aa:aa:aa:aa", now - Duration::seconds(30)),
            device("bb:bb:bb:bb:bb:bb", now - Duration::seconds(61)),
        ]);

        assert_eq!(registry.active_count(now), 1);
        assert_eq!(registry.len(), 2);

        registry.observe("bb:bb:bb:bb:bb:bb", "192.168.1.12", now, || unreachable!());
        assert_eq!(registry.active_count(now), 2);
    }

    #[test]
    fn test_time_budget_helpers() {
        let now = Utc::now();
        let mut d = device("aa:bb:cc:dd:ee:ff", now);
        assert!(!d.is_time_limit_reached());
        assert_eq!(d.formatted_time_remaining(), "Unlimited");

        d.time_limit = 2 * 60 * 60 * 1000;
        d.time_used_today = 30 * 60 * 1000;
        assert_eq!(d.time_remaining(), Some(90 * 60 * 1000));
        assert_eq!(d.formatted_time_remaining(), "1h 30m");

        d.time_used_today = d.time_limit + 5_000;
        assert!(d.is_time_limit_reached());
        assert_eq!(d.time_remaining(), Some(0));
    }

    #[test]
    fn test_remove_and_reset() {
        let now = Utc::now();
        let mut a = device("aa:aa:aa:aa:aa:aa", now);
        a.time_used_today = 5_000;
        let mut registry = DeviceRegistry::new(vec![a, device("bb:bb:bb:bb:bb:bb", now)]);

        registry.reset_daily_usage();
        assert!(registry.iter().all(|d| d.time_used_today == 0));

        assert!(registry.remove("AA:AA:AA:AA:AA:AA").is_some());
        assert!(registry.remove("aa:aa:aa:aa:aa:aa").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_device_schema() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut d = device("aa:bb:cc:dd:ee:ff", now);
        d.time_limit = 1000;

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["macAddress"], "aa:bb:cc:dd:ee:ff");
        assert_eq!(json["ipAddress"], "192.168.1.10");
        assert_eq!(json["deviceName"], "Device-ddeeff");
        assert_eq!(json["isBlocked"], false);
        assert_eq!(json["timeLimit"], 1000);
        assert_eq!(json["timeUsedToday"], 0);
        assert_eq!(json["lastSeen"], 1_700_000_000_000i64);
        assert_eq!(json["firstConnected"], 1_700_000_000_000i64);

        let registry = DeviceRegistry::new(vec![d]);
        assert!(serde_json::to_value(&registry).unwrap().is_array());
    }
}
