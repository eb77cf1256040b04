use anyhow::Result;
use tracing::{info, warn};

/// Fire-and-forget user notifications
pub trait Notifier: Send + Sync {
    fn notify_blocked_site(&self, site: &str);
    fn notify_time_limit_reached(&self, device_name: &str);
}

/// Notifications written to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_blocked_site(&self, site: &str) {
        info!("Blocked access to {}", site);
    }

    fn notify_time_limit_reached(&self, device_name: &str) {
        info!("{} has reached its daily time limit and was blocked", device_name);
    }
}

/// Desktop notifications through the platform notification tool
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn send(&self, title: &str, message: &str) {
        if let Err(e) = send_system_notification(title, message) {
            warn!("Desktop notification failed ({:#}): {} - {}", e, title, message);
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify_blocked_site(&self, site: &str) {
        info!("Blocked access to {}", site);
        self.send("Site Blocked", &format!("Access to {} was blocked.", site));
    }

    fn notify_time_limit_reached(&self, device_name: &str) {
        info!("{} has reached its daily time limit and was blocked", device_name);
        self.send(
            "Time Limit Reached",
            &format!("{} has used up today's network time and is now blocked.", device_name),
        );
    }
}

/// Send a system notification (platform-specific)
fn send_system_notification(title: &str, message: &str) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::process::Command;
        let status = Command::new("notify-send")
            .arg(title)
            .arg(message)
            .arg("--icon=dialog-warning")
            .status()?;
        if !status.success() {
            anyhow::bail!("notify-send exited with {}", status);
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            message.replace('"', "'"),
            title
        );
        Command::new("osascript").arg("-e").arg(&script).output()?;
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        warn!("Notification: {} - {}", title, message);
    }

    Ok(())
}

/// Notifier selected by the daemon configuration
pub fn from_config(desktop: bool) -> std::sync::Arc<dyn Notifier> {
    if desktop {
        std::sync::Arc::new(DesktopNotifier)
    } else {
        std::sync::Arc::new(LogNotifier)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingNotifier, Sent};
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.notify_blocked_site("example.com");
        notifier.notify_time_limit_reached("tablet");

        assert_eq!(
            notifier.sent(),
            vec![
                Sent::BlockedSite("example.com".to_string()),
                Sent::TimeLimitReached("tablet".to_string()),
            ]
        );
    }

    #[test]
    fn test_log_notifier_does_not_panic() {
        let notifier = from_config(false);
        notifier.notify_blocked_site("example.com");
        notifier.notify_time_limit_reached("tablet");
    }
}
