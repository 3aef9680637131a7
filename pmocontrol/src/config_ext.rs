//! Control point settings read from pmoconfig.

use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_SUBSCRIPTION_SECS: u64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPointSettings {
    /// Port of the NOTIFY listener, 0 for an ephemeral port
    pub notify_port: u16,
    /// Timeout of description fetches
    pub pending_request_timeout: Duration,
    pub action_call_timeout: Duration,
    /// Duration requested in `TIMEOUT: Second-N`
    pub event_subscription: Duration,
    /// Renewals are sent this long before a subscription expires
    pub subscription_renewal_gap: Duration,
}

impl Default for ControlPointSettings {
    fn default() -> Self {
        Self {
            notify_port: 0,
            pending_request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            action_call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            event_subscription: Duration::from_secs(DEFAULT_EVENT_SUBSCRIPTION_SECS),
            subscription_renewal_gap: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ControlPointSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            notify_port: u16::try_from(config.get_cp_http_port()?).unwrap_or(0),
            pending_request_timeout: Duration::from_secs(config.get_pending_request_timeout_secs()?),
            action_call_timeout: Duration::from_secs(config.get_action_call_timeout_secs()?),
            event_subscription: Duration::from_secs(config.get_event_subscription_secs()?),
            subscription_renewal_gap: Duration::from_secs(
                config.get_subscription_renewal_gap_secs()?,
            ),
        })
    }
}

/// Extension trait giving `pmoconfig::Config` access to the control point settings.
///
/// ```rust,ignore
/// use pmocontrol::ControlPointConfigExt;
///
/// let settings = pmoconfig::get_config().get_control_point_settings()?;
/// ```
pub trait ControlPointConfigExt {
    fn get_control_point_settings(&self) -> Result<ControlPointSettings>;
}

impl ControlPointConfigExt for Config {
    fn get_control_point_settings(&self) -> Result<ControlPointSettings> {
        ControlPointSettings::from_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            config.get_control_point_settings().unwrap(),
            ControlPointSettings::default()
        );

        config.set_cp_http_port(40123).unwrap();
        config.set_action_call_timeout_secs(5).unwrap();
        let settings = config.get_control_point_settings().unwrap();
        assert_eq!(settings.notify_port, 40123);
        assert_eq!(settings.action_call_timeout, Duration::from_secs(5));
    }
}
