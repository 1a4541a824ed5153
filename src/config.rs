use crate::protocol;
use crate::types::Dimensions;
use crate::{Result, SmartCamError};
use std::time::Duration;

/// What the session does when a read fails with an I/O error (as opposed
/// to the peer closing the stream).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy {
    /// Cancel the connection, like a write failure or a closed stream.
    #[default]
    Cancel = 0,
    /// Log the error and issue no further protocol activity. The session
    /// stays parked until `stop()` is called, which then reports `Cancelled`.
    Stall = 1,
}

/// Client configuration. Validated once by [`crate::Controller::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Size of each of the two images in a frame.
    pub dimensions: Dimensions,
    /// Byte sent to ask the camera whether a frame is ready.
    pub poll_request: u8,
    /// Pause after a "not ready" response before polling again.
    pub poll_backoff: Duration,
    /// Timeout for a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Pause between connect attempts while `Waiting`.
    pub connect_retry_interval: Duration,
    /// Give up with `Failed` after this many transient connect failures.
    /// `None` keeps waiting until `stop()`.
    pub max_connect_attempts: Option<u32>,
    /// Deadline for each poll-response or frame read. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub read_failure_policy: ReadFailurePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::DEFAULT,
            poll_request: protocol::POLL_REQUEST,
            poll_backoff: protocol::POLL_BACKOFF,
            connect_timeout: Duration::from_secs(5),
            connect_retry_interval: Duration::from_secs(1),
            max_connect_attempts: None,
            read_timeout: None,
            read_failure_policy: ReadFailurePolicy::Cancel,
        }
    }
}

impl ClientConfig {
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Result<Self> {
        self.dimensions = Dimensions::new(width, height)?;
        Ok(self)
    }

    pub fn with_poll_backoff(mut self, backoff: Duration) -> Self {
        self.poll_backoff = backoff;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_connect_retry_interval(mut self, interval: Duration) -> Self {
        self.connect_retry_interval = interval;
        self
    }

    pub fn with_max_connect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(SmartCamError::InvalidConfig(
                "connect_timeout must be nonzero".into(),
            ));
        }
        if self.connect_retry_interval.is_zero() {
            return Err(SmartCamError::InvalidConfig(
                "connect_retry_interval must be nonzero".into(),
            ));
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SmartCamError::InvalidConfig(
                "read_timeout must be nonzero when set".into(),
            ));
        }
        if self.max_connect_attempts == Some(0) {
            return Err(SmartCamError::InvalidConfig(
                "max_connect_attempts must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `SMARTCAM_*` environment variables.
    ///
    /// Recognised: `SMARTCAM_WIDTH`, `SMARTCAM_HEIGHT`, `SMARTCAM_POLL_BACKOFF_MS`,
    /// `SMARTCAM_READ_TIMEOUT_MS`, `SMARTCAM_READ_FAILURE` (`cancel` | `stall`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ClientConfig::default();

        let width = parse_var(&lookup, "SMARTCAM_WIDTH")?.unwrap_or(config.dimensions.width() as u64);
        let height =
            parse_var(&lookup, "SMARTCAM_HEIGHT")?.unwrap_or(config.dimensions.height() as u64);
        let width = u32::try_from(width)
            .map_err(|_| SmartCamError::InvalidConfig(format!("SMARTCAM_WIDTH={} too large", width)))?;
        let height = u32::try_from(height).map_err(|_| {
            SmartCamError::InvalidConfig(format!("SMARTCAM_HEIGHT={} too large", height))
        })?;
        config = config.with_dimensions(width, height)?;

        if let Some(ms) = parse_var(&lookup, "SMARTCAM_POLL_BACKOFF_MS")? {
            config.poll_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "SMARTCAM_READ_TIMEOUT_MS")? {
            config.read_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(policy) = lookup("SMARTCAM_READ_FAILURE") {
            config.read_failure_policy = match policy.trim().to_ascii_lowercase().as_str() {
                "cancel" => ReadFailurePolicy::Cancel,
                "stall" => ReadFailurePolicy::Stall,
                other => {
                    return Err(SmartCamError::InvalidConfig(format!(
                        "SMARTCAM_READ_FAILURE={} (expected cancel or stall)",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SmartCamError::InvalidConfig(format!("{}={} is not a number", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.dimensions.frame_len(), 204_800);
        assert_eq!(config.poll_request, 0x02);
        assert_eq!(config.poll_backoff, Duration::from_millis(250));
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::Cancel);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = ClientConfig::default().with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_read_timeout(Some(Duration::ZERO));
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_max_connect_attempts(Some(0));
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_connect_retry_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(SmartCamError::InvalidConfig(msg)) if msg.contains("connect_retry_interval")
        ));

        assert!(ClientConfig::default().with_dimensions(0, 320).is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SMARTCAM_WIDTH", "640"),
            ("SMARTCAM_HEIGHT", "480"),
            ("SMARTCAM_POLL_BACKOFF_MS", "100"),
            ("SMARTCAM_READ_TIMEOUT_MS", "2000"),
            ("SMARTCAM_READ_FAILURE", "Stall"),
        ]))
        .unwrap();

        assert_eq!(config.dimensions.width(), 640);
        assert_eq!(config.dimensions.height(), 480);
        assert_eq!(config.poll_backoff, Duration::from_millis(100));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::Stall);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(ClientConfig::from_lookup(lookup(&[("SMARTCAM_WIDTH", "wide")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("SMARTCAM_READ_FAILURE", "retry")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("SMARTCAM_HEIGHT", "0")])).is_err());
    }
}
