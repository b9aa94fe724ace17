use std::{str::FromStr, time::Duration};

use dotenv::dotenv;
use rand::Rng;

use crate::{
    error::SessionError,
    types::{
        AnnounceDelay, DEFAULT_CHANNEL_NAME, DEFAULT_EXPIRY_SWEEP_INTERVAL,
        DEFAULT_FALLBACK_CHANNEL_NAME, DEFAULT_REANNOUNCE_DELAY, DEFAULT_REPLY_DELAY,
        DEFAULT_REPLY_JITTER, DEFAULT_RESUME_DELAY, DEFAULT_SYNC_REQUEST_SCHEDULE,
        DEFAULT_TRANSPORT_CAPACITY, DEFAULT_TYPING_IDLE_TIMEOUT, Result,
    },
};

/// Protocol timings and channel naming for one peer session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub channel_name: String,
    pub fallback_channel_name: String,
    pub transport_capacity: usize,
    pub reply_delay: Duration,
    pub reply_jitter: Duration,
    pub reannounce_delay: Duration,
    pub resume_delay: Duration,
    /// Offsets (from `start`) at which a `sync-request` is published.
    pub sync_request_schedule: Vec<Duration>,
    pub expiry_sweep_interval: Duration,
    /// Quiet period after which the local peer publishes "stopped typing".
    pub typing_idle_timeout: Duration,
    /// When set, receivers drop typing peers not refreshed within this window.
    pub typing_receiver_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_name: String::from(DEFAULT_CHANNEL_NAME),
            fallback_channel_name: String::from(DEFAULT_FALLBACK_CHANNEL_NAME),
            transport_capacity: DEFAULT_TRANSPORT_CAPACITY,
            reply_delay: DEFAULT_REPLY_DELAY,
            reply_jitter: DEFAULT_REPLY_JITTER,
            reannounce_delay: DEFAULT_REANNOUNCE_DELAY,
            resume_delay: DEFAULT_RESUME_DELAY,
            sync_request_schedule: DEFAULT_SYNC_REQUEST_SCHEDULE.to_vec(),
            expiry_sweep_interval: DEFAULT_EXPIRY_SWEEP_INTERVAL,
            typing_idle_timeout: DEFAULT_TYPING_IDLE_TIMEOUT,
            typing_receiver_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `COLLAB_*` variables from the environment or a `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("COLLAB_CHANNEL_NAME") {
            config.channel_name = name;
        }
        if let Some(name) = lookup("COLLAB_FALLBACK_CHANNEL_NAME") {
            config.fallback_channel_name = name;
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "COLLAB_TRANSPORT_CAPACITY")? {
            config.transport_capacity = capacity;
        }
        if let Some(delay) = parse_millis(&lookup, "COLLAB_REPLY_DELAY_MS")? {
            config.reply_delay = delay;
        }
        if let Some(jitter) = parse_millis(&lookup, "COLLAB_REPLY_JITTER_MS")? {
            config.reply_jitter = jitter;
        }
        if let Some(delay) = parse_millis(&lookup, "COLLAB_REANNOUNCE_DELAY_MS")? {
            config.reannounce_delay = delay;
        }
        if let Some(delay) = parse_millis(&lookup, "COLLAB_RESUME_DELAY_MS")? {
            config.resume_delay = delay;
        }
        if let Some(raw) = lookup("COLLAB_SYNC_REQUEST_SCHEDULE_MS") {
            config.sync_request_schedule = raw
                .split(',')
                .map(|offset| {
                    offset
                        .trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| invalid("COLLAB_SYNC_REQUEST_SCHEDULE_MS", &raw))
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(interval) = parse_millis(&lookup, "COLLAB_EXPIRY_SWEEP_MS")? {
            config.expiry_sweep_interval = interval;
        }
        if let Some(timeout) = parse_millis(&lookup, "COLLAB_TYPING_IDLE_MS")? {
            config.typing_idle_timeout = timeout;
        }
        if let Some(timeout) = parse_millis(&lookup, "COLLAB_TYPING_RECEIVER_TIMEOUT_MS")? {
            config.typing_receiver_timeout = (!timeout.is_zero()).then_some(timeout);
        }

        if config.expiry_sweep_interval.is_zero() {
            return Err(invalid("COLLAB_EXPIRY_SWEEP_MS", "0"));
        }
        if config.transport_capacity == 0 {
            return Err(invalid("COLLAB_TRANSPORT_CAPACITY", "0"));
        }

        Ok(config)
    }

    pub(crate) fn delay_for(&self, delay: AnnounceDelay) -> Duration {
        match delay {
            AnnounceDelay::Reply => {
                let jitter_ms = self.reply_jitter.as_millis() as u64;
                let jitter = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=jitter_ms)
                };
                self.reply_delay + Duration::from_millis(jitter)
            }
            AnnounceDelay::Reannounce => self.reannounce_delay,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, &raw)),
        None => Ok(None),
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse_var::<u64>(lookup, key)?.map(Duration::from_millis))
}

fn invalid(key: &str, value: &str) -> SessionError {
    SessionError::InvalidConfig {
        key: String::from(key),
        value: String::from(value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (String::from(*k), String::from(*v)))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_follow_protocol_constants() {
        let config = SessionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.sync_request_schedule.len(), 4);
        assert_eq!(config.typing_receiver_timeout, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("COLLAB_CHANNEL_NAME", "room-7"),
            ("COLLAB_SYNC_REQUEST_SCHEDULE_MS", "0, 20,40"),
            ("COLLAB_EXPIRY_SWEEP_MS", "250"),
            ("COLLAB_TYPING_RECEIVER_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.channel_name, "room-7");
        assert_eq!(
            config.sync_request_schedule,
            vec![
                Duration::ZERO,
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
        assert_eq!(config.expiry_sweep_interval, Duration::from_millis(250));
        assert_eq!(
            config.typing_receiver_timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = SessionConfig::from_lookup(lookup_from(&[("COLLAB_REPLY_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(error, SessionError::InvalidConfig { ref key, .. } if key == "COLLAB_REPLY_DELAY_MS"));

        assert!(SessionConfig::from_lookup(lookup_from(&[("COLLAB_EXPIRY_SWEEP_MS", "0")])).is_err());
    }

    #[test]
    fn reply_delay_stays_within_jitter_window() {
        let config = SessionConfig::default();
        for _ in 0..50 {
            let delay = config.delay_for(AnnounceDelay::Reply);
            assert!(delay >= config.reply_delay);
            assert!(delay <= config.reply_delay + config.reply_jitter);
        }
        assert_eq!(
            config.delay_for(AnnounceDelay::Reannounce),
            config.reannounce_delay
        );
    }
}
