//! Container settings.
//!
//! Deserializable with `serde`; every field has a default, so a partial
//! document (or none at all) is valid.

use std::time::Duration;

use serde::Deserialize;

/// Tunables applied through [`ContainerBuilder::settings`](crate::container::ContainerBuilder::settings).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Instantiate every definition at startup, not only eager ones.
    pub eager_init: bool,
    /// Grace period given to worker pools on shutdown.
    pub shutdown_timeout_ms: u64,
    /// Worker threads of the container-owned pool.
    pub async_workers: usize,
    pub worker_thread_name: String,
}

impl ContainerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            eager_init: false,
            shutdown_timeout_ms: 5_000,
            async_workers: 4,
            worker_thread_name: "warden-async".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ContainerSettings::default();
        assert!(!settings.eager_init);
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(settings.async_workers, 4);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ContainerSettings =
            serde_json::from_str(r#"{ "eager_init": true, "async_workers": 2 }"#).unwrap();
        assert!(settings.eager_init);
        assert_eq!(settings.async_workers, 2);
        assert_eq!(settings.shutdown_timeout_ms, 5_000);
        assert_eq!(settings.worker_thread_name, "warden-async");
    }

    #[test]
    fn empty_document_is_default() {
        let settings: ContainerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ContainerSettings::default());
    }
}
