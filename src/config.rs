//! Configuration for Hydrogen

use crate::error::{HydrogenError, Result};
use std::time::Duration;

/// Describes how a single pool template grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDesc {
    /// Instances built eagerly at registration and parked idle
    pub prewarm: usize,
    /// Upper bound on instances for the template (None = grow without bound)
    pub max_instances: Option<usize>,
}

impl Default for PoolDesc {
    fn default() -> Self {
        Self {
            prewarm: 0,
            max_instances: None,
        }
    }
}

impl PoolDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prewarm(mut self, count: usize) -> Self {
        self.prewarm = count;
        self
    }

    pub fn max_instances(mut self, max: usize) -> Self {
        self.max_instances = Some(max);
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.max_instances {
            Some(0) => Err(HydrogenError::Configuration(
                "max_instances must be greater than zero".into(),
            )),
            Some(max) if self.prewarm > max => Err(HydrogenError::Configuration(format!(
                "prewarm ({}) exceeds max_instances ({})",
                self.prewarm, max
            ))),
            _ => Ok(()),
        }
    }
}

/// Response body cap used by [`WebPoolDesc::default`] (64 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration descriptor for a [`WebPool`](crate::web::WebPool)
#[derive(Debug, Clone)]
pub struct WebPoolDesc {
    /// Keep the process-wide dispatcher alive across [`reset_session`](crate::singleton::reset_session)
    pub persistent: bool,
    /// Workers built up front
    pub prewarm_workers: usize,
    /// Maximum concurrent requests (None = unbounded)
    pub max_workers: Option<usize>,
    /// Per-request timeout applied by the default HTTP transport
    pub request_timeout: Option<Duration>,
    /// Value of the `User-Agent` header, if any
    pub user_agent: Option<String>,
    /// Largest response body the default HTTP transport will read
    pub max_response_bytes: u64,
}

impl Default for WebPoolDesc {
    fn default() -> Self {
        Self {
            persistent: true,
            prewarm_workers: 1,
            max_workers: None,
            request_timeout: Some(Duration::from_secs(30)),
            user_agent: Some(concat!("hydrogen/", env!("CARGO_PKG_VERSION")).to_string()),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl WebPoolDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn prewarm_workers(mut self, count: usize) -> Self {
        self.prewarm_workers = count;
        self
    }

    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = Some(max);
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }

    /// The pool descriptor used for the worker template.
    pub fn pool_desc(&self) -> PoolDesc {
        PoolDesc {
            prewarm: self.prewarm_workers,
            max_instances: self.max_workers,
        }
    }
}

/// Configuration descriptor for an [`AudioStack`](crate::audio::AudioStack)
#[derive(Debug, Clone, Default)]
pub struct AudioStackDesc {
    /// Maximum number of items held at once (None = unbounded)
    pub max_items: Option<usize>,
}

impl AudioStackDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_desc_rejects_prewarm_above_cap() {
        let desc = PoolDesc::new().prewarm(4).max_instances(2);
        assert!(matches!(
            desc.validate(),
            Err(HydrogenError::Configuration(_))
        ));
        assert!(PoolDesc::new().max_instances(0).validate().is_err());
        assert!(PoolDesc::new().prewarm(2).max_instances(2).validate().is_ok());
    }

    #[test]
    fn web_pool_desc_maps_to_pool_desc() {
        let desc = WebPoolDesc::new().prewarm_workers(3).max_workers(8);
        assert_eq!(desc.pool_desc(), PoolDesc::new().prewarm(3).max_instances(8));
        assert!(WebPoolDesc::default().persistent);
        assert_eq!(
            WebPoolDesc::default().max_response_bytes,
            DEFAULT_MAX_RESPONSE_BYTES
        );
        assert_eq!(WebPoolDesc::new().max_response_bytes(1024).max_response_bytes, 1024);
    }
}
