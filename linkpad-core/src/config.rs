use std::time::Duration;
use tracing::warn;

pub const ENV_DEFAULT_TTL_SECS: &str = "LINKPAD_DEFAULT_TTL_SECS";
pub const ENV_INLINE_CUTOFF_BYTES: &str = "LINKPAD_INLINE_CUTOFF_BYTES";
pub const ENV_MAX_PAYLOAD_BYTES: &str = "LINKPAD_MAX_PAYLOAD_BYTES";
pub const ENV_CACHE_CAPACITY: &str = "LINKPAD_CACHE_CAPACITY";
pub const ENV_CACHE_LIFETIME_SECS: &str = "LINKPAD_CACHE_LIFETIME_SECS";

/// Longest default TTL accepted (ten years)
pub const MAX_DEFAULT_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Store configuration for payload placement, limits, and caching
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Expiry applied to new records when the caller does not pick one
    pub default_ttl: Duration,

    /// Payloads at or below this size are stored inline in the metadata store
    pub inline_cutoff_bytes: usize,

    /// Largest payload accepted at all
    pub max_payload_bytes: usize,

    /// Maximum number of records held in the read cache
    pub cache_capacity: usize,

    /// Wall-clock lifetime of a cache entry, independent of access
    pub cache_lifetime: Duration,

    /// zstd level for blob payloads (1-22)
    /// Default: 3 (balanced speed/ratio)
    pub compression_level: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            inline_cutoff_bytes: 10 * 1024,
            max_payload_bytes: 2 * 1024 * 1024,
            cache_capacity: 10_000,
            cache_lifetime: Duration::from_secs(60 * 60),
            compression_level: 3,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load overrides through an arbitrary lookup.
    ///
    /// Unparsable or zero values are logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_positive(&lookup, ENV_DEFAULT_TTL_SECS, config.default_ttl.as_secs()) {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_positive(&lookup, ENV_INLINE_CUTOFF_BYTES, config.inline_cutoff_bytes) {
            config.inline_cutoff_bytes = bytes;
        }
        if let Some(bytes) = parse_positive(&lookup, ENV_MAX_PAYLOAD_BYTES, config.max_payload_bytes) {
            config.max_payload_bytes = bytes;
        }
        if let Some(items) = parse_positive(&lookup, ENV_CACHE_CAPACITY, config.cache_capacity) {
            config.cache_capacity = items;
        }
        if let Some(secs) = parse_positive(&lookup, ENV_CACHE_LIFETIME_SECS, config.cache_lifetime.as_secs()) {
            config.cache_lifetime = Duration::from_secs(secs);
        }

        config
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_inline_cutoff_bytes(mut self, bytes: usize) -> Self {
        self.inline_cutoff_bytes = bytes;
        self
    }

    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn with_cache_capacity(mut self, items: usize) -> Self {
        self.cache_capacity = items;
        self
    }

    pub fn with_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    /// Set compression level (1-22)
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level.clamp(1, 22);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        if self.cache_lifetime.is_zero() {
            return Err("cache_lifetime must be greater than 0".to_string());
        }

        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than 0".to_string());
        }

        if self.default_ttl > MAX_DEFAULT_TTL {
            return Err(format!(
                "default_ttl must not exceed {} seconds",
                MAX_DEFAULT_TTL.as_secs()
            ));
        }

        if self.max_payload_bytes == 0 {
            return Err("max_payload_bytes must be greater than 0".to_string());
        }

        if self.inline_cutoff_bytes > self.max_payload_bytes {
            return Err("inline_cutoff_bytes must not exceed max_payload_bytes".to_string());
        }

        if self.compression_level < 1 || self.compression_level > 22 {
            return Err("compression_level must be between 1 and 22".to_string());
        }

        Ok(())
    }
}

fn parse_positive<F, T>(lookup: &F, name: &str, default: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default + std::fmt::Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!("Invalid {} value '{}', using default {}", name, raw, default);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(604_800));
        assert_eq!(config.inline_cutoff_bytes, 10_240);
        assert_eq!(config.max_payload_bytes, 2_097_152);
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.cache_lifetime, Duration::from_secs(3600));
        assert_eq!(config.compression_level, 3);
    }

    #[test]
    fn test_builder_methods() {
        let config = StoreConfig::new()
            .with_inline_cutoff_bytes(16)
            .with_max_payload_bytes(64)
            .with_cache_capacity(2)
            .with_cache_lifetime(Duration::from_millis(50))
            .with_compression_level(40);

        assert_eq!(config.inline_cutoff_bytes, 16);
        assert_eq!(config.max_payload_bytes, 64);
        assert_eq!(config.cache_capacity, 2);
        assert_eq!(config.cache_lifetime, Duration::from_millis(50));
        assert_eq!(config.compression_level, 22);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DEFAULT_TTL_SECS, "86400"),
            (ENV_INLINE_CUTOFF_BYTES, "2048"),
            (ENV_CACHE_CAPACITY, "25"),
            (ENV_CACHE_LIFETIME_SECS, "60"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_ttl, Duration::from_secs(86_400));
        assert_eq!(config.inline_cutoff_bytes, 2048);
        assert_eq!(config.cache_capacity, 25);
        assert_eq!(config.cache_lifetime, Duration::from_secs(60));
        assert_eq!(config.max_payload_bytes, 2_097_152);
    }

    #[test]
    fn test_from_lookup_keeps_defaults_on_garbage() {
        let config = StoreConfig::from_lookup(|k| match k {
            ENV_CACHE_CAPACITY => Some("lots".to_string()),
            ENV_MAX_PAYLOAD_BYTES => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.max_payload_bytes, 2_097_152);
    }

    #[test]
    fn test_validate_success() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = StoreConfig::new().with_cache_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default_ttl_upper_bound() {
        assert!(StoreConfig::new().with_default_ttl(MAX_DEFAULT_TTL).validate().is_ok());
        for secs in [MAX_DEFAULT_TTL.as_secs() + 1, i64::MAX as u64, u64::MAX] {
            let config = StoreConfig::new().with_default_ttl(Duration::from_secs(secs));
            assert!(config.validate().is_err(), "{} secs accepted", secs);
        }
    }

    #[test]
    fn test_validate_cutoff_above_max() {
        let config = StoreConfig::new()
            .with_inline_cutoff_bytes(100)
            .with_max_payload_bytes(10);
        assert!(config.validate().is_err());
    }
}
