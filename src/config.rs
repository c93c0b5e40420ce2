//! Configuration for geocache sessions.
//!
//! Capacities and statistics recording are external inputs; everything else
//! about cache and index behaviour is fixed by the implementation.
use serde::de::Error;

/// Name of the index used when callers do not supply one.
pub const DEFAULT_INDEX: &str = "default";

/// Largest cache capacity a session accepts; snapshots store capacities as `u32`.
pub const MAX_CACHE_CAPACITY: usize = u32::MAX as usize;

/// Session configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of parsed geometries kept in memory
    #[serde(default = "Config::default_geometry_cache_capacity")]
    pub geometry_cache_capacity: usize,

    /// Maximum number of cached envelopes; `None` keeps every envelope
    #[serde(default)]
    pub envelope_cache_capacity: Option<usize>,

    /// Record hit/miss counters on both caches
    #[serde(default)]
    pub record_stats: bool,

    /// Index name used when none is given
    #[serde(default = "Config::default_index_name")]
    pub default_index: String,

    /// Compute and cache the envelope whenever a geometry is parsed
    #[serde(default = "Config::default_index_envelopes")]
    pub index_envelopes: bool,
}

impl Config {
    const fn default_geometry_cache_capacity() -> usize {
        100_000
    }

    fn default_index_name() -> String {
        DEFAULT_INDEX.to_string()
    }

    const fn default_index_envelopes() -> bool {
        true
    }

    pub fn with_geometry_cache_capacity(mut self, capacity: usize) -> Self {
        if capacity > 10_000_000 {
            log::warn!(
                "Geometry cache capacity of {} is very large and may consume significant memory.",
                capacity
            );
        }
        self.geometry_cache_capacity = capacity;
        self
    }

    pub fn with_envelope_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.envelope_cache_capacity = capacity;
        self
    }

    pub fn with_record_stats(mut self, record: bool) -> Self {
        self.record_stats = record;
        self
    }

    pub fn with_default_index(mut self, name: impl Into<String>) -> Self {
        self.default_index = name.into();
        self
    }

    pub fn with_index_envelopes(mut self, enabled: bool) -> Self {
        self.index_envelopes = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.geometry_cache_capacity == 0 {
            return Err("Geometry cache capacity must be greater than zero".to_string());
        }

        if self.geometry_cache_capacity > MAX_CACHE_CAPACITY {
            return Err(format!(
                "Geometry cache capacity cannot exceed {}",
                MAX_CACHE_CAPACITY
            ));
        }

        match self.envelope_cache_capacity {
            Some(0) => {
                return Err("Envelope cache capacity must be greater than zero".to_string());
            }
            Some(capacity) if capacity > MAX_CACHE_CAPACITY => {
                return Err(format!(
                    "Envelope cache capacity cannot exceed {}",
                    MAX_CACHE_CAPACITY
                ));
            }
            _ => {}
        }

        if self.default_index.is_empty() {
            return Err("Default index name cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geometry_cache_capacity: Self::default_geometry_cache_capacity(),
            envelope_cache_capacity: None,
            record_stats: false,
            default_index: Self::default_index_name(),
            index_envelopes: Self::default_index_envelopes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.geometry_cache_capacity, 100_000);
        assert!(config.envelope_cache_capacity.is_none());
        assert!(!config.record_stats);
        assert_eq!(config.default_index, DEFAULT_INDEX);
        assert!(config.index_envelopes);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_geometry_cache_capacity(64)
            .with_envelope_cache_capacity(Some(512))
            .with_record_stats(true);

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = Config::from_json(r#"{ "record_stats": true }"#).unwrap();
        assert!(config.record_stats);
        assert_eq!(config.geometry_cache_capacity, 100_000);
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        assert!(Config::from_json(r#"{ "geometry_cache_capacity": 0 }"#).is_err());
        assert!(Config::from_json(r#"{ "envelope_cache_capacity": 0 }"#).is_err());
        assert!(
            Config::default()
                .with_geometry_cache_capacity(0)
                .validate()
                .is_err()
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_config_rejects_capacity_beyond_u32() {
        let too_large = MAX_CACHE_CAPACITY + 1;
        assert!(
            Config::default()
                .with_geometry_cache_capacity(MAX_CACHE_CAPACITY)
                .validate()
                .is_ok()
        );
        assert!(
            Config::default()
                .with_geometry_cache_capacity(too_large)
                .validate()
                .is_err()
        );
        assert!(
            Config::default()
                .with_envelope_cache_capacity(Some(too_large))
                .validate()
                .is_err()
        );
        let json = format!(r#"{{ "envelope_cache_capacity": {} }}"#, too_large);
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(Config::from_json(r#"{ "cache_size": 10 }"#).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = Config::from_toml("geometry_cache_capacity = 10\nrecord_stats = true\n").unwrap();
        assert_eq!(config.geometry_cache_capacity, 10);
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
