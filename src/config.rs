//! Runtime configuration
//!
//! The block cache can be sized per dataset through
//! [`DatasetOptions::cache_max_blocks`](crate::DatasetOptions), or for every
//! dataset opened afterwards through the `BLOCKRASTER_CACHEMAX` environment
//! variable. The environment is read each time a dataset is opened.
//!
//! ```
//! use blockraster::config::CacheConfig;
//!
//! // an explicit capacity wins over the environment
//! assert_eq!(CacheConfig::resolve(Some(16)).max_blocks, 16);
//! ```

use std::env;

/// Environment variable holding the default block cache capacity.
pub const CACHE_MAX_ENV: &str = "BLOCKRASTER_CACHEMAX";

/// Capacity used when nothing else is configured.
pub const DEFAULT_CACHE_MAX_BLOCKS: usize = 64;

/// Get the value of a configuration option from the environment
///
/// If `key` is not set (or is not valid unicode), `default` is returned.
pub fn get_config_option(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of decoded blocks resident per dataset.
    pub max_blocks: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_blocks: DEFAULT_CACHE_MAX_BLOCKS,
        }
    }
}

impl CacheConfig {
    /// `explicit`, else [`CACHE_MAX_ENV`], else [`DEFAULT_CACHE_MAX_BLOCKS`].
    pub fn resolve(explicit: Option<usize>) -> Self {
        Self::resolve_with(explicit, env::var(CACHE_MAX_ENV).ok().as_deref())
    }

    fn resolve_with(explicit: Option<usize>, env_value: Option<&str>) -> Self {
        if let Some(max_blocks) = explicit {
            return CacheConfig {
                max_blocks: max_blocks.max(1),
            };
        }
        match env_value.map(|v| v.trim().parse::<usize>()) {
            Some(Ok(max_blocks)) if max_blocks > 0 => CacheConfig { max_blocks },
            Some(_) => {
                log::warn!(
                    "ignoring invalid {CACHE_MAX_ENV}={:?}, using {DEFAULT_CACHE_MAX_BLOCKS}",
                    env_value.unwrap_or_default()
                );
                CacheConfig::default()
            }
            None => CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_wins() {
        assert_eq!(CacheConfig::resolve_with(Some(3), Some("10")).max_blocks, 3);
        assert_eq!(CacheConfig::resolve_with(Some(0), None).max_blocks, 1);
    }

    #[test]
    fn env_then_default() {
        assert_eq!(CacheConfig::resolve_with(None, Some("10")).max_blocks, 10);
        assert_eq!(CacheConfig::resolve_with(None, Some(" 7 ")).max_blocks, 7);
        assert_eq!(
            CacheConfig::resolve_with(None, Some("lots")).max_blocks,
            DEFAULT_CACHE_MAX_BLOCKS
        );
        assert_eq!(
            CacheConfig::resolve_with(None, Some("0")).max_blocks,
            DEFAULT_CACHE_MAX_BLOCKS
        );
        assert_eq!(CacheConfig::resolve_with(None, None), CacheConfig::default());
    }

    #[test]
    fn missing_option_uses_default() {
        assert_eq!(
            get_config_option("BLOCKRASTER_NON_EXISTANT_OPTION", "DEFAULT_VALUE"),
            "DEFAULT_VALUE"
        );
    }
}
