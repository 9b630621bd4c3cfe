//! Registry configuration options

use crate::errors::{PoolError, PoolResult};

/// Environment variable consulted by [`RegistryConfiguration::from_env`].
pub const LIMIT_ENV_VAR: &str = "RAPHF_PERSISTENT_HANDLE_LIMIT";

/// Configuration for a [`Registry`](crate::Registry).
///
/// The quota is read once when the registry is built. A negative limit means
/// unlimited; any non-negative value caps how many handles a single provider
/// may keep leased before released handles are destroyed instead of pooled.
///
/// # Examples
///
/// ```
/// use raphf::RegistryConfiguration;
///
/// let config = RegistryConfiguration::new().with_limit(8);
/// assert_eq!(config.limit(), Some(8));
///
/// let config = RegistryConfiguration::new();
/// assert_eq!(config.limit(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfiguration {
    /// Per-provider quota on leased handles; negative means unlimited
    pub persistent_handle_limit: i64,
}

impl Default for RegistryConfiguration {
    fn default() -> Self {
        Self {
            persistent_handle_limit: -1,
        }
    }
}

impl RegistryConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-provider quota
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.persistent_handle_limit = limit;
        self
    }

    /// Remove the quota
    pub fn unlimited(mut self) -> Self {
        self.persistent_handle_limit = -1;
        self
    }

    /// The effective quota, `None` when unlimited
    pub fn limit(&self) -> Option<usize> {
        usize::try_from(self.persistent_handle_limit).ok()
    }

    /// Load the configuration from the process environment.
    ///
    /// Unset means the default; a value that is not an integer is rejected.
    pub fn from_env() -> PoolResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    ///
    /// # Examples
    ///
    /// ```
    /// use raphf::RegistryConfiguration;
    ///
    /// let config = RegistryConfiguration::from_lookup(|_| Some("3".to_string())).unwrap();
    /// assert_eq!(config.limit(), Some(3));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> PoolResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(LIMIT_ENV_VAR) {
            let raw = raw.trim();
            if !raw.is_empty() {
                config.persistent_handle_limit = raw.parse().map_err(|_| {
                    PoolError::InvalidConfiguration(format!(
                        "{LIMIT_ENV_VAR} must be an integer, got {raw:?}"
                    ))
                })?;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let config = RegistryConfiguration::default();
        assert_eq!(config.persistent_handle_limit, -1);
        assert_eq!(config.limit(), None);
    }

    #[test]
    fn test_negative_limits_mean_unlimited() {
        assert_eq!(RegistryConfiguration::new().with_limit(-42).limit(), None);
        assert_eq!(RegistryConfiguration::new().with_limit(0).limit(), Some(0));
        assert_eq!(RegistryConfiguration::new().with_limit(5).unlimited().limit(), None);
    }

    #[test]
    fn test_from_lookup() {
        let config = RegistryConfiguration::from_lookup(|key| {
            assert_eq!(key, LIMIT_ENV_VAR);
            Some(" 16 ".to_string())
        })
        .unwrap();
        assert_eq!(config.limit(), Some(16));

        let config = RegistryConfiguration::from_lookup(|_| None).unwrap();
        assert_eq!(config, RegistryConfiguration::default());

        let config = RegistryConfiguration::from_lookup(|_| Some(String::new())).unwrap();
        assert_eq!(config, RegistryConfiguration::default());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = RegistryConfiguration::from_lookup(|_| Some("lots".to_string())).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_with_defaults() {
        let config: RegistryConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config.limit(), None);

        let config: RegistryConfiguration =
            serde_json::from_str(r#"{"persistent_handle_limit": 2}"#).unwrap();
        assert_eq!(config.limit(), Some(2));
    }
}
