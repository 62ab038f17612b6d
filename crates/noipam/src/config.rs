//! Driver configuration.

use std::path::PathBuf;

use noipam_common::{NoipamError, NoipamPaths, NoipamResult};
use noipam_network::IFNAME_MAX_LEN;

/// Driver configuration options.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Paths for driver state.
    pub paths: NoipamPaths,
    /// Prefix of dummy links created for networks without a parent.
    pub dummy_prefix: String,
    /// Prefix of generated host-side interface names.
    pub veth_prefix: String,
    /// Number of random characters after `veth_prefix`.
    pub veth_suffix_len: usize,
    /// Name prefix the runtime gives the interface inside the container.
    pub container_prefix: String,
    /// Attempts at finding a free interface name.
    pub name_retries: usize,
    /// Attempts at generating a MAC not used in the network.
    pub mac_retries: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            paths: NoipamPaths::new(),
            dummy_prefix: "dm-".to_string(),
            veth_prefix: "veth".to_string(),
            veth_suffix_len: 7,
            container_prefix: "eth".to_string(),
            name_retries: 10,
            mac_retries: 10,
        }
    }
}

impl DriverConfig {
    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = NoipamPaths::with_root(root);
        self
    }

    /// Set the dummy link prefix.
    #[must_use]
    pub fn with_dummy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dummy_prefix = prefix.into();
        self
    }

    /// Set the host-side interface name shape.
    #[must_use]
    pub fn with_veth_name(mut self, prefix: impl Into<String>, suffix_len: usize) -> Self {
        self.veth_prefix = prefix.into();
        self.veth_suffix_len = suffix_len;
        self
    }

    /// Set the retry bounds for name and MAC generation.
    #[must_use]
    pub const fn with_retries(mut self, name_retries: usize, mac_retries: usize) -> Self {
        self.name_retries = name_retries;
        self.mac_retries = mac_retries;
        self
    }

    /// Check the configuration can produce valid interface names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a prefix is empty, too long or not
    /// ASCII, or a retry bound is zero.
    pub fn validate(&self) -> NoipamResult<()> {
        for prefix in [&self.dummy_prefix, &self.veth_prefix] {
            if !prefix.is_ascii() {
                return Err(NoipamError::config(format!(
                    "interface prefix '{prefix}' must be ASCII"
                )));
            }
        }
        if self.dummy_prefix.is_empty() || self.dummy_prefix.len() >= IFNAME_MAX_LEN {
            return Err(NoipamError::config(format!(
                "dummy link prefix '{}' must be 1-{} characters",
                self.dummy_prefix,
                IFNAME_MAX_LEN - 1
            )));
        }
        if self.veth_suffix_len == 0 || self.veth_prefix.len() + self.veth_suffix_len > IFNAME_MAX_LEN
        {
            return Err(NoipamError::config(format!(
                "interface names '{}' + {} characters do not fit in {IFNAME_MAX_LEN} bytes",
                self.veth_prefix, self.veth_suffix_len
            )));
        }
        if self.name_retries == 0 || self.mac_retries == 0 {
            return Err(NoipamError::config("retry bounds must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.dummy_prefix, "dm-");
        assert_eq!(config.veth_prefix, "veth");
        assert_eq!(config.veth_suffix_len, 7);
        assert_eq!(config.name_retries, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = DriverConfig::default()
            .with_root("/custom/root")
            .with_dummy_prefix("mv-")
            .with_veth_name("mvl", 8)
            .with_retries(3, 5);

        assert_eq!(config.paths.store(), PathBuf::from("/custom/root/store"));
        assert_eq!(config.dummy_prefix, "mv-");
        assert_eq!(config.veth_prefix, "mvl");
        assert_eq!(config.mac_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_overlong_names() {
        let config = DriverConfig::default().with_veth_name("averylongprefix", 7);
        assert!(config.validate().is_err());

        let config = DriverConfig::default().with_retries(0, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_ascii_prefixes() {
        let err = DriverConfig::default()
            .with_dummy_prefix("dümmy-")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("must be ASCII"));

        let config = DriverConfig::default().with_veth_name("vé", 7);
        assert!(config.validate().is_err());
    }
}
