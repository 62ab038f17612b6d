//! Macvlan modes.

use std::fmt;
use std::str::FromStr;

use noipam_common::NoipamError;
use serde::{Deserialize, Serialize};

/// Macvlan mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacvlanMode {
    /// Bridge mode (containers can communicate).
    #[default]
    Bridge,
    /// Private mode (isolated from each other).
    Private,
    /// VEPA mode (requires external switch).
    Vepa,
    /// Passthrough mode (single container per interface).
    Passthru,
}

impl MacvlanMode {
    /// The mode name understood by `ip link ... type macvlan mode`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Private => "private",
            Self::Vepa => "vepa",
            Self::Passthru => "passthru",
        }
    }
}

impl fmt::Display for MacvlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacvlanMode {
    type Err = NoipamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bridge" => Ok(Self::Bridge),
            "private" => Ok(Self::Private),
            "vepa" => Ok(Self::Vepa),
            "passthru" => Ok(Self::Passthru),
            other => Err(NoipamError::config(format!(
                "requested macvlan mode '{other}' is not valid, 'bridge' mode is the macvlan driver default"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macvlan_mode() {
        assert_eq!(MacvlanMode::Bridge.as_str(), "bridge");
        assert_eq!(MacvlanMode::Private.as_str(), "private");
        assert_eq!(MacvlanMode::default(), MacvlanMode::Bridge);
    }

    #[test]
    fn test_parse_modes() {
        for mode in [
            MacvlanMode::Bridge,
            MacvlanMode::Private,
            MacvlanMode::Vepa,
            MacvlanMode::Passthru,
        ] {
            assert_eq!(mode.as_str().parse::<MacvlanMode>().unwrap(), mode);
        }
        let err = "l2".parse::<MacvlanMode>().unwrap_err();
        assert!(err.to_string().contains("'l2'"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&MacvlanMode::Vepa).unwrap();
        assert_eq!(json, "\"vepa\"");
    }
}
