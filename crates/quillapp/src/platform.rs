use serde::{Deserialize, Serialize};
use std::fmt;

/// The device family the library is running on.
///
/// Mobile targets are permissive about path characters (storage providers
/// hand out URIs with colons in them); the desktop target gets the strict
/// reserved-name check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Desktop
        }
    }

    /// Only Android lets the user pick an external storage directory.
    pub fn supports_custom_storage(&self) -> bool {
        matches!(self, Platform::Android)
    }

    pub fn is_mobile(&self) -> bool {
        !matches!(self, Platform::Desktop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Desktop => "desktop",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
