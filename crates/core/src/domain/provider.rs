use serde::{Deserialize, Serialize};

/// The interchangeable inference backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cloud,
    Local,
    Tunnel,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
            Self::Tunnel => "tunnel",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackTarget {
    Cloud,
    #[default]
    None,
}

/// Per-request backend routing decision. Non-owners are always forced to
/// cloud with no fallback before this struct is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderSelection {
    pub primary: BackendKind,
    pub fallback: FallbackTarget,
}

impl ProviderSelection {
    pub fn cloud_only() -> Self {
        Self { primary: BackendKind::Cloud, fallback: FallbackTarget::None }
    }
}
