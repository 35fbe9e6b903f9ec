//! Provider-independent data shapes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Normalized identity returned to callers regardless of the backing provider.
///
/// Built fresh from provider-native data on every notification; never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable identifier, absent when the provider does not supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Avatar URI.
    #[serde(default)]
    pub image: Option<String>,
}

impl AuthUser {
    /// Best human-readable handle for log lines and prompts.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.id.as_deref())
            .unwrap_or("anonymous")
    }
}

/// Which adapter variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Popup-based backend.
    Firebase,
    /// Server-session backend. Used when no preference exists.
    #[default]
    NextAuth,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Firebase, ProviderKind::NextAuth];

    /// Token written to the preference store.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Firebase => "firebase",
            Self::NextAuth => "nextauth",
        }
    }

    /// Display label shown to users.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Firebase => "Firebase",
            Self::NextAuth => "NextAuth",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firebase" => Ok(Self::Firebase),
            "nextauth" | "next-auth" => Ok(Self::NextAuth),
            other => Err(format!("Unknown auth provider: {other}")),
        }
    }
}

/// The orchestrator's published state: who is active and who is signed in.
///
/// Provider and user always change together so an observer never pairs a
/// label with a user produced by another adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub provider: ProviderKind,
    pub user: Option<AuthUser>,
}

impl AuthSnapshot {
    /// Fresh state for a newly attached adapter, before its first notification.
    pub fn signed_out(provider: ProviderKind) -> Self {
        Self {
            provider,
            user: None,
        }
    }

    pub fn provider_label(&self) -> &'static str {
        self.provider.label()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}
