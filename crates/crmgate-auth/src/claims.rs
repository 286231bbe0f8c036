use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The verified payload of a bearer token.
///
/// Only produced by a [`TokenVerifier`](crate::TokenVerifier) after the
/// signature and expiry checks have passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identity. Empty when the issuer omits it.
    #[serde(default)]
    pub sub: String,

    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issuer-specific claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
