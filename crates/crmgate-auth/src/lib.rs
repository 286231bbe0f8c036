//! Bearer token verification for crmgate.
//!
//! [`TokenVerifier`] is the seam the request pipeline authenticates through.
//! [`JwtVerifier`] implements it over a pluggable [`KeyResolver`]:
//!
//! - [`StaticSecret`]: one pre-shared HS256 secret
//! - [`JwksKeySet`]: a public key set fetched from an issuer and refreshed in
//!   the background, resolved by the token's `kid`
//!
//! The crate also issues tokens for the login route ([`TokenSigner`]) and
//! verifies stored argon2 password hashes ([`password`]).

mod claims;
mod config;
mod error;
pub mod keys;
pub mod password;
mod setup;
mod signer;
mod verifier;

pub use claims::Claims;
pub use config::{AuthConfig, JwksSettings, KeyStrategy};
pub use error::AuthError;
pub use keys::jwks::{JwksError, JwksKeySet, JwksKeySetConfig};
pub use keys::static_secret::StaticSecret;
pub use keys::{KeyResolver, ResolvedKey};
pub use setup::{AuthSetup, setup};
pub use signer::TokenSigner;
pub use verifier::{JwtVerifier, TokenVerifier};
