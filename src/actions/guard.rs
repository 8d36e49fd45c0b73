//! Capability checks and replay-protection tokens for destructive actions.
//!
//! # Tokens
//!
//! A token is an HMAC-SHA256 over `action | scope | tick`, where a tick is a
//! twelve-hour window. A token verifies during the tick it was minted in and
//! the following one, so its lifetime is between 12 and 24 hours. Tokens are
//! scoped: a token minted for one group does not authorize another.
//!
//! ```
//! use mediadupe::actions::guard::{Action, TokenSigner};
//!
//! let signer = TokenSigner::new(b"library secret");
//! let token = signer.mint(Action::DeleteOrphans, "abc123");
//! assert!(signer.verify(Action::DeleteOrphans, "abc123", &token));
//! assert!(!signer.verify(Action::DeleteOrphans, "def456", &token));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::digest::generic_array::GenericArray;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{OptionStore, StoreResult};

/// Length of one token tick.
pub const TOKEN_TICK_SECS: i64 = 12 * 60 * 60;

/// Option key holding a generated token secret.
pub const SECRET_OPTION: &str = "mediadupe_token_secret";

const BLOCK_SIZE: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// A permission an operator may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Start, stop and clear scans.
    ManageScans,
    /// Delete media items.
    DeleteItems,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManageScans => f.write_str("manage_scans"),
            Self::DeleteItems => f.write_str("delete_items"),
        }
    }
}

/// The set of capabilities a caller holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    /// No capabilities.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Every capability.
    #[must_use]
    pub fn all() -> Self {
        Self::none()
            .with(Capability::ManageScans)
            .with(Capability::DeleteItems)
    }

    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A guarded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DeleteOrphans,
}

impl Action {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeleteOrphans => "delete_orphan_duplicates",
        }
    }
}

/// Opaque replay-protection token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionToken(String);

impl ActionToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActionToken {
    fn from(s: String) -> Self {
        Self(s.trim().to_ascii_lowercase())
    }
}

impl From<&str> for ActionToken {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints and verifies [`ActionToken`]s with a secret key.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").field("key", &"<redacted>").finish()
    }
}

impl TokenSigner {
    /// Create a signer from a secret of any length.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        // One SHA-256 block, padded the way HMAC pads short keys.
        let secret = secret.as_ref();
        let mut key = [0u8; BLOCK_SIZE];
        if secret.len() > BLOCK_SIZE {
            key[..32].copy_from_slice(&Sha256::digest(secret));
        } else {
            key[..secret.len()].copy_from_slice(secret);
        }
        Self {
            mac: <HmacSha256 as Mac>::new(GenericArray::from_slice(&key)),
        }
    }

    /// Use the secret stored in `options`, generating one on first use.
    ///
    /// `seed` only contributes entropy to a newly generated secret.
    pub fn load_or_create(options: &dyn OptionStore, seed: &Path) -> StoreResult<Self> {
        if let Some(secret) = options.get_option(SECRET_OPTION)? {
            return Ok(Self::new(secret));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(seed.to_string_lossy().as_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        let secret = hasher.finalize().to_hex().to_string();

        options.set_option(SECRET_OPTION, &secret)?;
        log::debug!("Generated a new token secret");
        Ok(Self::new(secret))
    }

    /// Mint a token for `action` on `scope`, valid now.
    #[must_use]
    pub fn mint(&self, action: Action, scope: &str) -> ActionToken {
        self.mint_at(action, scope, Utc::now())
    }

    /// Mint a token as of `now`.
    #[must_use]
    pub fn mint_at(&self, action: Action, scope: &str, now: DateTime<Utc>) -> ActionToken {
        ActionToken(self.sign(action, scope, tick(now)))
    }

    /// Check a token for `action` on `scope`.
    #[must_use]
    pub fn verify(&self, action: Action, scope: &str, token: &ActionToken) -> bool {
        self.verify_at(action, scope, token, Utc::now())
    }

    /// Check a token as of `now`.
    #[must_use]
    pub fn verify_at(
        &self,
        action: Action,
        scope: &str,
        token: &ActionToken,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(tag) = decode_hex(token.as_str()) else {
            return false;
        };
        let current = tick(now);
        [current, current - 1]
            .into_iter()
            .any(|t| self.mac(action, scope, t).verify_slice(&tag).is_ok())
    }

    fn sign(&self, action: Action, scope: &str, tick: i64) -> String {
        format!("{:x}", self.mac(action, scope, tick).finalize().into_bytes())
    }

    fn mac(&self, action: Action, scope: &str, tick: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{}|{}|{}", action.name(), scope, tick).as_bytes());
        mac
    }
}

fn tick(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(TOKEN_TICK_SECS)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mut mac = TokenSigner::new(b"Jefe").mac.clone();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            format!("{:x}", mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_long_secret_is_hashed() {
        // RFC 4231 test case 6
        let mut mac = TokenSigner::new([0xaa; 131]).mac.clone();
        mac.update(b"Test Using Larger Than Block-Size Key - Hash Key First");
        assert_eq!(
            format!("{:x}", mac.finalize().into_bytes()),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let signer = TokenSigner::new("secret");
        let zeros = "0".repeat(64);
        for raw in ["", "abc", "zz", "é1", zeros.as_str()] {
            assert!(!signer.verify(Action::DeleteOrphans, "g", &ActionToken::from(raw)));
        }
    }

    #[test]
    fn test_token_is_scoped() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint(Action::DeleteOrphans, "group-a");
        assert!(signer.verify(Action::DeleteOrphans, "group-a", &token));
        assert!(!signer.verify(Action::DeleteOrphans, "group-b", &token));
        assert!(!TokenSigner::new("other").verify(Action::DeleteOrphans, "group-a", &token));
    }

    #[test]
    fn test_token_lifetime() {
        let signer = TokenSigner::new("secret");
        let minted = DateTime::from_timestamp(TOKEN_TICK_SECS * 1000, 0).unwrap();
        let token = signer.mint_at(Action::DeleteOrphans, "g", minted);

        let next_tick = minted + Duration::hours(13);
        let expired = minted + Duration::hours(25);
        assert!(signer.verify_at(Action::DeleteOrphans, "g", &token, next_tick));
        assert!(!signer.verify_at(Action::DeleteOrphans, "g", &token, expired));
        assert!(!signer.verify_at(Action::DeleteOrphans, "g", &token, minted - Duration::hours(1)));
    }

    #[test]
    fn test_token_parsing_normalizes() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint(Action::DeleteOrphans, "g");
        let typed = ActionToken::from(format!("  {}\n", token.as_str().to_uppercase()));
        assert!(signer.verify(Action::DeleteOrphans, "g", &typed));
        assert!(!signer.verify(Action::DeleteOrphans, "g", &ActionToken::from("abc")));
    }

    #[test]
    fn test_secret_is_generated_once() {
        let store = MemoryStore::new();
        let first = TokenSigner::load_or_create(&store, Path::new("/lib.db")).unwrap();
        let second = TokenSigner::load_or_create(&store, Path::new("/lib.db")).unwrap();

        let token = first.mint(Action::DeleteOrphans, "g");
        assert!(second.verify(Action::DeleteOrphans, "g", &token));
        assert!(store.get_option(SECRET_OPTION).unwrap().is_some());
    }

    #[test]
    fn test_capabilities() {
        assert!(!Capabilities::none().allows(Capability::DeleteItems));
        assert!(Capabilities::all().allows(Capability::DeleteItems));
        let scans_only = Capabilities::none().with(Capability::ManageScans);
        assert!(!scans_only.allows(Capability::DeleteItems));
    }
}
