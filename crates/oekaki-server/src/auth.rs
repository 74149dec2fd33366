use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

/// Room password stored as HMAC-SHA256 keyed by a per-room random salt.
#[derive(Clone)]
pub struct PasswordHash {
    salt: [u8; SALT_LEN],
    digest: Vec<u8>,
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill(&mut salt);
        Self::with_salt(password, salt)
    }

    fn with_salt(password: &str, salt: [u8; SALT_LEN]) -> Self {
        let digest = match HmacSha256::new_from_slice(&salt) {
            Ok(mut mac) => {
                mac.update(password.as_bytes());
                mac.finalize().into_bytes().to_vec()
            },
            // An empty digest never verifies.
            Err(_) => Vec::new(),
        };
        Self { salt, digest }
    }

    /// Constant-time comparison against the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.salt) else {
            return false;
        };
        mac.update(password.as_bytes());
        mac.verify_slice(&self.digest).is_ok()
    }
}

/// Opaque bearer token handed to a member on create/join.
pub fn new_session_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
