//! Bootstrap admin credentials: generation from the OS CSPRNG and Argon2id
//! hashing.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

const USERNAME_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";
const USERNAME_SUFFIX_LEN: usize = 4;
const MAX_USERNAME_BASE_LEN: usize = 20;
pub const PASSWORD_LEN: usize = 12;
const FALLBACK_USERNAME_BASE: &str = "shop";
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("random source unavailable: {0}")]
    Random(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Freshly generated credentials. The plaintext password only lives long
/// enough to be mailed to the tenant owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCredentials {
    pub username: String,
    pub password: String,
}

impl GeneratedCredentials {
    pub fn generate(shop_name: &str) -> Result<Self, CredentialError> {
        Ok(Self {
            username: generate_username(shop_name)?,
            password: generate_password()?,
        })
    }
}

/// Lowercase ASCII alphanumerics of the shop name, or `shop` when nothing
/// survives.
pub fn sanitize_username_base(shop_name: &str) -> String {
    let base: String = shop_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_USERNAME_BASE_LEN)
        .collect();
    if base.is_empty() {
        FALLBACK_USERNAME_BASE.to_string()
    } else {
        base
    }
}

pub fn generate_username(shop_name: &str) -> Result<String, CredentialError> {
    let suffix = random_string(USERNAME_ALPHABET, USERNAME_SUFFIX_LEN)?;
    Ok(format!("{}_{suffix}", sanitize_username_base(shop_name)))
}

pub fn generate_password() -> Result<String, CredentialError> {
    random_string(PASSWORD_ALPHABET, PASSWORD_LEN)
}

pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let mut raw = [0u8; SALT_LEN];
    getrandom::fill(&mut raw).map_err(|err| CredentialError::Random(err.to_string()))?;
    let salt =
        SaltString::encode_b64(&raw).map_err(|err| CredentialError::Hash(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CredentialError::Hash(err.to_string()))
}

/// Verifies a plaintext password against a PHC-format hash. Malformed hashes
/// never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Uniform sampling from `alphabet` using rejection of biased bytes.
fn random_string(alphabet: &[u8], len: usize) -> Result<String, CredentialError> {
    let n = alphabet.len();
    let cutoff = 256 - (256 % n);
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        getrandom::fill(&mut buf).map_err(|err| CredentialError::Random(err.to_string()))?;
        for byte in buf {
            if usize::from(byte) >= cutoff {
                continue;
            }
            out.push(char::from(alphabet[usize::from(byte) % n]));
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_combines_sanitized_base_and_suffix() {
        let username = generate_username("My Wedding 2024!").unwrap();
        let (base, suffix) = username.split_once('_').unwrap();
        assert_eq!(base, "mywedding2024");
        assert_eq!(suffix.len(), 4);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn non_ascii_shop_name_falls_back_to_shop() {
        assert_eq!(sanitize_username_base("งานแต่ง"), "shop");
        assert!(generate_username("   ").unwrap().starts_with("shop_"));
    }

    #[test]
    fn long_shop_names_are_truncated() {
        let base = sanitize_username_base("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(base.len(), 20);
    }

    #[test]
    fn password_has_expected_shape() {
        let password = generate_password().unwrap();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert_ne!(password, generate_password().unwrap());
    }

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn every_hash_gets_a_fresh_salt() {
        let first = hash_password("hunter2").unwrap();
        let second = hash_password("hunter2").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("hunter2", &first));
        assert!(verify_password("hunter2", &second));
    }
}
