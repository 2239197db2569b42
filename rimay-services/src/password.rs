//! Password hashing, random keys, and email syntax checks.
//!
//! Hashes are stored as `pbkdf2_sha256$<iterations>$<salt>$<base64 digest>`
//! so the iteration count can be raised without invalidating old hashes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use sha2::Sha256;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 22;
const DIGEST_LEN: usize = 32;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("email regex is valid");
}

/// Hash a raw password with a fresh random salt.
pub fn hash_password(raw: &str, iterations: u32) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    encode(raw, &salt, iterations)
}

fn encode(raw: &str, salt: &str, iterations: u32) -> String {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(raw.as_bytes(), salt.as_bytes(), iterations, &mut digest);
    format!("{ALGORITHM}${iterations}${salt}${}", STANDARD.encode(digest))
}

/// Check a raw password against an encoded hash. Unusable or malformed
/// hashes never match.
pub fn verify_password(raw: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(_)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if algorithm != ALGORITHM {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    constant_time_eq(encode(raw, salt, iterations).as_bytes(), encoded.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 40 hex characters, the API token format.
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// 64 hex characters for session cookies.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let encoded = hash_password("s3cret-pass", 1_000);
        assert!(encoded.starts_with("pbkdf2_sha256$1000$"));
        assert!(verify_password("s3cret-pass", &encoded));
        assert!(!verify_password("wrong", &encoded));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("x", 1_000), hash_password("x", 1_000));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "md5$1$salt$abc"));
        assert!(!verify_password("x", "pbkdf2_sha256$zero$salt$abc"));
        assert!(!verify_password("x", "pbkdf2_sha256$0$salt$abc"));
    }

    #[test]
    fn test_token_format() {
        let key = generate_token_key();
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(generate_session_key().len(), 64);
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("ana@example.com"));
        assert!(is_valid_email("ana.perez+alertas@mail.example.ec"));
        assert!(!is_valid_email("ana@"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("ana@localhost"));
    }
}
