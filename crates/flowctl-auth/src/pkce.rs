//! PKCE (Proof Key for Code Exchange) parameters per RFC 7636
//!
//! The verifier stays in memory for the duration of one login and is sent
//! only to the token endpoint; the S256 challenge goes into the authorization
//! URL. The same random source also produces the anti-CSRF `state` nonce.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Random bytes behind each PKCE verifier. 64 bytes encode to 86 characters,
/// inside the 43-128 range RFC 7636 allows.
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind each `state` nonce.
const STATE_BYTES: usize = 32;

/// Generate `byte_len` bytes from the thread-local CSPRNG, encoded as
/// URL-safe base64 without padding.
pub fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier.
pub fn generate_verifier() -> String {
    random_token(VERIFIER_BYTES)
}

/// Generate the opaque `state` value echoed back by the authorization server.
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_url_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn verifier_is_url_safe_base64() {
        let verifier = generate_verifier();
        // 64 bytes → 86 base64url chars (no padding)
        assert_eq!(verifier.len(), 86);
        assert!(
            is_url_safe(&verifier),
            "verifier must be URL-safe base64 (no padding): {verifier}"
        );
    }

    #[test]
    fn random_token_length_tracks_entropy() {
        assert_eq!(random_token(32).len(), 43);
        assert_eq!(random_token(3).len(), 4);
        assert!(random_token(0).is_empty());
    }

    #[test]
    fn state_values_are_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b, "two state nonces must not collide");
    }

    #[test]
    fn challenge_is_deterministic() {
        let verifier = "test-verifier-value";
        let c1 = compute_challenge(verifier);
        let c2 = compute_challenge(verifier);
        assert_eq!(c1, c2, "same verifier must produce same challenge");
    }

    #[test]
    fn different_verifiers_give_different_challenges() {
        let a = compute_challenge(&generate_verifier());
        let b = compute_challenge(&generate_verifier());
        assert_ne!(a, b);
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
        let challenge = compute_challenge("hello");
        assert_eq!(challenge, "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ");
    }

    #[test]
    fn challenge_decodes_to_sha256_digest() {
        let challenge = compute_challenge(&generate_verifier());
        assert!(is_url_safe(&challenge));
        let decoded = URL_SAFE_NO_PAD.decode(&challenge).expect("valid base64url");
        assert_eq!(decoded.len(), 32, "SHA-256 hash must be 32 bytes");
    }
}
