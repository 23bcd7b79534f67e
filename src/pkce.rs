use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE verifier/challenge pair plus the anti-CSRF `state` for one login attempt.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl LoginChallenge {
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = code_challenge_s256(&code_verifier);
        Self {
            state: generate_state(),
            code_verifier,
            code_challenge,
        }
    }
}

/// 48 random bytes, base64url: a 64-character verifier (RFC 7636 allows 43-128).
#[must_use]
pub fn generate_code_verifier() -> String {
    let random_bytes: [u8; 48] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn code_challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_verifier() {
        let challenge = LoginChallenge::generate();
        assert_eq!(challenge.code_verifier.len(), 64);
        assert_eq!(challenge.state.len(), 22);
        assert_eq!(
            challenge.code_challenge,
            code_challenge_s256(&challenge.code_verifier)
        );
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        assert_eq!(
            code_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn each_attempt_is_fresh() {
        let a = LoginChallenge::generate();
        let b = LoginChallenge::generate();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
        assert!(
            a.code_verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
