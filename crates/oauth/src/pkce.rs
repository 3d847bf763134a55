//! Proof-key and nonce material for the authorization-code flow.

use {
    base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::{TryRngCore, rngs::OsRng},
    sha2::{Digest, Sha256},
};

use crate::{error::AuthError, types::PkceSession};

/// Verifier entropy: 32 bytes (256 bits) before encoding.
pub const VERIFIER_ENTROPY_BYTES: usize = 32;
/// State nonce entropy: 16 bytes (128 bits) before encoding.
pub const STATE_ENTROPY_BYTES: usize = 16;

/// `n` cryptographically random bytes from the OS entropy source.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, AuthError> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::EntropySource(err.to_string()))?;
    Ok(bytes)
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Base64 with the URL-safe alphabet and no `=` padding.
pub fn base64url_nopad(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Percent-encode everything outside `[A-Za-z0-9._~-]` as uppercase `%XX`.
///
/// Query strings built with anything laxer corrupt tokens and URIs that
/// contain `+`, `/` or `=`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Fresh verifier/challenge/state material for one round-trip.
pub fn new_session() -> Result<PkceSession, AuthError> {
    let verifier = base64url_nopad(&random_bytes(VERIFIER_ENTROPY_BYTES)?);
    let challenge = base64url_nopad(&sha256(verifier.as_bytes()));
    let state = base64url_nopad(&random_bytes(STATE_ENTROPY_BYTES)?);
    Ok(PkceSession {
        verifier,
        challenge,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_matches_rfc7636_vector() {
        // Appendix B of RFC 7636.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = base64url_nopad(&sha256(verifier.as_bytes()));
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_random_bytes_length_and_distinctness() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_base64url_nopad_strips_padding() {
        // 1 byte encodes to two chars plus two '=' in padded base64.
        assert_eq!(base64url_nopad(&[0xfb]), "-w");
        assert!(!base64url_nopad(b"any input at all").contains('='));
    }

    #[test]
    fn test_percent_encode_unreserved_set() {
        assert_eq!(percent_encode("AZaz09._~-"), "AZaz09._~-");
        assert_eq!(percent_encode("a+b/c=d"), "a%2Bb%2Fc%3Dd");
        assert_eq!(percent_encode("two words"), "two%20words");
        assert_eq!(percent_encode("sp:track:123"), "sp%3Atrack%3A123");
    }

    #[test]
    fn test_new_session_shape() {
        let session = new_session().unwrap();
        // 32 and 16 bytes encode to 43 and 22 unpadded base64url chars.
        assert_eq!(session.verifier.len(), 43);
        assert_eq!(session.state.len(), 22);
        assert_eq!(
            session.challenge,
            base64url_nopad(&sha256(session.verifier.as_bytes()))
        );
        assert_ne!(session.state, session.verifier);
    }
}
