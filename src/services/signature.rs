use ring::hmac;

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Signature mismatch")]
    Mismatch,
}

/// HMAC-SHA256 of `payload`, hex encoded
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

/// Constant-time check of a hex encoded HMAC-SHA256 signature
pub fn verify(payload: &str, signature_hex: &str, key: &[u8]) -> Result<(), SignatureError> {
    let signature = hex::decode(signature_hex)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &signature).map_err(|_| SignatureError::Mismatch)
}

/// Compares two secrets without leaking timing; the expected value is
/// MACed under `key` and the submitted value verified against that tag
pub fn secrets_match(submitted: &str, expected: &str, key: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let expected_tag = hmac::sign(&key, expected.as_bytes());
    hmac::verify(&key, submitted.as_bytes(), expected_tag.as_ref()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_hex_sha256() {
        let sig = sign("hello", b"key");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let sig = sign("payload", b"secret");
        assert!(verify("payload", &sig, b"secret").is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let sig = sign("payload", b"secret");
        assert!(matches!(
            verify("payload!", &sig, b"secret"),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify("payload", &sig, b"other"),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify("payload", "not-hex", b"secret"),
            Err(SignatureError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("hunter2", "hunter2", b"secret"));
        assert!(!secrets_match("hunter3", "hunter2", b"secret"));
        assert!(!secrets_match("", "hunter2", b"secret"));
    }
}
