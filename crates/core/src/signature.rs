//! HMAC signatures on provider delivery-status callbacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-leadline-signature";

pub fn sign_payload(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature, with or without a `sha256=` prefix.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time equality for shared bearer tokens of any length.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    let (Ok(mut left), Ok(mut right)) = (
        HmacSha256::new_from_slice(TOKEN_COMPARISON_KEY),
        HmacSha256::new_from_slice(TOKEN_COMPARISON_KEY),
    ) else {
        return false;
    };
    left.update(expected.as_bytes());
    right.update(presented.as_bytes());
    right.verify_slice(&left.finalize().into_bytes()).is_ok()
}

const TOKEN_COMPARISON_KEY: &[u8] = b"leadline-token-comparison";

#[cfg(test)]
mod tests {
    use super::{secrets_match, sign_payload, verify_signature};

    #[test]
    fn signature_matches_published_hmac_sha256_vector() {
        let signature = sign_payload(b"Jefe", b"what do ya want for nothing?");

        assert_eq!(signature, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
        assert!(verify_signature(b"Jefe", b"what do ya want for nothing?", &signature.to_uppercase()));
        assert!(!verify_signature(b"Jefe", b"what do ya want for nothing?", &signature[..63]));
    }

    #[test]
    fn secrets_match_only_on_identical_tokens() {
        assert!(secrets_match("maint-secret", "maint-secret"));
        assert!(!secrets_match("maint-secret", "maint-secreT"));
        assert!(!secrets_match("maint-secret", "maint-secret-longer"));
        assert!(!secrets_match("maint-secret", ""));
    }

    #[test]
    fn signed_payload_verifies_with_and_without_prefix() {
        let body = br#"{"providerMessageId":"SM123","type":"DELIVERED"}"#;
        let signature = sign_payload(b"whsec", body);

        assert_eq!(signature.len(), 64);
        assert!(verify_signature(b"whsec", body, &signature));
        assert!(verify_signature(b"whsec", body, &format!("sha256={signature}")));
    }

    #[test]
    fn tampered_payload_or_wrong_secret_fails() {
        let body = br#"{"providerMessageId":"SM123","type":"DELIVERED"}"#;
        let signature = sign_payload(b"whsec", body);

        assert!(!verify_signature(b"whsec", br#"{"providerMessageId":"SM999"}"#, &signature));
        assert!(!verify_signature(b"other", body, &signature));
        assert!(!verify_signature(b"whsec", body, "not-hex"));
    }
}
