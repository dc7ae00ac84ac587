use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("client link secret is not a usable HMAC key")]
    InvalidKey,
}

/// Signs and verifies client status links with HMAC-SHA256 over the CRM id.
#[derive(Clone)]
pub struct LinkSigner {
    mac: HmacSha256,
}

impl LinkSigner {
    pub fn new(secret: &str) -> Result<Self, SigningError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKey)?;
        Ok(LinkSigner { mac })
    }

    /// Lowercase hex signature for `sf_id`.
    pub fn sign(&self, sf_id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(sf_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a hex signature. Malformed hex never verifies.
    pub fn verify(&self, sf_id: &str, signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature.trim()) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(sf_id.as_bytes());
        mac.verify_slice(&bytes).is_ok()
    }

    /// Relative URL of the signed dashboard for `sf_id`.
    pub fn status_path(&self, sf_id: &str) -> String {
        format!("/status/{}?sig={}", encode_path_segment(sf_id), self.sign(sf_id))
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Constant-time string comparison for API keys and webhook tokens.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
