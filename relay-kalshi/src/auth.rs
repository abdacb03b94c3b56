//! Kalshi request signing
//!
//! Authenticated REST calls carry three headers: the API key id, a
//! millisecond timestamp, and an RSA-PSS/SHA256 signature over
//! `timestamp + METHOD + path` (query string excluded).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use relay_core::RelayError;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use tracing::{info, warn};

pub const HEADER_ACCESS_KEY: &str = "KALSHI-ACCESS-KEY";
pub const HEADER_ACCESS_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";
pub const HEADER_ACCESS_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";

/// API key id plus the RSA private key it was issued with
#[derive(Clone)]
pub struct KalshiCredentials {
    pub api_key: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for KalshiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiCredentials")
            .field("api_key", &"[REDACTED]")
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

impl KalshiCredentials {
    /// Load credentials from the environment
    ///
    /// Reads `KALSHI_API_KEY` and the private key from the file named by
    /// `KALSHI_PRIVATE_KEY_FILE` (or `KALSHI_RSA_KEY_PATH`), falling back to
    /// the inline `KALSHI_PRIVATE_KEY`.
    /// Returns `None` when either half is missing.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("KALSHI_API_KEY").ok()?;

        let key_file = std::env::var("KALSHI_PRIVATE_KEY_FILE")
            .or_else(|_| std::env::var("KALSHI_RSA_KEY_PATH"));

        let private_key_pem = if let Ok(path) = key_file {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    info!("[Kalshi] Loaded private key from file: {}", path);
                    contents
                }
                Err(e) => {
                    warn!("[Kalshi] Failed to read private key file '{}': {}", path, e);
                    return None;
                }
            }
        } else {
            std::env::var("KALSHI_PRIVATE_KEY").ok()?
        };

        Some(Self {
            api_key,
            private_key_pem,
        })
    }

    /// Build the signed header triple for one request
    pub fn sign_request(
        &self,
        method: &str,
        path: &str,
        timestamp_ms: i64,
    ) -> Result<SignedHeaders, RelayError> {
        let timestamp = timestamp_ms.to_string();
        let path = path.split('?').next().unwrap_or(path);
        let message = format!("{}{}{}", timestamp, method.to_uppercase(), path);

        let signature = sign_rsa_pss(&self.private_key_pem, &message)?;

        Ok(SignedHeaders {
            access_key: self.api_key.clone(),
            signature,
            timestamp,
        })
    }
}

/// Values for the three Kalshi authentication headers
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub access_key: String,
    pub signature: String,
    pub timestamp: String,
}

/// Sign a message using RSA-PSS with SHA256
fn sign_rsa_pss(private_key_input: &str, message: &str) -> Result<String, RelayError> {
    let private_key = parse_private_key(private_key_input)?;

    let signing_key = BlindedSigningKey::<Sha256>::new(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, message.as_bytes());

    Ok(BASE64.encode(signature.to_bytes()))
}

/// Accept PEM (PKCS#8 or PKCS#1) or bare base64 key material
fn parse_private_key(input: &str) -> Result<RsaPrivateKey, RelayError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;

    if input.contains("-----BEGIN") {
        return RsaPrivateKey::from_pkcs8_pem(input)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(input))
            .map_err(|e| RelayError::config(format!("Failed to parse PEM private key: {}", e)));
    }

    let clean_b64: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    let pkcs8_pem = format_as_pem(&clean_b64, "PRIVATE KEY");
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(&pkcs8_pem) {
        return Ok(key);
    }

    // Kalshi issues PKCS#1 keys
    let pkcs1_pem = format_as_pem(&clean_b64, "RSA PRIVATE KEY");
    RsaPrivateKey::from_pkcs1_pem(&pkcs1_pem).map_err(|e| {
        RelayError::config(format!(
            "Failed to parse private key (tried PKCS#8 and PKCS#1): {}",
            e
        ))
    })
}

/// Format base64 content as PEM with proper headers and line breaks
fn format_as_pem(b64_content: &str, key_type: &str) -> String {
    let mut pem = format!("-----BEGIN {}-----\n", key_type);
    for chunk in b64_content.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or(""));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", key_type));
    pem
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::pss::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    pub(crate) fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    }

    pub(crate) fn test_credentials(key: &RsaPrivateKey) -> KalshiCredentials {
        KalshiCredentials {
            api_key: "key-id".to_string(),
            private_key_pem: key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        }
    }

    #[test]
    fn test_signature_verifies_without_query() {
        let key = test_key();
        let creds = test_credentials(&key);

        let headers = creds
            .sign_request("get", "/trade-api/v2/portfolio/fills?limit=5", 1_700_000_000_000)
            .unwrap();
        assert_eq!(headers.access_key, "key-id");
        assert_eq!(headers.timestamp, "1700000000000");

        let raw = BASE64.decode(&headers.signature).unwrap();
        let signature = Signature::try_from(raw.as_slice()).unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(key.to_public_key());
        verifying_key
            .verify(b"1700000000000GET/trade-api/v2/portfolio/fills", &signature)
            .unwrap();
    }

    #[test]
    fn test_bare_base64_key_accepted() {
        let key = test_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let bare: String = pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();

        assert!(parse_private_key(&bare).is_ok());
    }

    #[test]
    fn test_garbage_key_is_config_error() {
        let creds = KalshiCredentials {
            api_key: "k".to_string(),
            private_key_pem: "not a key".to_string(),
        };
        let err = creds.sign_request("GET", "/x", 0).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
