//! Transport and at-rest security.
//!
//! Two responsibilities, both fail-closed:
//!
//! - **Startup validation**: in a production deployment the persistent tier
//!   must use transport encryption (`rediss://`) and, when at-rest
//!   encryption is enabled, key material must be present. Development and
//!   testing contexts log a warning instead. An explicit
//!   `insecure_override` flag downgrades production failures to loud
//!   warnings; it exists for trusted private networks and is never silent.
//! - **At-rest encryption**: AES-256-GCM with a random 96-bit nonce
//!   prepended to the ciphertext. Decryption of corrupted ciphertext or a
//!   wrong key fails with [`Error::Decryption`], never returns garbage.
//!
//! Key material is never logged; errors reference presence or absence only.

use crate::{Error, ErrorContext, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Nonce size for AES-256-GCM.
const NONCE_SIZE: usize = 12;

/// AES-256 key size in bytes.
const KEY_SIZE: usize = 32;

/// Deployment context driving the validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentContext {
    Production,
    Development,
    Testing,
}

impl DeploymentContext {
    fn is_production(self) -> bool {
        matches!(self, DeploymentContext::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentContext::Production => "production",
            DeploymentContext::Development => "development",
            DeploymentContext::Testing => "testing",
        }
    }
}

/// Security settings consumed at engine construction.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub encrypt_at_rest: bool,
    /// Raw 32-byte AES-256 key. See [`SecurityConfig::with_key_base64`].
    pub encryption_key: Option<Vec<u8>>,
    pub require_transport_encryption: bool,
    /// Deliberate escape hatch: downgrades production validation failures
    /// to warnings. Always logged loudly.
    pub insecure_override: bool,
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encrypt_at_rest(mut self, enabled: bool) -> Self {
        self.encrypt_at_rest = enabled;
        self
    }

    pub fn with_encryption_key(mut self, key: Vec<u8>) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Accepts a base64-encoded 32-byte key, the usual shape of key
    /// material handed over from a secret store.
    pub fn with_key_base64(mut self, encoded: &str) -> Result<Self> {
        let key = BASE64.decode(encoded).map_err(|_| {
            Error::configuration_with_context(
                "encryption key is not valid base64",
                ErrorContext::new()
                    .with_field_path("security.encryption_key")
                    .with_source("security_layer"),
            )
        })?;
        self.encryption_key = Some(key);
        Ok(self)
    }

    pub fn with_require_transport_encryption(mut self, required: bool) -> Self {
        self.require_transport_encryption = required;
        self
    }

    pub fn with_insecure_override(mut self, enabled: bool) -> Self {
        self.insecure_override = enabled;
        self
    }
}

/// Validate the security posture for the given deployment context.
///
/// `backend_url` is the persistent-tier connection string, `None` when the
/// cache runs memory-only (transport checks are skipped in that case).
pub fn validate(
    config: &SecurityConfig,
    context: DeploymentContext,
    backend_url: Option<&str>,
) -> Result<()> {
    let mut findings: Vec<String> = Vec::new();

    if config.require_transport_encryption {
        if let Some(url) = backend_url {
            if !url.starts_with("rediss://") {
                findings.push(format!(
                    "transport encryption required but backend URL scheme is not rediss ({})",
                    scheme_of(url)
                ));
            }
        }
    } else if context.is_production() && backend_url.is_some() {
        findings.push("backend connection does not require transport encryption".to_string());
    }

    if config.encrypt_at_rest {
        match config.encryption_key {
            Some(ref key) if key.len() == KEY_SIZE => {}
            Some(ref key) => findings.push(format!(
                "encryption key has wrong length (expected {} bytes, got {})",
                KEY_SIZE,
                key.len()
            )),
            None => findings.push("at-rest encryption enabled but no key configured".to_string()),
        }
    } else if context.is_production() {
        findings.push("at-rest encryption disabled".to_string());
    }

    if findings.is_empty() {
        return Ok(());
    }

    let summary = findings.join("; ");
    if context.is_production() && !config.insecure_override {
        return Err(Error::configuration_with_context(
            format!("insecure cache configuration in production: {}", summary),
            ErrorContext::new()
                .with_field_path("security")
                .with_source("security_layer"),
        ));
    }

    if config.insecure_override && context.is_production() {
        tracing::warn!(
            context = context.as_str(),
            findings = %summary,
            "SECURITY OVERRIDE ACTIVE: running production cache with insecure settings"
        );
    } else {
        tracing::warn!(
            context = context.as_str(),
            findings = %summary,
            "cache security settings incomplete (allowed outside production)"
        );
    }
    Ok(())
}

fn scheme_of(url: &str) -> &str {
    url.split("://").next().unwrap_or("unknown")
}

/// Authenticated at-rest encryption.
pub struct SecurityLayer {
    cipher: Aes256Gcm,
}

impl SecurityLayer {
    /// Build from configured key material. Fails when the key is absent or
    /// not exactly 32 bytes.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let key = config.encryption_key.as_deref().ok_or_else(|| {
            Error::configuration_with_context(
                "at-rest encryption requires key material",
                ErrorContext::new()
                    .with_field_path("security.encryption_key")
                    .with_details("key absent")
                    .with_source("security_layer"),
            )
        })?;
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            Error::configuration_with_context(
                "encryption key must be exactly 32 bytes",
                ErrorContext::new()
                    .with_field_path("security.encryption_key")
                    .with_source("security_layer"),
            )
        })?;
        Ok(Self { cipher })
    }

    /// Encrypt with a fresh random nonce; output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::decryption("encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt `nonce || ciphertext`. Fails closed on truncation, corruption
    /// or key mismatch.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(Error::decryption("ciphertext shorter than nonce"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::decryption("authentication failed (corrupt data or wrong key)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        (0..32u8).collect()
    }

    fn layer() -> SecurityLayer {
        SecurityLayer::from_config(
            &SecurityConfig::new()
                .with_encrypt_at_rest(true)
                .with_encryption_key(test_key()),
        )
        .unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let layer = layer();
        for input in [&b""[..], &b"short"[..], &[7u8; 4096][..]] {
            let ciphertext = layer.encrypt(input).unwrap();
            assert_ne!(&ciphertext[NONCE_SIZE..], input);
            assert_eq!(layer.decrypt(&ciphertext).unwrap(), input);
        }
    }

    #[test]
    fn corrupted_ciphertext_fails_closed() {
        let layer = layer();
        let mut ciphertext = layer.encrypt(b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(matches!(
            layer.decrypt(&ciphertext).unwrap_err(),
            Error::Decryption { .. }
        ));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let layer = layer();
        let ciphertext = layer.encrypt(b"payload").unwrap();
        let other = SecurityLayer::from_config(
            &SecurityConfig::new().with_encryption_key(vec![9u8; 32]),
        )
        .unwrap();
        assert!(other.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn truncated_ciphertext_fails_closed() {
        let layer = layer();
        assert!(layer.decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn production_without_transport_encryption_is_fatal() {
        let config = SecurityConfig::new()
            .with_require_transport_encryption(true)
            .with_encrypt_at_rest(true)
            .with_encryption_key(test_key());
        let err = validate(
            &config,
            DeploymentContext::Production,
            Some("redis://cache.internal:6379"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn production_missing_key_is_fatal() {
        let config = SecurityConfig::new()
            .with_encrypt_at_rest(true)
            .with_require_transport_encryption(true);
        let err = validate(
            &config,
            DeploymentContext::Production,
            Some("rediss://cache.internal:6379"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn development_downgrades_to_warning() {
        let config = SecurityConfig::new();
        assert!(validate(
            &config,
            DeploymentContext::Development,
            Some("redis://localhost:6379")
        )
        .is_ok());
    }

    #[test]
    fn insecure_override_permits_production_start() {
        let config = SecurityConfig::new().with_insecure_override(true);
        assert!(validate(
            &config,
            DeploymentContext::Production,
            Some("redis://10.0.0.5:6379")
        )
        .is_ok());
    }

    #[test]
    fn secure_production_config_passes() {
        let config = SecurityConfig::new()
            .with_encrypt_at_rest(true)
            .with_encryption_key(test_key())
            .with_require_transport_encryption(true);
        assert!(validate(
            &config,
            DeploymentContext::Production,
            Some("rediss://cache.internal:6380")
        )
        .is_ok());
    }

    #[test]
    fn base64_key_decoding() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(test_key());
        let config = SecurityConfig::new().with_key_base64(&encoded).unwrap();
        assert_eq!(config.encryption_key.unwrap().len(), 32);
        assert!(SecurityConfig::new().with_key_base64("!!!").is_err());
    }
}
