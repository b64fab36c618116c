// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Signing Key Management
//!
//! This module owns the single RS256 signing key of the authorization server.
//!
//! ## Features
//!
//! * Load-or-generate of the key and its self-signed certificate under the
//!   config lock ([`KeyMaterial::init`])
//! * Publication of the public key as a JWK set, with the certificate in `x5c`
//! * Signing headers and verification of tokens issued by this server
//!
//! ## Examples
//!
//! ```rust
//! use rust_oidc_provider::auth::jwt::KeyMaterial;
//! use rust_oidc_provider::config::DistinguishedNameConfig;
//! use rust_oidc_provider::storage::MemoryConfigRepo;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let repo = MemoryConfigRepo::new();
//! let keys = rt
//!     .block_on(KeyMaterial::init(&repo, &DistinguishedNameConfig::default()))
//!     .unwrap();
//! assert_eq!(keys.jwks().keys.len(), 1);
//! ```

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
    RSAKeyParameters, RSAKeyType,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use log::{debug, error, info};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::config::DistinguishedNameConfig;
use crate::storage::ConfigRepo;
use crate::utility::certificate_utilities::{generate_signing_material, SigningMaterial};

/// Key id of the sole signing key
pub const SIGNING_KEY_ID: &str = "sig";

/// Validity of the generated certificate
const CERTIFICATE_DAYS: u32 = 3650;

/// Signing and verification material of the server
///
/// Read-only once built; share it behind an `Arc`.
pub struct KeyMaterial {
    algorithm: Algorithm,
    key_id: String,
    encoding_key: EncodingKey,
    jwks: JwkSet,
    /// base64 (standard) DER certificates, leaf first
    certificate_chain: Vec<String>,
}

/// Hides the key material from logs
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("encoding_key", &"<EncodingKey>")
            .finish()
    }
}

impl KeyMaterial {
    /// Load the persisted key material, generating it on first boot
    ///
    /// The config lock is taken by [`ConfigRepo::load`] and released on every
    /// path out of this function, including failures to load, parse,
    /// generate or persist.
    ///
    /// ### Arguments
    ///
    /// * `repo` - Store of the singleton `{private_key_pem, certificate_pem}`
    /// * `dn` - Certificate subject used when generating
    ///
    /// ### Returns
    ///
    /// * `Result<KeyMaterial>` - Any error is fatal at startup
    pub async fn init(repo: &dyn ConfigRepo, dn: &DistinguishedNameConfig) -> Result<Self> {
        let result = Self::load_or_generate(repo, dn).await;

        if let Err(e) = repo.unlock().await {
            error!("Failed to release the config lock: {}", e);
            if result.is_ok() {
                return Err(anyhow!("Failed to release the config lock: {}", e));
            }
        }

        let material = result?;
        Self::from_material(&material)
    }

    async fn load_or_generate(
        repo: &dyn ConfigRepo,
        dn: &DistinguishedNameConfig,
    ) -> Result<SigningMaterial> {
        if let Some(material) = repo
            .load()
            .await
            .context("Failed to load signing key material")?
        {
            info!("Using persisted signing key material");
            return Ok(material);
        }

        info!("No signing key material found, generating a new RSA key");
        let dn = dn.clone();
        let material =
            tokio::task::spawn_blocking(move || generate_signing_material(&dn, CERTIFICATE_DAYS))
                .await
                .context("Key generation task failed")??;

        repo.save(&material)
            .await
            .context("Failed to persist signing key material")?;
        Ok(material)
    }

    /// Build the key material from its persisted PEM form
    pub fn from_material(material: &SigningMaterial) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&material.private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&material.private_key_pem))
            .context("Failed to parse the RSA private key")?;

        // jsonwebtoken accepts PKCS#8 and PKCS#1; normalize to PKCS#8
        let pkcs8_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .context("Failed to encode the RSA private key")?;
        let encoding_key = EncodingKey::from_rsa_pem(pkcs8_pem.as_bytes())
            .context("Failed to build the signing key")?;

        let certificate_chain = vec![pem_to_base64_der(&material.certificate_pem)?];
        let jwk = create_jwk(&private_key, SIGNING_KEY_ID, &certificate_chain);

        debug!("Signing key {} ready", SIGNING_KEY_ID);
        Ok(Self {
            algorithm: Algorithm::RS256,
            key_id: SIGNING_KEY_ID.to_string(),
            encoding_key,
            jwks: JwkSet { keys: vec![jwk] },
            certificate_chain,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Public JWK set served at `/jwks.json`
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }

    /// JWT header for tokens signed with this key
    pub fn header(&self) -> Header {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.key_id.clone());
        header
    }

    /// Verify a token signed by this server
    ///
    /// The header must advertise RS256 and a kid present in the JWK set; the
    /// signature is then checked against that JWK with `validation`.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<TokenData<T>, jsonwebtoken::errors::Error> {
        use jsonwebtoken::errors::ErrorKind;

        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(ErrorKind::InvalidAlgorithm.into());
        }
        let kid = header.kid.ok_or(ErrorKind::InvalidToken)?;
        let jwk = self.jwks.find(&kid).ok_or(ErrorKind::InvalidToken)?;
        let decoding_key = DecodingKey::from_jwk(jwk)?;
        jsonwebtoken::decode::<T>(token, &decoding_key, validation)
    }
}

/// Build the public JWK of an RSA key
///
/// `n` and `e` are base64url without padding; `x5c` entries are standard
/// base64 DER as required by RFC 7517.
pub fn create_jwk(private_key: &RsaPrivateKey, key_id: &str, x5c: &[String]) -> Jwk {
    let public_key = private_key.to_public_key();
    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_id: Some(key_id.to_string()),
            key_algorithm: Some(KeyAlgorithm::RS256),
            x509_chain: if x5c.is_empty() {
                None
            } else {
                Some(x5c.to_vec())
            },
            ..Default::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n,
            e,
        }),
    }
}

/// Extract the DER body of a PEM certificate as standard base64
///
/// The DER is parsed as an X.509 certificate before being published.
fn pem_to_base64_der(pem: &str) -> Result<String> {
    let (_, pem) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| anyhow!("Invalid certificate PEM: {e}"))?;
    if pem.label != "CERTIFICATE" {
        return Err(anyhow!("Expected a CERTIFICATE PEM block, found {}", pem.label));
    }
    parse_x509_certificate(&pem.contents)
        .map_err(|e| anyhow!("Invalid X.509 certificate: {e}"))?;
    Ok(STANDARD.encode(&pem.contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryConfigRepo, StorageError};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Probe {
        iss: String,
        sub: String,
        exp: i64,
    }

    fn probe() -> Probe {
        Probe {
            iss: "https://example.com/".to_string(),
            sub: "subsub".to_string(),
            exp: chrono::Utc::now().timestamp() + 60,
        }
    }

    #[tokio::test]
    async fn test_generated_once_then_reused() {
        let repo = MemoryConfigRepo::new();
        let first = KeyMaterial::init(&repo, &DistinguishedNameConfig::default())
            .await
            .unwrap();
        assert!(!repo.is_locked().await);
        let stored = repo.stored().await.unwrap();

        let second = KeyMaterial::init(&repo, &DistinguishedNameConfig::default())
            .await
            .unwrap();
        assert_eq!(repo.stored().await.unwrap(), stored);
        assert_eq!(
            serde_json::to_value(first.jwks()).unwrap(),
            serde_json::to_value(second.jwks()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_jwk_shape() {
        let keys = KeyMaterial::init(&MemoryConfigRepo::new(), &DistinguishedNameConfig::default())
            .await
            .unwrap();
        let jwks = serde_json::to_value(keys.jwks()).unwrap();
        let jwk = &jwks["keys"][0];
        assert_eq!(jwk["kty"], "RSA");
        assert_eq!(jwk["use"], "sig");
        assert_eq!(jwk["alg"], "RS256");
        assert_eq!(jwk["kid"], SIGNING_KEY_ID);
        assert_eq!(jwk["e"], "AQAB");
        assert!(!jwk["n"].as_str().unwrap().contains('='));
        let x5c = jwk["x5c"][0].as_str().unwrap();
        assert!(STANDARD.decode(x5c).is_ok());
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let keys = KeyMaterial::init(&MemoryConfigRepo::new(), &DistinguishedNameConfig::default())
            .await
            .unwrap();
        let token = jsonwebtoken::encode(&keys.header(), &probe(), keys.encoding_key()).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&["https://example.com/"]);
        let data = keys.verify::<Probe>(&token, &validation).unwrap();
        assert_eq!(data.claims.sub, "subsub");
        assert_eq!(data.header.kid.as_deref(), Some(SIGNING_KEY_ID));

        validation.set_issuer(&["https://other.example.com/"]);
        assert!(keys.verify::<Probe>(&token, &validation).is_err());
    }

    #[tokio::test]
    async fn test_unknown_kid_is_rejected() {
        let keys = KeyMaterial::init(&MemoryConfigRepo::new(), &DistinguishedNameConfig::default())
            .await
            .unwrap();
        let mut header = keys.header();
        header.kid = Some("other".to_string());
        let token = jsonwebtoken::encode(&header, &probe(), keys.encoding_key()).unwrap();
        assert!(keys
            .verify::<Probe>(&token, &Validation::new(Algorithm::RS256))
            .is_err());
    }

    #[tokio::test]
    async fn test_foreign_key_is_rejected() {
        let ours = KeyMaterial::init(&MemoryConfigRepo::new(), &DistinguishedNameConfig::default())
            .await
            .unwrap();
        let theirs = KeyMaterial::init(&MemoryConfigRepo::new(), &DistinguishedNameConfig::default())
            .await
            .unwrap();
        let token =
            jsonwebtoken::encode(&theirs.header(), &probe(), theirs.encoding_key()).unwrap();
        assert!(ours
            .verify::<Probe>(&token, &Validation::new(Algorithm::RS256))
            .is_err());
    }

    /// Config store whose load always fails
    struct BrokenRepo {
        unlocked: AtomicBool,
    }

    #[async_trait]
    impl ConfigRepo for BrokenRepo {
        async fn load(&self) -> Result<Option<SigningMaterial>, StorageError> {
            Err(StorageError::Lock("unavailable".to_string()))
        }
        async fn save(&self, _material: &SigningMaterial) -> Result<(), StorageError> {
            Ok(())
        }
        async fn unlock(&self) -> Result<(), StorageError> {
            self.unlocked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unlock_on_failure() {
        let repo = BrokenRepo {
            unlocked: AtomicBool::new(false),
        };
        assert!(KeyMaterial::init(&repo, &DistinguishedNameConfig::default())
            .await
            .is_err());
        assert!(repo.unlocked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_corrupt_material_is_fatal() {
        let repo = MemoryConfigRepo::with_material(SigningMaterial {
            private_key_pem: "garbage".to_string(),
            certificate_pem: "garbage".to_string(),
        });
        assert!(KeyMaterial::init(&repo, &DistinguishedNameConfig::default())
            .await
            .is_err());
        assert!(!repo.is_locked().await);
    }

    #[test]
    fn test_certificate_pem_must_hold_a_certificate() {
        let material = generate_signing_material(&DistinguishedNameConfig::default(), 30).unwrap();
        let x5c = pem_to_base64_der(&material.certificate_pem).unwrap();
        assert!(STANDARD.decode(&x5c).is_ok());

        // Valid base64 framing around bytes that are not a certificate
        let bogus = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            STANDARD.encode(b"not a certificate")
        );
        assert!(pem_to_base64_der(&bogus).is_err());

        let key_block = material.private_key_pem.clone();
        assert!(pem_to_base64_der(&key_block).is_err());
        assert!(KeyMaterial::from_material(&SigningMaterial {
            private_key_pem: material.private_key_pem.clone(),
            certificate_pem: bogus,
        })
        .is_err());
    }
}
