// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Certificate Utilities
//!
//! This module generates the RSA signing key of the authorization server and
//! the self-signed X.509 certificate published in the `x5c` member of the
//! JWK set.
//!
//! ## Usage Example
//!
//! ```rust
//! use rust_oidc_provider::config::DistinguishedNameConfig;
//! use rust_oidc_provider::utility::certificate_utilities::generate_signing_material;
//!
//! let material = generate_signing_material(&DistinguishedNameConfig::default(), 3650).unwrap();
//! assert!(material.certificate_pem.contains("-----BEGIN CERTIFICATE-----"));
//! ```
//!
//! ## Security Considerations
//!
//! The certificate only carries the public key to relying parties that want
//! an X.509 form of it. It is never used for TLS.

use anyhow::{Context, Result};
use log::debug;
use rcgen::{CertificateParams, DnType, DnValue, IsCa, KeyPair, KeyUsagePurpose};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::config::DistinguishedNameConfig;

/// Size of the generated RSA modulus
pub const RSA_KEY_BITS: usize = 2048;

/// PEM-encoded key material persisted by the configuration store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SigningMaterial {
    /// PKCS#8 PEM private key
    pub private_key_pem: String,
    /// PEM certificate wrapping the public half of the key
    pub certificate_pem: String,
}

/// Generates a 2048-bit RSA key and a self-signed certificate for it.
///
/// The key is generated with the `rsa` crate and handed to `rcgen` as a
/// PKCS#8 document so that the certificate is signed with RSA/SHA-256.
///
/// ### Arguments
///
/// * `dn` - Subject (and issuer) distinguished name of the certificate
/// * `days` - Validity period in days for the certificate
///
/// ### Returns
///
/// * `Result<SigningMaterial>` - The PEM private key and certificate
pub fn generate_signing_material(dn: &DistinguishedNameConfig, days: u32) -> Result<SigningMaterial> {
    debug!(
        "Generating {}-bit RSA signing key for CN={}",
        RSA_KEY_BITS, dn.common_name
    );
    let private_key =
        RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).context("Failed to generate RSA key")?;
    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("Failed to encode RSA key as PKCS#8")?
        .to_string();

    let certificate_pem = self_signed_certificate(&private_key_pem, dn, days)?;

    Ok(SigningMaterial {
        private_key_pem,
        certificate_pem,
    })
}

/// Creates a self-signed certificate for an existing PKCS#8 RSA private key.
///
/// ### Arguments
///
/// * `private_key_pem` - PKCS#8 PEM encoded RSA private key
/// * `dn` - Subject distinguished name
/// * `days` - Validity period in days
pub fn self_signed_certificate(
    private_key_pem: &str,
    dn: &DistinguishedNameConfig,
    days: u32,
) -> Result<String> {
    let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(private_key_pem, &rcgen::PKCS_RSA_SHA256)
        .context("Failed to load RSA key for certificate signing")?;

    let mut params = CertificateParams::new(vec![dn.common_name.clone()])
        .context("Invalid certificate common name")?;
    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days as i64);

    params
        .distinguished_name
        .push(DnType::CommonName, DnValue::from(dn.common_name.as_str()));
    if !dn.organization.is_empty() {
        params
            .distinguished_name
            .push(DnType::OrganizationName, DnValue::from(dn.organization.as_str()));
    }
    if let Some(unit) = &dn.organizational_unit {
        params
            .distinguished_name
            .push(DnType::OrganizationalUnitName, DnValue::from(unit.as_str()));
    }
    if !dn.country.is_empty() {
        params
            .distinguished_name
            .push(DnType::CountryName, DnValue::from(dn.country.as_str()));
    }
    if let Some(province) = &dn.province {
        params
            .distinguished_name
            .push(DnType::StateOrProvinceName, DnValue::from(province.as_str()));
    }
    if let Some(locality) = &dn.locality {
        params
            .distinguished_name
            .push(DnType::LocalityName, DnValue::from(locality.as_str()));
    }

    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];

    let cert = params
        .self_signed(&key_pair)
        .context("Failed to generate certificate")?;

    Ok(cert.pem())
}
