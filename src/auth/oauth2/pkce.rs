// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Proof Key for Code Exchange (RFC 7636)

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};

/// PKCE code challenge methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// The verifier is compared as is
    #[serde(rename = "plain")]
    Plain,

    /// base64url(SHA-256(verifier)) without padding
    #[serde(rename = "S256")]
    S256,
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::S256 => write!(f, "S256"),
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            _ => Err(format!("unknown code challenge method: {s}")),
        }
    }
}

/// Challenge stored with an authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl CodeChallenge {
    /// Whether `verifier` answers this challenge
    ///
    /// The comparison is byte-exact on the URL-safe, unpadded form.
    pub fn verify(&self, verifier: &str) -> bool {
        match self.method {
            CodeChallengeMethod::Plain => verifier == self.challenge,
            CodeChallengeMethod::S256 => s256_challenge(verifier) == self.challenge,
        }
    }
}

/// Compute the S256 challenge of a verifier
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
