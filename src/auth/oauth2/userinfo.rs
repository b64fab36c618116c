// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect UserInfo claims

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Write-only view handed to the profile provider
///
/// Providers can only set claims; the engine writes `sub` after the provider
/// returns so that it cannot be overwritten.
pub trait UserInfoSink: Send {
    fn set_subject(&mut self, subject: &str);
    fn set_email(&mut self, email: &str);
    fn set_name(&mut self, name: &str);
    fn set_email_verified(&mut self, verified: bool);
    /// Escape hatch for claims without a dedicated setter
    fn set_custom(&mut self, key: &str, value: Value);
}

/// OpenID Connect UserInfo Response
///
/// The `sub` claim is the only required field. Claims set through
/// [`UserInfoSink::set_custom`] are flattened into the top-level object.
///
/// References:
/// - https://openid.net/specs/openid-connect-core-1_0.html#UserInfo
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserInfoResponse {
    pub sub: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

impl UserInfoResponse {
    /// Creates a new UserInfoResponse with minimal required fields
    pub fn new(subject: &str) -> Self {
        Self {
            sub: subject.to_string(),
            ..Self::default()
        }
    }
}

impl UserInfoSink for UserInfoResponse {
    fn set_subject(&mut self, subject: &str) {
        self.sub = subject.to_string();
    }

    fn set_email(&mut self, email: &str) {
        self.email = Some(email.to_string());
    }

    fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    fn set_email_verified(&mut self, verified: bool) {
        self.email_verified = Some(verified);
    }

    fn set_custom(&mut self, key: &str, value: Value) {
        match key {
            // Reserved names keep their typed field
            "sub" | "name" | "email" | "email_verified" => {}
            _ => {
                self.custom.insert(key.to_string(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialization_skips_unset_claims() {
        let mut info = UserInfoResponse::default();
        info.set_email("aaa@example.com");
        info.set_subject("subsub");
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"sub": "subsub", "email": "aaa@example.com"})
        );
    }

    #[test]
    fn test_custom_claims_are_flattened() {
        let mut info = UserInfoResponse::new("subsub");
        info.set_custom("locale", json!("ja-JP"));
        info.set_custom("sub", json!("attacker"));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["locale"], "ja-JP");
        assert_eq!(value["sub"], "subsub");
    }
}
