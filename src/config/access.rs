// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! User access configuration
//!
//! This module defines the static user directory consumed by the default
//! credential provider. Account management is out of scope: users are
//! declared in the configuration file with a pre-computed password hash.

use serde::{Deserialize, Serialize};

/// User definition for authentication and profile claims
///
/// # Fields
///
/// * `email` - The login identifier entered in the login UI
/// * `pass` - Base64-encoded password hash (created with `openssl passwd -5 | base64 -w0`)
/// * `subject` - Stable identifier written to the `sub` claim
/// * `name` - Display name returned by the userinfo endpoint
/// * `email_verified` - Value of the `email_verified` claim
///
/// # Example
///
/// ```
/// use rust_oidc_provider::config::User;
///
/// let user = User {
///     email: "aaa@example.com".to_string(),
///     pass: "JDUkYWJjZGVmZ2gkLzlyZnVTcVNmbkczcVQ4SmJjSnpsckQzR2dzNE5QNGtpcG9DSEFWLmMwMAo=".to_string(),
///     subject: "subsub".to_string(),
///     name: Some("aaa".to_string()),
///     email_verified: true,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub email: String,

    /// Base64-encoded password hash
    ///
    /// This should be created using: `openssl passwd -5 <password> | base64 -w0`
    pub pass: String,

    pub subject: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email_verified: bool,
}

/// Configuration for user access
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessConfig {
    /// List of users allowed to sign in
    pub users: Vec<User>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            email: "admin@example.org".to_string(),
            // Default password hash for "admin123" (should be changed in production)
            pass: "JDUkM2E2OUZwQW0xejZBbWV2QSRvMlhhN0lxcVdVU1VPTUh6UVJiM3JjRlRhZy9WYjdpSWJtZUJFaXA3Y1ZECg==".to_string(),
            subject: "admin".to_string(),
            name: Some("Admin User".to_string()),
            email_verified: true,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            users: vec![User::default()],
        }
    }
}

impl AccessConfig {
    /// Find a user by login email
    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|user| user.email == email)
    }

    /// Find a user by subject identifier
    pub fn find_by_subject(&self, subject: &str) -> Option<&User> {
        self.users.iter().find(|user| user.subject == subject)
    }
}
