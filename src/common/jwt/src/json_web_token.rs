// Copyright 2023 RobustMQ Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const SCOPE_ADMIN: &str = "admin";
const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

/// Claims carried by a gateway credential. Only `sub` is required; the time
/// claims are validated when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(deserialize_with = "subject_from_string_or_number")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl Claims {
    pub fn new(sub: impl Into<String>) -> Self {
        Claims {
            sub: sub.into(),
            scope: None,
            role: None,
            iat: None,
            nbf: None,
            exp: None,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        let sub = self.sub.trim();
        if sub.is_empty() {
            None
        } else {
            Some(sub)
        }
    }

    /// Coarse admin check used by admin-gated routes.
    pub fn is_admin(&self) -> bool {
        let admin_scope = self
            .scope
            .as_deref()
            .is_some_and(|scope| scope.eq_ignore_ascii_case(SCOPE_ADMIN));
        let admin_role = self
            .role
            .as_deref()
            .is_some_and(|role| ADMIN_ROLES.iter().any(|r| role.eq_ignore_ascii_case(r)));
        admin_scope || admin_role
    }
}

// Admin credentials carry a numeric subject, user credentials a string one.
fn subject_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSubject {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawSubject::deserialize(deserializer)? {
        RawSubject::Text(s) => s,
        RawSubject::Signed(n) => n.to_string(),
        RawSubject::Unsigned(n) => n.to_string(),
    })
}

/// The trust domain a route asks a credential to be verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDomain {
    User,
    Admin,
}

/// Which secret accepted the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedBy {
    UserSecret,
    AdminSecret,
    /// Admin-domain request that only the user secret could verify.
    UserSecretFallback,
}

impl VerifiedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifiedBy::UserSecret => "user",
            VerifiedBy::AdminSecret => "admin",
            VerifiedBy::UserSecretFallback => "user-fallback",
        }
    }
}

impl fmt::Display for VerifiedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: Claims,
    pub verified_by: VerifiedBy,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing token")]
    Missing,

    #[error("invalid token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token revoked")]
    Revoked,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Missing => "missing_token",
            TokenError::Malformed => "invalid_token",
            TokenError::Expired => "token_expired",
            TokenError::NotYetValid => "token_not_yet_valid",
            TokenError::Revoked => "token_revoked",
        }
    }
}
