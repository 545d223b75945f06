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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common_base::utils::time_util::{now_secs, UnixTimestamp};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};

use crate::json_web_token::{Claims, TokenDomain, TokenError, VerifiedBy, VerifiedToken};
use crate::storage::{RevocationStore, StorageError};

pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// TTL used when revoking a credential that carries no `exp` claim.
pub const UNBOUNDED_REVOCATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

pub struct VerifierOptions {
    pub user_secret: String,
    pub admin_secret: String,
    pub leeway: Duration,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            user_secret: String::new(),
            admin_secret: String::new(),
            leeway: DEFAULT_LEEWAY,
        }
    }
}

pub struct TokenVerifier {
    user_key: Option<DecodingKey>,
    admin_key: Option<DecodingKey>,
    leeway: u64,
    validation: Validation,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenVerifier {
    pub fn new(options: VerifierOptions, revocations: Arc<dyn RevocationStore>) -> Self {
        let key_for = |secret: &str| {
            if secret.is_empty() {
                None
            } else {
                Some(DecodingKey::from_secret(secret.as_bytes()))
            }
        };
        let leeway = options.leeway.as_secs();

        TokenVerifier {
            user_key: key_for(&options.user_secret),
            admin_key: key_for(&options.admin_secret),
            leeway,
            validation: TokenVerifier::create_validation(leeway),
            revocations,
        }
    }

    fn create_validation(leeway: u64) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }

    /// Full check: signature, time claims, then the revocation store.
    pub async fn verify(
        &self,
        token: &str,
        domain: TokenDomain,
    ) -> Result<VerifiedToken, TokenError> {
        let verified = self.verify_signature(token, domain)?;
        if self.is_revoked(token).await {
            return Err(TokenError::Revoked);
        }
        Ok(verified)
    }

    /// Signature and time validation only.
    pub fn verify_signature(
        &self,
        token: &str,
        domain: TokenDomain,
    ) -> Result<VerifiedToken, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        match domain {
            TokenDomain::User => {
                let key = self.user_key.as_ref().ok_or(TokenError::Missing)?;
                let claims = self.decode_with(token, key)?;
                Ok(VerifiedToken {
                    claims,
                    verified_by: VerifiedBy::UserSecret,
                })
            }
            TokenDomain::Admin => {
                let mut admin_error = None;
                if let Some(admin_key) = &self.admin_key {
                    match self.decode_with(token, admin_key) {
                        Ok(claims) => {
                            return Ok(VerifiedToken {
                                claims,
                                verified_by: VerifiedBy::AdminSecret,
                            })
                        }
                        // The signature matched, so the user secret cannot do better.
                        Err(e) if e != TokenError::Malformed => return Err(e),
                        Err(e) => admin_error = Some(e),
                    }
                }

                let Some(user_key) = &self.user_key else {
                    return Err(admin_error.unwrap_or(TokenError::Missing));
                };
                let claims = self.decode_with(token, user_key)?;
                info!(
                    "admin route accepted token for subject {} via user secret fallback",
                    claims.sub
                );
                Ok(VerifiedToken {
                    claims,
                    verified_by: VerifiedBy::UserSecretFallback,
                })
            }
        }
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> Result<Claims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::Malformed)?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            warn!("rejected token signed with unexpected algorithm {:?}", header.alg);
            return Err(TokenError::Malformed);
        }

        let claims = jsonwebtoken::decode::<Claims>(token, key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Malformed,
            })?
            .claims;

        if let Some(iat) = claims.iat {
            if iat > now_secs() + self.leeway {
                return Err(TokenError::Malformed);
            }
        }
        Ok(claims)
    }

    /// Storage failures count as "not revoked".
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.revocations.is_revoked(token).await {
            Ok(revoked) => revoked,
            Err(e) => {
                warn!("Error checking token blacklist, allowing token: {}", e);
                false
            }
        }
    }

    /// Revokes `token` for as long as `verify` would still accept it. Returns
    /// the TTL used, or `None` when the token is past `exp` plus the leeway.
    pub async fn revoke(
        &self,
        token: &str,
        claims: &Claims,
    ) -> Result<Option<Duration>, StorageError> {
        let ttl = match claims.exp {
            Some(_) => match remaining_ttl(claims, UnixTimestamp::now(), self.leeway) {
                Some(ttl) => ttl,
                None => return Ok(None),
            },
            None => UNBOUNDED_REVOCATION_TTL,
        };
        self.revocations.revoke(token, ttl).await?;
        Ok(Some(ttl))
    }
}

/// Time left before `exp + leeway`, `None` when there is none left or no
/// `exp` at all.
pub fn remaining_ttl(claims: &Claims, now: UnixTimestamp, leeway: u64) -> Option<Duration> {
    let exp = claims.exp?;
    let remaining = UnixTimestamp::from_secs(exp.saturating_add(leeway)).remaining_from(now);
    if remaining.is_zero() {
        None
    } else {
        Some(remaining)
    }
}

/// Signs `claims` with an HMAC secret.
pub fn issue_token(claims: &Claims, secret: &str, algorithm: Algorithm) -> Result<String, TokenError> {
    if !HMAC_ALGORITHMS.contains(&algorithm) || secret.is_empty() {
        return Err(TokenError::Malformed);
    }
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Malformed)
}
