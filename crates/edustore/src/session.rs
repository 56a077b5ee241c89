// Session tokens and role checks.
//
// Tokens are stateless HS256 JWTs carrying the user's id, role and contact.
// There is no revocation list: a token stays valid until it expires. Role
// checks on state-changing operations re-read the stored user so a deleted
// or demoted account loses access immediately.

use serde::{Deserialize, Serialize};

use edustore_core::db::models::{Role, User};

use crate::context::AppContext;
use crate::crypto::{sign_jwt, verify_jwt};
use crate::error::{ServiceError, ServiceResult};

/// Which lifetime a token was issued with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Login token (`session.expiresIn`, 7 days by default).
    #[default]
    Session,
    /// Short-lived access token (`session.shortLivedExpiresIn`).
    Access,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub kind: TokenKind,
}

impl Claims {
    pub fn for_user(user: &User, kind: TokenKind) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
            email: user.email.clone(),
            phone: user.phone.clone(),
            kind,
        }
    }
}

fn lifetime(ctx: &AppContext, kind: TokenKind) -> u64 {
    match kind {
        TokenKind::Session => ctx.options.session.expires_in,
        TokenKind::Access => ctx.options.session.short_lived_expires_in,
    }
}

/// Sign a fresh token for `user`.
pub fn issue_token(ctx: &AppContext, user: &User, kind: TokenKind) -> ServiceResult<String> {
    let claims = Claims::for_user(user, kind);
    Ok(sign_jwt(&claims, &ctx.options.secret, lifetime(ctx, kind))?)
}

/// Verify a bearer token.
pub fn authenticate(ctx: &AppContext, token: &str) -> ServiceResult<Claims> {
    verify_jwt(token, &ctx.options.secret).ok_or(ServiceError::Unauthorized)
}

/// Exchange a valid token for a new one of the same kind with a fresh expiry.
///
/// Claims are rebuilt from the stored user, so a role change made since the
/// old token was signed is picked up.
pub async fn refresh_token(ctx: &AppContext, token: &str) -> ServiceResult<String> {
    let claims: Claims =
        verify_jwt(token, &ctx.options.secret).ok_or(ServiceError::InvalidToken)?;
    let user = ctx
        .store
        .find_user(&claims.id)
        .await?
        .ok_or(ServiceError::Unauthorized)?;
    issue_token(ctx, &user, claims.kind)
}

/// Fail with `Forbidden` unless `role` is one of `allowed`.
pub fn authorize(role: Role, allowed: &[Role]) -> ServiceResult<()> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

/// Load the caller and check their stored role against `allowed`.
pub async fn require_role(ctx: &AppContext, claims: &Claims, allowed: &[Role]) -> ServiceResult<User> {
    let user = ctx
        .store
        .find_user(&claims.id)
        .await?
        .ok_or(ServiceError::Unauthorized)?;
    authorize(user.role, allowed)?;
    Ok(user)
}

/// Roles allowed to manage orders and read statistics.
pub const STAFF: &[Role] = &[Role::Admin, Role::SuperAdmin];

pub const SUPERADMIN_ONLY: &[Role] = &[Role::SuperAdmin];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize() {
        assert!(authorize(Role::Admin, STAFF).is_ok());
        assert!(authorize(Role::SuperAdmin, STAFF).is_ok());
        assert!(matches!(
            authorize(Role::User, STAFF),
            Err(ServiceError::Forbidden)
        ));
        assert!(authorize(Role::Admin, SUPERADMIN_ONLY).is_err());
    }

    #[test]
    fn test_claims_wire_shape() {
        let claims = Claims {
            id: "u1".into(),
            role: Role::SuperAdmin,
            email: Some("a@x.io".into()),
            phone: None,
            kind: TokenKind::Access,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["role"], "SUPERADMIN");
        assert_eq!(json["kind"], "access");
        assert!(json.get("phone").is_none());
    }

    #[test]
    fn test_kind_defaults_to_session() {
        let claims: Claims = serde_json::from_str(r#"{"id":"u1","role":"USER"}"#).unwrap();
        assert_eq!(claims.kind, TokenKind::Session);
    }
}
