// Passwordless sign-in: one-time codes over email or SMS, then a signed
// session token.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use edustore_core::db::models::{OtpCode, Role, User};
use edustore_core::env::is_production;
use edustore_core::error::ErrorCode;
use edustore_core::utils::{generate_id, now_millis};

use crate::contact::Contact;
use crate::context::AppContext;
use crate::crypto::{constant_time_equal, generate_otp};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::OtpMessage;
use crate::session::{self, Claims, TokenKind};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestOtpResponse {
    pub message: String,
    /// `email` or `sms`.
    pub method: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub token_type: TokenKind,
}

/// The public view of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_email_verified: user.is_email_verified,
            is_phone_verified: user.is_phone_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserView,
}

fn cooldown_message(cooldown_secs: u64) -> String {
    match cooldown_secs {
        60 => "Please wait 1 minute before requesting another OTP".to_string(),
        s if s % 60 == 0 => format!("Please wait {} minutes before requesting another OTP", s / 60),
        s => format!("Please wait {s} seconds before requesting another OTP"),
    }
}

/// Issue a one-time code and send it to the caller's contact.
///
/// 1. Validate and normalize the email or phone number
/// 2. Insert the code unless the contact already holds a live code issued
///    inside the cooldown window (one atomic conditional insert)
/// 3. Dispatch it; a failed delivery is logged and the code stays valid
pub async fn handle_request_otp(
    ctx: Arc<AppContext>,
    body: RequestOtpRequest,
) -> ServiceResult<RequestOtpResponse> {
    let contact = Contact::parse(body.email.as_deref(), body.phone.as_deref())?;
    let otp_options = &ctx.options.otp;

    let now = now_millis();
    let code = OtpCode {
        id: generate_id(),
        email: contact.as_email().map(str::to_string),
        phone: contact.as_phone().map(str::to_string),
        code: generate_otp(otp_options.length),
        expires_at: now + Duration::seconds(otp_options.expires_in as i64),
        used: false,
        created_at: now,
    };
    let cooldown_since = now - Duration::seconds(otp_options.cooldown as i64);

    let Some(issued) = ctx.store.issue_otp_if_idle(&code, cooldown_since).await? else {
        return Err(ServiceError::RateLimited {
            retry_after: otp_options.cooldown,
            message: cooldown_message(otp_options.cooldown),
        });
    };

    if is_production() {
        tracing::debug!(contact = %contact.fingerprint(), method = contact.method(), "otp issued");
    } else {
        tracing::debug!(contact = %contact, code = %issued.code, "otp issued");
    }

    let message = OtpMessage::new(issued.code, otp_options.expires_in);
    if let Err(e) = ctx.notifier.send_otp(&contact, &message).await {
        tracing::warn!(
            contact = %contact.fingerprint(),
            error = %e,
            "otp delivery failed, code remains valid"
        );
    }

    Ok(RequestOtpResponse {
        message: format!("OTP sent successfully to {contact}"),
        method: contact.method(),
    })
}

/// Exchange a code for a session token.
///
/// 1. Find the contact's unused, unexpired codes and compare in constant time
/// 2. Mark the matching code used and find or create the user, in one
///    transaction; losing a race against another verification fails here
/// 3. Sign a token of the requested kind
pub async fn handle_verify_otp(
    ctx: Arc<AppContext>,
    body: VerifyOtpRequest,
) -> ServiceResult<VerifyOtpResponse> {
    let contact = Contact::parse(body.email.as_deref(), body.phone.as_deref())?;
    let submitted = body.code.trim();
    if submitted.is_empty() {
        return Err(ServiceError::validation("OTP code is required"));
    }

    let now = now_millis();
    let candidates = ctx.store.find_active_otps(&contact, now).await?;
    let matched = candidates
        .iter()
        .find(|otp| constant_time_equal(otp.code.as_bytes(), submitted.as_bytes()))
        .ok_or(ServiceError::InvalidOrExpiredCode)?;

    let user = ctx
        .store
        .consume_otp(&matched.id, &contact, now)
        .await?
        .ok_or(ServiceError::InvalidOrExpiredCode)?;

    let token = session::issue_token(&ctx, &user, body.token_type)?;
    tracing::info!(user_id = %user.id, method = contact.method(), "user signed in");

    Ok(VerifyOtpResponse {
        token,
        user: UserView::from(&user),
    })
}

pub async fn handle_refresh_token(
    ctx: Arc<AppContext>,
    body: RefreshTokenRequest,
) -> ServiceResult<TokenResponse> {
    if body.token.is_empty() {
        return Err(ServiceError::validation("Token is required"));
    }
    let token = session::refresh_token(&ctx, &body.token).await?;
    Ok(TokenResponse { token })
}

/// The caller's stored profile.
pub async fn handle_me(ctx: Arc<AppContext>, claims: Claims) -> ServiceResult<MeResponse> {
    let user = ctx
        .store
        .find_user(&claims.id)
        .await?
        .ok_or(ServiceError::NotFound(ErrorCode::UserNotFound))?;
    Ok(MeResponse {
        user: UserView::from(&user),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_message() {
        assert_eq!(
            cooldown_message(60),
            "Please wait 1 minute before requesting another OTP"
        );
        assert_eq!(
            cooldown_message(120),
            "Please wait 2 minutes before requesting another OTP"
        );
        assert_eq!(
            cooldown_message(45),
            "Please wait 45 seconds before requesting another OTP"
        );
    }

    #[test]
    fn test_verify_request_defaults() {
        let body: VerifyOtpRequest =
            serde_json::from_str(r#"{"email":"a@x.io","code":"123456"}"#).unwrap();
        assert_eq!(body.token_type, TokenKind::Session);

        let body: VerifyOtpRequest =
            serde_json::from_str(r#"{"phone":"5551234567","code":"1","tokenType":"access"}"#)
                .unwrap();
        assert_eq!(body.token_type, TokenKind::Access);
    }
}
