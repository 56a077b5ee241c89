//! OTP sign-in, token refresh and identity lookup against the memory backend.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use edustore::routes::auth::{
    handle_me, handle_refresh_token, handle_request_otp, handle_verify_otp, RefreshTokenRequest,
    RequestOtpRequest, VerifyOtpRequest,
};
use edustore::session::{authenticate, issue_token};
use edustore::{ServiceError, TokenKind};
use edustore_core::db::adapter::{Adapter, WhereClause};
use edustore_core::db::models::Role;
use edustore_core::ErrorCode;

use common::{harness, harness_with, CapturingNotifier};

fn email_request(email: &str) -> RequestOtpRequest {
    RequestOtpRequest {
        email: Some(email.into()),
        phone: None,
    }
}

fn email_verify(email: &str, code: &str) -> VerifyOtpRequest {
    VerifyOtpRequest {
        email: Some(email.into()),
        code: code.into(),
        ..Default::default()
    }
}

// ── Issuance ────────────────────────────────────────────────────

#[tokio::test]
async fn request_otp_by_email() {
    let h = harness();
    let res = handle_request_otp(h.ctx.clone(), email_request("Ada@Example.com"))
        .await
        .unwrap();

    assert_eq!(res.method, "email");
    assert_eq!(res.message, "OTP sent successfully to ada@example.com");
    let code = h.notifier.last_code().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn request_otp_by_phone_normalizes_digits() {
    let h = harness();
    let res = handle_request_otp(
        h.ctx.clone(),
        RequestOtpRequest {
            email: None,
            phone: Some("+1 (555) 010-2030".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(res.method, "sms");

    let stored = h
        .adapter
        .find_one("otp_code", &[WhereClause::eq("phone", "15550102030")])
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn request_otp_rejects_bad_contacts() {
    let h = harness();
    let err = handle_request_otp(h.ctx.clone(), RequestOtpRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = handle_request_otp(h.ctx.clone(), email_request("not-an-email"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(h.notifier.sent_count(), 0);
}

#[tokio::test]
async fn second_request_within_cooldown_is_rate_limited() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();
    let err = handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap_err();

    match err {
        ServiceError::RateLimited {
            retry_after,
            message,
        } => {
            assert_eq!(retry_after, 60);
            assert_eq!(message, "Please wait 1 minute before requesting another OTP");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(h.notifier.sent_count(), 1);

    // Another contact is unaffected.
    assert!(handle_request_otp(h.ctx.clone(), email_request("b@x.io"))
        .await
        .is_ok());
}

#[tokio::test]
async fn concurrent_requests_issue_one_code() {
    let h = harness();
    let (a, b) = tokio::join!(
        handle_request_otp(h.ctx.clone(), email_request("race@x.io")),
        handle_request_otp(h.ctx.clone(), email_request("race@x.io")),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.adapter.model_count("otp_code").await, 1);
}

#[tokio::test]
async fn delivery_failure_keeps_code_valid() {
    let h = harness_with(CapturingNotifier::failing());
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();

    let code = h.notifier.last_code().unwrap();
    let res = handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", &code))
        .await
        .unwrap();
    assert!(!res.token.is_empty());
}

// ── Verification ────────────────────────────────────────────────

#[tokio::test]
async fn verify_creates_user_and_token() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("new@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();

    let res = handle_verify_otp(h.ctx.clone(), email_verify("NEW@x.io", &code))
        .await
        .unwrap();
    assert_eq!(res.user.email.as_deref(), Some("new@x.io"));
    assert_eq!(res.user.role, Role::User);
    assert!(res.user.is_email_verified);
    assert!(!res.user.is_phone_verified);
    assert_eq!(res.user.first_name, "");

    let claims = authenticate(&h.ctx, &res.token).unwrap();
    assert_eq!(claims.id, res.user.id);
    assert_eq!(claims.role, Role::User);
    assert_eq!(claims.kind, TokenKind::Session);
    assert_eq!(claims.email.as_deref(), Some("new@x.io"));
}

#[tokio::test]
async fn verify_existing_user_keeps_identity() {
    let h = harness();
    let (user, _) = h.user("known@x.io", Role::Admin).await;

    handle_request_otp(h.ctx.clone(), email_request("known@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();
    let res = handle_verify_otp(h.ctx.clone(), email_verify("known@x.io", &code))
        .await
        .unwrap();

    assert_eq!(res.user.id, user.id);
    assert_eq!(res.user.role, Role::Admin);
    assert_eq!(h.adapter.model_count("user").await, 1);
}

#[tokio::test]
async fn phone_verification_sets_phone_flag() {
    let h = harness();
    let phone = RequestOtpRequest {
        email: None,
        phone: Some("555-010-2030".into()),
    };
    handle_request_otp(h.ctx.clone(), phone).await.unwrap();
    let code = h.notifier.last_code().unwrap();

    let res = handle_verify_otp(
        h.ctx.clone(),
        VerifyOtpRequest {
            phone: Some("(555) 010 2030".into()),
            code,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(res.user.phone.as_deref(), Some("5550102030"));
    assert!(res.user.is_phone_verified);
    assert!(res.user.email.is_none());
}

#[tokio::test]
async fn code_verifies_only_once() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();

    handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", &code))
        .await
        .unwrap();
    let err = handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
}

#[tokio::test]
async fn wrong_code_changes_nothing() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();
    let wrong = if code == "999999" { "111111" } else { "999999" };

    let err = handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", wrong))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    assert_eq!(h.adapter.model_count("user").await, 0);

    // The real code still works afterwards.
    assert!(handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", &code))
        .await
        .is_ok());
}

#[tokio::test]
async fn code_for_another_contact_is_rejected() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();

    let err = handle_verify_otp(h.ctx.clone(), email_verify("b@x.io", &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
}

#[tokio::test]
async fn expired_code_never_verifies() {
    let h = harness();
    let past = Utc::now() - Duration::minutes(10);
    h.adapter
        .create(
            "otp_code",
            json!({
                "id": "expired",
                "email": "a@x.io",
                "code": "123456",
                "expiresAt": (past + Duration::minutes(5)).timestamp_millis(),
                "used": false,
                "createdAt": past.timestamp_millis(),
            }),
        )
        .await
        .unwrap();

    let err = handle_verify_otp(h.ctx.clone(), email_verify("a@x.io", "123456"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOrExpiredCode));

    // An expired code does not hold the cooldown either.
    assert!(handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .is_ok());
}

#[tokio::test]
async fn access_token_kind_is_carried() {
    let h = harness();
    handle_request_otp(h.ctx.clone(), email_request("a@x.io"))
        .await
        .unwrap();
    let code = h.notifier.last_code().unwrap();
    let res = handle_verify_otp(
        h.ctx.clone(),
        VerifyOtpRequest {
            email: Some("a@x.io".into()),
            code,
            token_type: TokenKind::Access,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let claims = authenticate(&h.ctx, &res.token).unwrap();
    assert_eq!(claims.kind, TokenKind::Access);
}

// ── Tokens ──────────────────────────────────────────────────────

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let h = harness();
    assert!(matches!(
        authenticate(&h.ctx, "not.a.token"),
        Err(ServiceError::Unauthorized)
    ));
}

#[tokio::test]
async fn refresh_token_reissues_for_live_user() {
    let h = harness();
    let (user, _) = h.user("a@x.io", Role::User).await;
    let token = issue_token(&h.ctx, &user, TokenKind::Access).unwrap();

    let res = handle_refresh_token(h.ctx.clone(), RefreshTokenRequest { token })
        .await
        .unwrap();
    let claims = authenticate(&h.ctx, &res.token).unwrap();
    assert_eq!(claims.id, user.id);
    assert_eq!(claims.kind, TokenKind::Access);
}

#[tokio::test]
async fn refresh_rejects_invalid_and_orphaned_tokens() {
    let h = harness();
    let err = handle_refresh_token(
        h.ctx.clone(),
        RefreshTokenRequest {
            token: "garbage".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    let (user, _) = h.user("gone@x.io", Role::User).await;
    let token = issue_token(&h.ctx, &user, TokenKind::Session).unwrap();
    h.adapter
        .delete("user", &[WhereClause::eq("id", user.id.as_str())])
        .await
        .unwrap();
    let err = handle_refresh_token(h.ctx.clone(), RefreshTokenRequest { token })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));
}

#[tokio::test]
async fn me_reads_the_stored_user() {
    let h = harness();
    let (user, claims) = h.user("me@x.io", Role::User).await;

    let res = handle_me(h.ctx.clone(), claims.clone()).await.unwrap();
    assert_eq!(res.user.id, user.id);

    h.adapter
        .delete("user", &[WhereClause::eq("id", user.id.as_str())])
        .await
        .unwrap();
    let err = handle_me(h.ctx.clone(), claims).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ErrorCode::UserNotFound)));
}
