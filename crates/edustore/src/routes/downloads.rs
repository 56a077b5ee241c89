// Download entitlement redemption.
//
// The gate only authorizes: it hands back a reference the file server can
// stream from and never reads the file itself. Every refusal looks the same
// to the caller so identifiers cannot be enumerated; the reason is logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use edustore_core::db::models::{Download, DownloadStatus, Order, OrderStatus};
use edustore_core::utils::now_millis;

use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::session::Claims;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTicket {
    /// The redeemed download identifier.
    pub id: String,
    pub product_id: String,
    pub product_title: String,
    pub order_number: String,
    /// Location of the asset in the catalog, when one is recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub message: &'static str,
    pub download: DownloadTicket,
}

/// Why a redemption was refused. Logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Unknown,
    NotOwner,
    Revoked,
    Expired,
    OrderMissing,
    OrderNotCompleted,
}

impl Refusal {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown download id",
            Self::NotOwner => "download belongs to another user",
            Self::Revoked => "entitlement revoked",
            Self::Expired => "entitlement expired",
            Self::OrderMissing => "parent order missing",
            Self::OrderNotCompleted => "order not completed",
        }
    }
}

/// The redemption rules, in the order they are checked.
pub fn check_entitlement(
    download: &Download,
    order: Option<&Order>,
    user_id: &str,
    now: DateTime<Utc>,
    enforce_expiry: bool,
) -> Result<(), Refusal> {
    if download.user_id != user_id {
        return Err(Refusal::NotOwner);
    }
    if download.status != DownloadStatus::Active {
        return Err(Refusal::Revoked);
    }
    if enforce_expiry && download.expires_at <= now {
        return Err(Refusal::Expired);
    }
    match order {
        None => Err(Refusal::OrderMissing),
        Some(order) if order.status != OrderStatus::Completed => Err(Refusal::OrderNotCompleted),
        Some(_) => Ok(()),
    }
}

fn refuse(download_id: &str, user_id: &str, reason: Refusal) -> ServiceError {
    tracing::warn!(download_id, user_id, reason = reason.as_str(), "download refused");
    ServiceError::DownloadNotAvailable
}

/// Redeem an entitlement. Redemption does not consume it.
pub async fn handle_redeem(
    ctx: Arc<AppContext>,
    claims: Claims,
    download_id: &str,
) -> ServiceResult<RedeemResponse> {
    let Some(download) = ctx.store.find_download(download_id).await? else {
        return Err(refuse(download_id, &claims.id, Refusal::Unknown));
    };
    let order = ctx.store.find_order(&download.order_id).await?;

    check_entitlement(
        &download,
        order.as_ref(),
        &claims.id,
        now_millis(),
        ctx.options.downloads.enforce_expiry,
    )
    .map_err(|reason| refuse(download_id, &claims.id, reason))?;
    let Some(order) = order else {
        return Err(refuse(download_id, &claims.id, Refusal::OrderMissing));
    };

    // Title comes from the purchase snapshot; the file location from the catalog.
    let items = ctx.store.order_items(&order.id).await?;
    let title = items
        .iter()
        .find(|item| item.product_id == download.product_id)
        .map(|item| item.title.clone());
    let product = ctx.store.find_product(&download.product_id).await?;
    let product_title = title
        .or_else(|| product.as_ref().map(|p| p.title.clone()))
        .unwrap_or_else(|| "Unknown Product".to_string());

    tracing::info!(download_id, user_id = %claims.id, order_number = %order.order_number, "download started");

    Ok(RedeemResponse {
        message: "Download started",
        download: DownloadTicket {
            id: download.download_id,
            product_id: download.product_id,
            product_title,
            order_number: order.order_number,
            file_path: product.and_then(|p| p.file_path),
        },
    })
}
