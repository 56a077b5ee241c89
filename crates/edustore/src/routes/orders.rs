// Orders: creation from a cart, owner-scoped reads, staff status changes and
// aggregate statistics.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use edustore_core::db::models::{Download, DownloadStatus, Order, OrderItem, OrderStatus};
use edustore_core::error::ErrorCode;
use edustore_core::utils::{generate_id, generate_reference, now_millis};

use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::session::{self, Claims, STAFF};
use crate::store::EntitlementEffect;

/// Suffix lengths of the generated references.
const ORDER_NUMBER_SUFFIX: usize = 5;
const DOWNLOAD_ID_SUFFIX: usize = 8;

/// Days covered by the `daily` series of the statistics.
const STATS_DAYS: i64 = 7;

// ─── Request / response types ───────────────────────────────────

/// One cart line as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    /// Product id.
    pub id: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

/// An order with its line items and entitlements.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub downloads: Vec<Download>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub message: &'static str,
    pub order: OrderView,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<OrderView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: OrderView,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub message: &'static str,
    pub order: OrderView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub orders: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub processing_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    /// Sum of `total` over COMPLETED orders.
    pub total_revenue: f64,
    pub today_orders: u64,
    pub today_revenue: f64,
    pub daily: Vec<DailyStats>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: OrderStats,
}

// ─── Helpers ─────────────────────────────────────────────────────

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn money(field: &str, value: Option<f64>) -> ServiceResult<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(ServiceError::validation(format!("{field} must be a number"))),
        None => Err(ServiceError::validation(
            "Subtotal, tax and total are required",
        )),
    }
}

async fn load_view(ctx: &AppContext, order: Order) -> ServiceResult<OrderView> {
    let items = ctx.store.order_items(&order.id).await?;
    let downloads = ctx.store.order_downloads(&order.id).await?;
    Ok(OrderView {
        order,
        items,
        downloads,
    })
}

/// Check the caller's totals against the catalog-priced lines.
fn reconcile(line_sum: f64, subtotal: f64, tax: f64, total: f64, tolerance: f64) -> ServiceResult<()> {
    if tax < 0.0 {
        return Err(ServiceError::validation("Tax cannot be negative"));
    }
    if (line_sum - subtotal).abs() > tolerance {
        return Err(ServiceError::validation(
            "Subtotal does not match the order items",
        ));
    }
    if (subtotal + tax - total).abs() > tolerance {
        return Err(ServiceError::validation(
            "Total does not match subtotal plus tax",
        ));
    }
    Ok(())
}

// ─── Handlers ────────────────────────────────────────────────────

/// Create an order from the caller's cart.
///
/// 1. Validate the cart shape and quantities
/// 2. Price every line from the catalog; a stale client price is rejected
/// 3. Reconcile subtotal, tax and total within `priceTolerance`
/// 4. Persist order, snapshot items and one entitlement per item atomically
pub async fn handle_create_order(
    ctx: Arc<AppContext>,
    claims: Claims,
    body: CreateOrderRequest,
) -> ServiceResult<CreateOrderResponse> {
    let order_options = &ctx.options.orders;

    if body.items.is_empty() {
        return Err(ServiceError::validation(
            "Order must contain at least one item",
        ));
    }
    let subtotal = money("subtotal", body.subtotal)?;
    let tax = money("tax", body.tax)?;
    let total = money("total", body.total)?;

    // Orders are only placed by live accounts.
    let user = ctx
        .store
        .find_user(&claims.id)
        .await?
        .ok_or(ServiceError::Unauthorized)?;

    let now = now_millis();
    let order_id = generate_id();
    let mut items = Vec::with_capacity(body.items.len());
    for line in &body.items {
        if line.quantity < 1 || line.quantity > order_options.max_quantity {
            return Err(ServiceError::validation(format!(
                "Quantity must be between 1 and {}",
                order_options.max_quantity
            )));
        }
        let product = ctx
            .store
            .find_product(&line.id)
            .await?
            .ok_or_else(|| ServiceError::validation(format!("Product {} not found", line.id)))?;
        if !line.price.is_finite() || (product.price - line.price).abs() > order_options.price_tolerance {
            return Err(ServiceError::validation(format!(
                "Price of {} has changed, please refresh your cart",
                product.title
            )));
        }
        items.push(OrderItem {
            id: generate_id(),
            order_id: order_id.clone(),
            product_id: product.id,
            title: product.title,
            category: product.category,
            price: product.price,
            quantity: line.quantity,
            created_at: now,
        });
    }

    let line_sum: f64 = items.iter().map(OrderItem::line_total).sum();
    reconcile(line_sum, subtotal, tax, total, order_options.price_tolerance)?;

    let expires_at = now + Duration::seconds(ctx.options.downloads.entitlement_ttl as i64);
    let downloads: Vec<Download> = items
        .iter()
        .map(|item| Download {
            id: generate_id(),
            download_id: generate_reference(
                &order_options.download_id_prefix,
                now,
                DOWNLOAD_ID_SUFFIX,
            ),
            order_id: order_id.clone(),
            product_id: item.product_id.clone(),
            user_id: user.id.clone(),
            status: DownloadStatus::Active,
            expires_at,
            created_at: now,
        })
        .collect();

    let order = Order {
        id: order_id,
        order_number: generate_reference(
            &order_options.order_number_prefix,
            now,
            ORDER_NUMBER_SUFFIX,
        ),
        user_id: user.id.clone(),
        subtotal: round_cents(subtotal),
        tax: round_cents(tax),
        total: round_cents(total),
        status: OrderStatus::Pending,
        download_ids: Vec::new(),
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    let order = ctx.store.create_order(&order, &items, &downloads).await?;
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        user_id = %order.user_id,
        total = order.total,
        items = items.len(),
        "order created"
    );

    Ok(CreateOrderResponse {
        message: "Order created successfully",
        order: OrderView {
            order,
            items,
            downloads,
        },
    })
}

/// The caller's orders, newest first.
pub async fn handle_list_my_orders(
    ctx: Arc<AppContext>,
    claims: Claims,
    query: ListOrdersQuery,
) -> ServiceResult<ListOrdersResponse> {
    let order_options = &ctx.options.orders;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(order_options.default_page_size);
    if page < 1 {
        return Err(ServiceError::validation("Page must be at least 1"));
    }
    if limit < 1 || limit > order_options.max_page_size {
        return Err(ServiceError::validation(format!(
            "Limit must be between 1 and {}",
            order_options.max_page_size
        )));
    }

    let offset = (page - 1)
        .checked_mul(limit)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| ServiceError::validation("Page is out of range"))?;
    let result = ctx
        .store
        .list_orders_for_user(&claims.id, limit, offset)
        .await?;

    let mut orders = Vec::with_capacity(result.orders.len());
    for order in result.orders {
        orders.push(load_view(&ctx, order).await?);
    }

    let total = result.total.max(0) as u64;
    Ok(ListOrdersResponse {
        orders,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        },
    })
}

/// One of the caller's orders. Someone else's order is reported exactly
/// like a missing one.
pub async fn handle_get_order(
    ctx: Arc<AppContext>,
    claims: Claims,
    order_id: &str,
) -> ServiceResult<OrderResponse> {
    let order = ctx
        .store
        .find_order(order_id)
        .await?
        .filter(|order| order.user_id == claims.id)
        .ok_or(ServiceError::NotFound(ErrorCode::OrderNotFound))?;
    Ok(OrderResponse {
        order: load_view(&ctx, order).await?,
    })
}

/// Move an order along the status graph (staff only).
///
/// Requesting the current status changes nothing. Completing an order
/// restarts its entitlements' lifetime; cancelling revokes them.
pub async fn handle_update_status(
    ctx: Arc<AppContext>,
    claims: Claims,
    order_id: &str,
    body: UpdateStatusRequest,
) -> ServiceResult<UpdateStatusResponse> {
    let actor = session::require_role(&ctx, &claims, STAFF).await?;
    let next = OrderStatus::from_str(body.status.trim()).map_err(ServiceError::Validation)?;

    let order = ctx
        .store
        .find_order(order_id)
        .await?
        .ok_or(ServiceError::NotFound(ErrorCode::OrderNotFound))?;

    if order.status == next {
        return Ok(UpdateStatusResponse {
            message: "Order status updated successfully",
            order: load_view(&ctx, order).await?,
        });
    }
    if !order.status.can_transition_to(next) {
        return Err(ServiceError::conflict(
            ErrorCode::InvalidStatusTransition,
            format!("Cannot change order status from {} to {}", order.status, next),
        ));
    }

    let now = now_millis();
    let effect = match next {
        OrderStatus::Completed => EntitlementEffect::ExtendTo(
            now + Duration::seconds(ctx.options.downloads.entitlement_ttl as i64),
        ),
        OrderStatus::Cancelled => EntitlementEffect::Revoke,
        OrderStatus::Pending | OrderStatus::Processing => EntitlementEffect::None,
    };

    let updated = ctx
        .store
        .transition_order(order_id, order.status, next, effect, now)
        .await?
        .ok_or_else(|| {
            ServiceError::conflict(
                ErrorCode::InvalidStatusTransition,
                "Order status was changed by another request",
            )
        })?;

    tracing::info!(
        order_id = %updated.id,
        from = %order.status,
        to = %next,
        actor = %actor.id,
        "order status changed"
    );

    Ok(UpdateStatusResponse {
        message: "Order status updated successfully",
        order: load_view(&ctx, updated).await?,
    })
}

/// Order counts and revenue (staff only).
pub async fn handle_stats(ctx: Arc<AppContext>, claims: Claims) -> ServiceResult<StatsResponse> {
    session::require_role(&ctx, &claims, STAFF).await?;
    let orders = ctx.store.list_all_orders().await?;
    Ok(StatsResponse {
        stats: compute_stats(&orders, now_millis()),
    })
}

/// Aggregate `orders` as seen at `now`. Days are UTC calendar days.
pub fn compute_stats(orders: &[Order], now: DateTime<Utc>) -> OrderStats {
    let today = now.date_naive();
    let first_day = today - Duration::days(STATS_DAYS - 1);
    let mut daily: Vec<(NaiveDate, u64, f64)> = (0..STATS_DAYS)
        .map(|offset| (first_day + Duration::days(offset), 0, 0.0))
        .collect();

    let count = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count() as u64;
    let mut total_revenue = 0.0;
    let mut today_orders = 0;
    let mut today_revenue = 0.0;

    for order in orders {
        let day = order.created_at.date_naive();
        let revenue = if order.status == OrderStatus::Completed {
            order.total
        } else {
            0.0
        };
        total_revenue += revenue;
        if day == today {
            today_orders += 1;
            today_revenue += revenue;
        }
        if let Some(slot) = daily.iter_mut().find(|(d, _, _)| *d == day) {
            slot.1 += 1;
            slot.2 += revenue;
        }
    }

    OrderStats {
        total_orders: orders.len() as u64,
        pending_orders: count(OrderStatus::Pending),
        processing_orders: count(OrderStatus::Processing),
        completed_orders: count(OrderStatus::Completed),
        cancelled_orders: count(OrderStatus::Cancelled),
        total_revenue: round_cents(total_revenue),
        today_orders,
        today_revenue: round_cents(today_revenue),
        daily: daily
            .into_iter()
            .map(|(date, orders, revenue)| DailyStats {
                date: date.format("%Y-%m-%d").to_string(),
                orders,
                revenue: round_cents(revenue),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_at(status: OrderStatus, total: f64, created_at: DateTime<Utc>) -> Order {
        Order {
            id: generate_id(),
            order_number: "ORD-1-ABCDE".into(),
            user_id: "u1".into(),
            subtotal: total,
            tax: 0.0,
            total,
            status,
            download_ids: vec![],
            completed_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_reconcile() {
        assert!(reconcile(20.0, 20.0, 2.0, 22.0, 0.01).is_ok());
        assert!(reconcile(20.0, 20.004, 2.0, 22.004, 0.01).is_ok());
        assert!(reconcile(20.0, 25.0, 2.0, 27.0, 0.01).is_err());
        assert!(reconcile(20.0, 20.0, 2.0, 23.0, 0.01).is_err());
        assert!(reconcile(20.0, 20.0, -1.0, 19.0, 0.01).is_err());
    }

    #[test]
    fn test_money_requires_all_totals() {
        assert!(money("subtotal", None).is_err());
        assert!(money("tax", Some(f64::NAN)).is_err());
        assert_eq!(money("total", Some(3.5)).unwrap(), 3.5);
    }

    #[test]
    fn test_compute_stats() {
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let yesterday = now - Duration::days(1);
        let long_ago = now - Duration::days(30);
        let orders = vec![
            order_at(OrderStatus::Completed, 22.0, now),
            order_at(OrderStatus::Pending, 10.0, now),
            order_at(OrderStatus::Completed, 5.5, yesterday),
            order_at(OrderStatus::Cancelled, 7.0, yesterday),
            order_at(OrderStatus::Completed, 100.0, long_ago),
            order_at(OrderStatus::Processing, 3.0, long_ago),
        ];

        let stats = compute_stats(&orders, now);
        assert_eq!(stats.total_orders, 6);
        assert_eq!(stats.pending_orders, 1);
        assert_eq!(stats.processing_orders, 1);
        assert_eq!(stats.completed_orders, 3);
        assert_eq!(stats.cancelled_orders, 1);
        assert_eq!(stats.total_revenue, 127.5);
        assert_eq!(stats.today_orders, 2);
        assert_eq!(stats.today_revenue, 22.0);

        assert_eq!(stats.daily.len(), 7);
        assert_eq!(stats.daily[0].date, "2026-03-04");
        let last = stats.daily.last().unwrap();
        assert_eq!(last.date, "2026-03-10");
        assert_eq!(last.orders, 2);
        assert_eq!(stats.daily[5].orders, 2);
        assert_eq!(stats.daily[5].revenue, 5.5);
    }

    #[test]
    fn test_stats_wire_shape() {
        let stats = compute_stats(&[], Utc::now());
        let json = serde_json::to_value(StatsResponse { stats }).unwrap();
        assert_eq!(json["stats"]["totalOrders"], 0);
        assert_eq!(json["stats"]["daily"].as_array().unwrap().len(), 7);
    }
}
