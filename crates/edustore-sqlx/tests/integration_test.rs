// Integration tests for the SQLx adapter against in-memory SQLite.

use serde_json::json;

use edustore_core::db::adapter::{
    Adapter, FindManyQuery, SchemaStatus, SortBy, WhereClause,
};
use edustore_core::db::schema::Schema;
use edustore_core::error::EduStoreError;
use edustore_sqlx::SqlxAdapter;

async fn setup_adapter() -> SqlxAdapter {
    let adapter = SqlxAdapter::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite");
    adapter
        .create_schema(&Schema::edustore())
        .await
        .expect("Failed to create schema");
    adapter
}

fn user(id: &str, email: &str) -> serde_json::Value {
    json!({
        "id": id,
        "email": email,
        "phone": null,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "role": "USER",
        "isEmailVerified": true,
        "isPhoneVerified": false,
        "createdAt": 1_700_000_000_000i64,
        "updatedAt": 1_700_000_000_000i64,
    })
}

fn order(id: &str, number: &str, user_id: &str, total: f64, created_at: i64) -> serde_json::Value {
    json!({
        "id": id,
        "orderNumber": number,
        "userId": user_id,
        "subtotal": total,
        "tax": 0.0,
        "total": total,
        "status": "PENDING",
        "downloadIds": ["DL-1", "DL-2"],
        "completedAt": null,
        "createdAt": created_at,
        "updatedAt": created_at,
    })
}

#[tokio::test]
async fn test_create_and_find_user_decodes_types() {
    let adapter = setup_adapter().await;
    let created = adapter.create("user", user("u1", "ada@example.com")).await.unwrap();

    assert_eq!(created["id"], "u1");
    assert_eq!(created["isEmailVerified"], true);
    assert_eq!(created["isPhoneVerified"], false);
    assert!(created["phone"].is_null());
    assert_eq!(created["createdAt"], 1_700_000_000_000i64);

    let found = adapter
        .find_one("user", &[WhereClause::eq("email", "ada@example.com")])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["firstName"], "Ada");
}

#[tokio::test]
async fn test_find_one_not_found() {
    let adapter = setup_adapter().await;
    let found = adapter
        .find_one("user", &[WhereClause::eq("id", "missing")])
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_json_and_money_columns_round_trip() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    let created = adapter
        .create("order", order("o1", "ORD-1", "u1", 49.99, 1))
        .await
        .unwrap();

    assert_eq!(created["downloadIds"], json!(["DL-1", "DL-2"]));
    assert_eq!(created["total"].as_f64(), Some(49.99));
    assert!(created["completedAt"].is_null());
}

#[tokio::test]
async fn test_unique_violation_is_typed() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "dup@x.io")).await.unwrap();
    let err = adapter
        .create("user", user("u2", "dup@x.io"))
        .await
        .unwrap_err();
    match err {
        EduStoreError::UniqueViolation { model, field } => {
            assert_eq!(model, "user");
            assert_eq!(field, "email");
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_nullable_unique_columns_allow_many_nulls() {
    let adapter = setup_adapter().await;
    let mut a = user("u1", "a@x.io");
    a["email"] = json!(null);
    a["phone"] = json!("5551234567");
    let mut b = user("u2", "b@x.io");
    b["email"] = json!(null);
    b["phone"] = json!("5557654321");
    adapter.create("user", a).await.unwrap();
    adapter.create("user", b).await.unwrap();
    assert_eq!(adapter.count("user", &[]).await.unwrap(), 2);
}

#[tokio::test]
async fn test_conditional_update_reports_lost_race() {
    let adapter = setup_adapter().await;
    adapter
        .create(
            "otp_code",
            json!({
                "id": "c1", "email": "a@x.io", "phone": null, "code": "123456",
                "expiresAt": 10_000, "used": false, "createdAt": 1
            }),
        )
        .await
        .unwrap();

    let consume = [WhereClause::eq("id", "c1").and(), WhereClause::eq("used", false)];
    let first = adapter
        .update("otp_code", &consume, json!({"used": true}))
        .await
        .unwrap();
    assert_eq!(first.unwrap()["used"], true);

    let second = adapter
        .update("otp_code", &consume, json!({"used": true}))
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_create_unless_exists() {
    let adapter = setup_adapter().await;
    let code = |id: &str| {
        json!({
            "id": id, "email": "a@x.io", "code": "111111",
            "expiresAt": 10_000, "used": false, "createdAt": 5_000
        })
    };
    let conflict = [
        WhereClause::eq("email", "a@x.io").and(),
        WhereClause::eq("used", false).and(),
        WhereClause::gt("createdAt", 4_000),
    ];

    let first = adapter
        .create_unless_exists("otp_code", &conflict, code("c1"))
        .await
        .unwrap();
    assert_eq!(first.unwrap()["id"], "c1");

    let second = adapter
        .create_unless_exists("otp_code", &conflict, code("c2"))
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(adapter.count("otp_code", &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_many_with_sort_and_page() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    for i in 0..5 {
        adapter
            .create(
                "order",
                order(&format!("o{i}"), &format!("ORD-{i}"), "u1", 10.0, i * 1000),
            )
            .await
            .unwrap();
    }

    let page = adapter
        .find_many(
            "order",
            FindManyQuery::filtered(vec![WhereClause::eq("userId", "u1")])
                .sorted(SortBy::desc("createdAt"))
                .paged(2, 1),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = page.iter().map(|o| o["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["o3", "o2"]);
}

#[tokio::test]
async fn test_range_and_in_filters() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    for i in 0..4 {
        adapter
            .create(
                "order",
                order(&format!("o{i}"), &format!("ORD-{i}"), "u1", 10.0, i * 1000),
            )
            .await
            .unwrap();
    }

    let recent = adapter
        .count("order", &[WhereClause::gte("createdAt", 2000)])
        .await
        .unwrap();
    assert_eq!(recent, 2);

    let picked = adapter
        .find_many(
            "order",
            FindManyQuery::filtered(vec![WhereClause::is_in("id", json!(["o0", "o3"]))]),
        )
        .await
        .unwrap();
    assert_eq!(picked.len(), 2);
}

#[tokio::test]
async fn test_update_many_and_delete_many() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    adapter.create("order", order("o1", "ORD-1", "u1", 5.0, 1)).await.unwrap();
    for i in 0..3 {
        adapter
            .create(
                "download",
                json!({
                    "id": format!("d{i}"), "downloadId": format!("DL-{i}"),
                    "orderId": "o1", "productId": "p1", "userId": "u1",
                    "status": "ACTIVE", "expiresAt": 10_000, "createdAt": 1
                }),
            )
            .await
            .unwrap();
    }

    let revoked = adapter
        .update_many(
            "download",
            &[WhereClause::eq("orderId", "o1")],
            json!({"status": "REVOKED"}),
        )
        .await
        .unwrap();
    assert_eq!(revoked, 3);

    let deleted = adapter
        .delete_many("download", &[WhereClause::eq("status", "REVOKED")])
        .await
        .unwrap();
    assert_eq!(deleted, 3);
}

#[tokio::test]
async fn test_delete_single_row() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    adapter.delete("user", &[WhereClause::eq("id", "u1")]).await.unwrap();
    assert_eq!(adapter.count("user", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_commit() {
    let adapter = setup_adapter().await;
    let tx = adapter.begin_transaction().await.unwrap();
    tx.create("user", user("u1", "a@x.io")).await.unwrap();
    tx.create("order", order("o1", "ORD-1", "u1", 5.0, 1)).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(adapter.count("order", &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_transaction_rollback() {
    let adapter = setup_adapter().await;
    let tx = adapter.begin_transaction().await.unwrap();
    tx.create("user", user("u1", "a@x.io")).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(adapter.count("user", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_write_inside_transaction_leaves_nothing_behind() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "a@x.io")).await.unwrap();
    adapter.create("order", order("o1", "ORD-1", "u1", 5.0, 1)).await.unwrap();

    let tx = adapter.begin_transaction().await.unwrap();
    tx.create("order", order("o2", "ORD-2", "u1", 5.0, 2)).await.unwrap();
    let err = tx
        .create("order", order("o3", "ORD-1", "u1", 5.0, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EduStoreError::UniqueViolation { .. }));
    tx.rollback().await.unwrap();

    assert_eq!(adapter.count("order", &[]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_schema_creation_then_idempotent() {
    let adapter = SqlxAdapter::connect("sqlite::memory:").await.unwrap();
    let first = adapter.create_schema(&Schema::edustore()).await.unwrap();
    match first {
        SchemaStatus::Applied { statements } => assert_eq!(statements.len(), 7),
        other => panic!("expected applied, got {other:?}"),
    }
    let second = adapter.create_schema(&Schema::edustore()).await.unwrap();
    assert_eq!(second, SchemaStatus::UpToDate);
}

#[tokio::test]
async fn test_delete_referenced_user_is_refused() {
    let adapter = setup_adapter().await;
    adapter.create("user", user("u1", "ada@example.com")).await.unwrap();
    adapter
        .create("order", order("o1", "ORD-1-AAAAA", "u1", 10.0, 1_700_000_000_000))
        .await
        .unwrap();

    let err = adapter
        .delete("user", &[WhereClause::eq("id", "u1")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EduStoreError::ForeignKeyViolation { ref model, .. } if model == "user"
    ));
    assert_eq!(adapter.count("user", &[]).await.unwrap(), 1);
    assert_eq!(adapter.count("order", &[]).await.unwrap(), 1);
}
