// Admin accounts and their capability flags.
//
// Everything here is SUPERADMIN-only except reading one's own permissions.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use edustore_core::db::models::{AdminPermission, Permissions, PermissionsPatch, Role, User};
use edustore_core::error::ErrorCode;
use edustore_core::utils::{generate_id, now_millis};

use crate::contact::Contact;
use crate::context::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::routes::auth::UserView;
use crate::session::{self, Claims, STAFF, SUPERADMIN_ONLY};
use crate::store::{AdminRemoval, StoreError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Flags left out default to false.
    #[serde(default)]
    pub permissions: Option<PermissionsPatch>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminView {
    #[serde(flatten)]
    pub user: UserView,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: chrono::DateTime<Utc>,
    pub permissions: Permissions,
}

#[derive(Debug, Serialize)]
pub struct CreateAdminResponse {
    pub message: &'static str,
    pub admin: AdminView,
}

#[derive(Debug, Serialize)]
pub struct ListAdminsResponse {
    pub admins: Vec<AdminView>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePermissionsResponse {
    pub message: &'static str,
    pub permissions: Permissions,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Fetch `admin_id` if it names an ADMIN account.
async fn find_admin(ctx: &AppContext, admin_id: &str) -> ServiceResult<User> {
    ctx.store
        .find_user(admin_id)
        .await?
        .filter(|user| user.role == Role::Admin)
        .ok_or(ServiceError::NotFound(ErrorCode::AdminNotFound))
}

fn user_exists() -> ServiceError {
    ServiceError::conflict(ErrorCode::UserAlreadyExists, ErrorCode::UserAlreadyExists.to_string())
}

/// Create an ADMIN account with its permission row.
pub async fn handle_create_admin(
    ctx: Arc<AppContext>,
    claims: Claims,
    body: CreateAdminRequest,
) -> ServiceResult<CreateAdminResponse> {
    let actor = session::require_role(&ctx, &claims, SUPERADMIN_ONLY).await?;
    let contact = Contact::email(body.email.trim())?;
    if ctx.store.find_user_by_contact(&contact).await?.is_some() {
        return Err(user_exists());
    }

    let mut permissions = Permissions::default();
    if let Some(patch) = &body.permissions {
        permissions.apply(patch);
    }

    let now = now_millis();
    let user = User {
        id: generate_id(),
        email: Some(contact.value().to_string()),
        phone: None,
        first_name: body.first_name.unwrap_or_default(),
        last_name: body.last_name.unwrap_or_default(),
        role: Role::Admin,
        is_email_verified: true,
        is_phone_verified: false,
        created_at: now,
        updated_at: now,
    };
    let mut record = AdminPermission {
        id: generate_id(),
        user_id: user.id.clone(),
        can_manage_products: false,
        can_manage_categories: false,
        can_manage_orders: false,
        can_manage_exams: false,
        can_view_analytics: false,
        created_at: now,
        updated_at: now,
    };
    record.set_permissions(permissions);

    let admin = match ctx.store.create_admin(&user, &record).await {
        Ok(admin) => admin,
        // Lost a race against another registration of the same email.
        Err(StoreError::Duplicate { .. }) => return Err(user_exists()),
        Err(e) => return Err(e.into()),
    };
    tracing::info!(admin_id = %admin.id, created_by = %actor.id, "admin created");

    Ok(CreateAdminResponse {
        message: "Admin created successfully",
        admin: AdminView {
            user: UserView::from(&admin),
            created_at: admin.created_at,
            permissions,
        },
    })
}

/// Every ADMIN account with its permissions; accounts without a row get all flags false.
pub async fn handle_list_admins(
    ctx: Arc<AppContext>,
    claims: Claims,
) -> ServiceResult<ListAdminsResponse> {
    session::require_role(&ctx, &claims, SUPERADMIN_ONLY).await?;
    let users = ctx.store.list_users_by_role(Role::Admin).await?;

    let mut admins = Vec::with_capacity(users.len());
    for user in users {
        let permissions = ctx
            .store
            .find_permissions(&user.id)
            .await?
            .map(|row| row.permissions())
            .unwrap_or_default();
        admins.push(AdminView {
            user: UserView::from(&user),
            created_at: user.created_at,
            permissions,
        });
    }
    Ok(ListAdminsResponse { admins })
}

/// Overwrite the flags named in `patch`; the others keep their value.
pub async fn handle_update_permissions(
    ctx: Arc<AppContext>,
    claims: Claims,
    admin_id: &str,
    patch: PermissionsPatch,
) -> ServiceResult<UpdatePermissionsResponse> {
    let actor = session::require_role(&ctx, &claims, SUPERADMIN_ONLY).await?;
    let admin = find_admin(&ctx, admin_id).await?;

    let mut permissions = ctx
        .store
        .find_permissions(&admin.id)
        .await?
        .map(|row| row.permissions())
        .unwrap_or_default();
    permissions.apply(&patch);

    let saved = ctx
        .store
        .upsert_permissions(&admin.id, permissions, now_millis())
        .await?;
    tracing::info!(admin_id = %admin.id, updated_by = %actor.id, "admin permissions updated");

    Ok(UpdatePermissionsResponse {
        message: "Permissions updated successfully",
        permissions: saved.permissions(),
    })
}

/// Remove an ADMIN account and its permissions. SUPERADMIN accounts are
/// not reachable here.
pub async fn handle_delete_admin(
    ctx: Arc<AppContext>,
    claims: Claims,
    admin_id: &str,
) -> ServiceResult<MessageResponse> {
    let actor = session::require_role(&ctx, &claims, SUPERADMIN_ONLY).await?;
    let admin = find_admin(&ctx, admin_id).await?;

    match ctx.store.delete_admin(&admin.id).await? {
        AdminRemoval::Deleted => {}
        AdminRemoval::Missing => return Err(ServiceError::NotFound(ErrorCode::AdminNotFound)),
        AdminRemoval::HasOrders => {
            return Err(ServiceError::conflict(
                ErrorCode::AdminHasOrders,
                ErrorCode::AdminHasOrders.to_string(),
            ))
        }
    }
    tracing::info!(admin_id = %admin.id, deleted_by = %actor.id, "admin deleted");

    Ok(MessageResponse {
        message: "Admin deleted successfully",
    })
}

/// The caller's own flags. A SUPERADMIN holds every capability.
pub async fn handle_my_permissions(
    ctx: Arc<AppContext>,
    claims: Claims,
) -> ServiceResult<Permissions> {
    let user = session::require_role(&ctx, &claims, STAFF).await?;
    if user.role == Role::SuperAdmin {
        return Ok(Permissions::all());
    }
    Ok(ctx
        .store
        .find_permissions(&user.id)
        .await?
        .map(|row| row.permissions())
        .unwrap_or_default())
}
