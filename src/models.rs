use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

/// Record
///
/// The transport representation of one content entity: every schema field keyed by
/// name (absent optionals as explicit `null`), plus `id`, timestamps, computed counts,
/// and any requested relation projections. Its shape is dictated by the entity's
/// [`EntitySchema`](crate::schema::EntitySchema), so it stays dynamic.
pub type Record = Map<String, Value>;

// --- Administrator Identity ---

/// AdminUser
///
/// The credential-store row from `admin_users`. Holds the Argon2 PHC string; never
/// serialized directly, see [`AdminUser::to_view`].
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: String,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminUser {
    /// to_view
    ///
    /// Projects the account for transport. `password_hash` is only carried when the
    /// caller explicitly opts into sensitive fields, which no HTTP route does.
    pub fn to_view(&self, include_sensitive: bool) -> AdminUserView {
        AdminUserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role.clone(),
            last_login: self.last_login,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            password_hash: include_sensitive.then(|| self.password_hash.clone()),
        }
    }
}

/// AdminUserView
///
/// Serialized form of an administrator account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminUserView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    #[ts(type = "string | null")]
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub password_hash: Option<String>,
}

/// Input for inserting an administrator; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: String,
}

// --- Auth Payloads ---

/// LoginRequest
///
/// `username` matches either the account's username or its email.
#[derive(Debug, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: AdminUserView,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[serde(alias = "current_password")]
    pub old_password: String,
    pub new_password: String,
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// --- Admin Payloads ---

/// DashboardCounts
///
/// Row counts per content kind (inactive rows included).
#[derive(Debug, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardCounts {
    pub total_products: i64,
    pub total_staff: i64,
    pub total_board_members: i64,
    pub total_departments: i64,
    pub total_downloads: i64,
    pub total_news: i64,
    pub total_sliders: i64,
}

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardStats {
    pub stats: DashboardCounts,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub recent_news: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub recent_downloads: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DownloadTracked {
    pub message: String,
    pub download_count: i64,
}

// --- Public Aggregates ---

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct HomePage {
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub sliders: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub news: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub featured_products: Vec<Record>,
}

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct AboutPage {
    #[schema(value_type = Option<Object>)]
    #[ts(type = "Record<string, unknown> | null")]
    pub about_content: Option<Record>,
    #[schema(value_type = Option<Object>)]
    #[ts(type = "Record<string, unknown> | null")]
    pub mission: Option<Record>,
    #[schema(value_type = Option<Object>)]
    #[ts(type = "Record<string, unknown> | null")]
    pub vision: Option<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub values: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub awards: Vec<Record>,
}

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DepartmentDetail {
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown>")]
    pub department: Record,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub staff: Vec<Record>,
}

/// Active board members grouped by their `category`.
#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct BoardPage {
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub executive: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub board: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub supervisory: Vec<Record>,
}

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ProductsPage {
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub categories: Vec<Record>,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub products: Vec<Record>,
}

#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DownloadsPage {
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub forms: Vec<Record>,
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AdminUser {
        let now = Utc::now();
        AdminUser {
            id: 1,
            username: "admin".into(),
            email: "admin@example.com".into(),
            password_hash: "$argon2id$v=19$stub".into(),
            full_name: None,
            role: "superadmin".into(),
            last_login: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn view_omits_password_hash_by_default() {
        let json = serde_json::to_value(admin().to_view(false)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["full_name"], Value::Null);
        assert_eq!(json["last_login"], Value::Null);
    }

    #[test]
    fn view_carries_password_hash_when_opted_in() {
        let json = serde_json::to_value(admin().to_view(true)).unwrap();
        assert_eq!(json["password_hash"], "$argon2id$v=19$stub");
    }

    #[test]
    fn login_accepts_email_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"admin@example.com","password":"x"}"#).unwrap();
        assert_eq!(req.username, "admin@example.com");
    }
}
