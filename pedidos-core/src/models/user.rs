use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Profile role stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Rol {
    Superadmin,
    Admin,
    Lectura,
}

impl Rol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rol::Superadmin => "superadmin",
            Rol::Admin => "admin",
            Rol::Lectura => "lectura",
        }
    }
}

impl fmt::Display for Rol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User model representing an operator of the system.
///
/// Maps to the `users` table and carries both the login credentials and
/// the profile (role, phone, notes).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,

    /// Login name (unique)
    pub username: String,

    pub email: String,
    pub first_name: String,
    pub last_name: String,

    /// Bcrypt hashed password
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Whether the user account is active
    pub is_active: bool,

    pub is_staff: bool,
    pub is_superuser: bool,
    pub rol: Rol,
    pub telefono: String,
    pub notas: String,

    /// Bumped on logout and password change; tokens carrying an older
    /// value are rejected.
    #[serde(skip_serializing)]
    pub token_version: i32,

    /// Timestamp of the user's last successful login
    pub ultimo_acceso: Option<DateTime<Utc>>,

    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// User creation request (without password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub telefono: Option<String>,
    pub notas: Option<String>,
}

/// User update request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub rol: Option<Rol>,
    pub telefono: Option<String>,
    pub notas: Option<String>,
    pub password: Option<String>,
}

/// User response (public representation, excludes sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub rol: Rol,
    pub telefono: String,
    pub notas: String,
    pub ultimo_acceso: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            full_name: user.full_name(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            rol: user.rol,
            telefono: user.telefono,
            notas: user.notas,
            ultimo_acceso: user.ultimo_acceso,
            date_joined: user.date_joined,
        }
    }
}
