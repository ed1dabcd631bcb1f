use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateUserPayload {
    #[validate(custom(function = "crate::utils::validation::not_blank"))]
    pub name: String,
    #[validate(length(min = 3))]
    pub user_id: String,
    #[validate(length(min = 4))]
    pub password: String,
}

impl CreateUserPayload {
    /// Surrounding whitespace is not part of a name or login id.
    pub fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
            password: self.password,
        }
    }
}

/// `user_id` is fixed after creation; a missing password keeps the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateUserPayload {
    #[validate(custom(function = "crate::utils::validation::not_blank"))]
    pub name: String,
    #[validate(length(min = 4))]
    pub password: Option<String>,
}

/// Stored account without its secret.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            user_id: user.user_id,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserStatsResponse {
    pub total: usize,
    pub active: usize,
}
