use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored check-in account.
///
/// Field names are serialized in camelCase so the persisted array keeps the
/// shape existing installs already wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub password: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            user_id: user_id.into(),
            password: password.into(),
            is_active: true,
        }
    }
}
