use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::user_dto::UserStatsResponse;
use crate::services::automation_service::RunStatus;
use crate::services::qr_service::ScannerState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LaunchPayload {
    pub url: String,
}

/// What the quick-launch shortcut shows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LaunchSummary {
    pub users: UserStatsResponse,
    #[schema(value_type = Object)]
    pub scanner: ScannerState,
    #[schema(value_type = Object)]
    pub automation: RunStatus,
}
