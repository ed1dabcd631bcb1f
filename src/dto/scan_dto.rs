use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use validator::Validate;

use crate::error::Result;
use crate::services::qr_service::{Frame, FrameFormat};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionPayload {
    pub granted: bool,
}

/// One camera frame; only the luminance (Y) plane is sent.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct FramePayload {
    #[schema(value_type = Option<String>, example = "YUV_420_888")]
    pub format: Option<FrameFormat>,
    /// Android `ImageFormat` code, used when `format` is absent.
    pub format_code: Option<u32>,
    #[validate(range(min = 1, max = 8192))]
    pub width: usize,
    #[validate(range(min = 1, max = 8192))]
    pub height: usize,
    #[validate(range(max = 16384))]
    pub row_stride: Option<usize>,
    /// Base64-encoded Y plane.
    pub y_plane: String,
}

impl FramePayload {
    pub fn into_frame(self) -> Result<Frame> {
        self.validate()?;
        let y_plane = STANDARD.decode(self.y_plane.as_bytes())?;
        Ok(Frame {
            format: self
                .format
                .or_else(|| self.format_code.map(FrameFormat::from_code))
                .unwrap_or(FrameFormat::Other),
            width: self.width,
            height: self.height,
            row_stride: self.row_stride.unwrap_or(self.width),
            y_plane,
        })
    }
}
