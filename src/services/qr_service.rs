//! Camera-frame QR scanning and check-in link hand-off.
//!
//! Frames go through a `watch` channel, so the analysis task only ever sees
//! the newest one; frames that arrive while a decode is running replace each
//! other instead of queueing.

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::services::automation_service::AutomationService;

const SCHEMES: [&str; 2] = ["http://", "https://"];
const SERVICE_MARKERS: [&str; 2] = ["clic", "osc.mmu.edu.my"];
const DEBUG_MARKER: &str = "192.168";

/// Accepts `http(s)` links carrying a service marker, or any text pointing at
/// a private debug network.
pub fn is_valid_check_in_url(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    let scheme = SCHEMES.iter().any(|s| lower.starts_with(s));
    let marker = SERVICE_MARKERS.iter().any(|m| lower.contains(m));
    (scheme && marker) || text.contains(DEBUG_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPermission {
    Granted,
    Denied,
    Undetermined,
}

impl FromStr for CameraPermission {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "granted" | "true" => Ok(Self::Granted),
            "denied" | "false" => Ok(Self::Denied),
            "undetermined" => Ok(Self::Undetermined),
            other => Err(format!("unknown camera permission '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    #[serde(rename = "YUV_420_888")]
    Yuv420_888,
    #[serde(rename = "YUV_422_888")]
    Yuv422_888,
    #[serde(rename = "YUV_444_888")]
    Yuv444_888,
    #[serde(rename = "OTHER")]
    Other,
}

impl FrameFormat {
    /// Maps Android `ImageFormat` codes.
    pub fn from_code(code: u32) -> Self {
        match code {
            0x23 => Self::Yuv420_888,
            0x27 => Self::Yuv422_888,
            0x28 => Self::Yuv444_888,
            _ => Self::Other,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Other)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub format: FrameFormat,
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
    pub y_plane: Vec<u8>,
}

/// 8-bit luminance, one byte per pixel, rows packed.
#[derive(Debug, Clone)]
pub struct LuminanceMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl LuminanceMap {
    /// Takes the Y plane of a YUV frame. `None` for other formats or a plane
    /// shorter than its declared geometry.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if !frame.format.is_supported() || frame.width == 0 || frame.height == 0 {
            return None;
        }
        let stride = frame.row_stride.max(frame.width);
        let needed = stride
            .checked_mul(frame.height - 1)?
            .checked_add(frame.width)?;
        if frame.y_plane.len() < needed {
            return None;
        }

        let mut data = Vec::with_capacity(frame.width * frame.height);
        for row in frame.y_plane.chunks(stride).take(frame.height) {
            data.extend_from_slice(&row[..frame.width]);
        }
        Some(Self {
            width: frame.width,
            height: frame.height,
            data,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no QR code in frame")]
    NotFound,
    #[error("QR code could not be decoded: {0}")]
    Failed(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait BarcodeReader: Send {
    fn decode(&mut self, luma: &LuminanceMap) -> std::result::Result<String, DecodeError>;
    fn reset(&mut self);
}

#[derive(Debug, Default)]
pub struct RqrrReader;

impl BarcodeReader for RqrrReader {
    fn decode(&mut self, luma: &LuminanceMap) -> std::result::Result<String, DecodeError> {
        let width = luma.width;
        let mut image =
            rqrr::PreparedImage::prepare_from_greyscale(width, luma.height, |x, y| luma.data[y * width + x]);
        let grids = image.detect_grids();
        if grids.is_empty() {
            return Err(DecodeError::NotFound);
        }

        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_, content)) => return Ok(content),
                Err(e) => last_error = Some(e.to_string()),
            }
        }
        Err(DecodeError::Failed(last_error.unwrap_or_default()))
    }

    fn reset(&mut self) {}
}

/// Confirmation cue for an accepted code.
pub trait ScanFeedback: Send + Sync {
    fn confirm(&self, url: &str);
}

pub struct TerminalFeedback;

impl ScanFeedback for TerminalFeedback {
    fn confirm(&self, url: &str) {
        tracing::info!(%url, "QR code accepted");
        eprint!("\x07");
    }
}

/// Receives an accepted check-in link.
#[async_trait]
pub trait UrlHandoff: Send + Sync {
    async fn hand_off(&self, url: &str) -> Result<()>;
}

#[async_trait]
impl UrlHandoff for AutomationService {
    async fn hand_off(&self, url: &str) -> Result<()> {
        self.launch(url).await.map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScannerState {
    Idle,
    Scanning,
    Decoded { url: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    NotScanning,
    UnsupportedFormat,
    NoCode,
    Rejected(String),
    Accepted(String),
}

pub struct QrScanner {
    reader: Box<dyn BarcodeReader>,
    permission: CameraPermission,
    state: ScannerState,
}

impl QrScanner {
    pub fn new(reader: Box<dyn BarcodeReader>, permission: CameraPermission) -> Self {
        let state = match permission {
            CameraPermission::Denied => denied(),
            _ => ScannerState::Idle,
        };
        Self {
            reader,
            permission,
            state,
        }
    }

    pub fn state(&self) -> &ScannerState {
        &self.state
    }

    pub fn set_permission(&mut self, permission: CameraPermission) {
        self.permission = permission;
        self.state = match permission {
            CameraPermission::Denied => denied(),
            _ if matches!(self.state, ScannerState::Unavailable { .. }) => ScannerState::Idle,
            _ => self.state.clone(),
        };
    }

    pub fn start(&mut self) -> Result<()> {
        match self.permission {
            CameraPermission::Granted => {}
            CameraPermission::Denied => {
                return Err(Error::Unavailable("Camera permission denied".to_string()))
            }
            CameraPermission::Undetermined => {
                return Err(Error::Unavailable(
                    "Camera permission has not been granted yet".to_string(),
                ))
            }
        }
        if self.state != ScannerState::Scanning {
            tracing::info!("QR scanning started");
        }
        self.state = ScannerState::Scanning;
        Ok(())
    }

    pub fn analyze(&mut self, frame: &Frame) -> FrameOutcome {
        if self.state != ScannerState::Scanning {
            return FrameOutcome::NotScanning;
        }
        let Some(luma) = LuminanceMap::from_frame(frame) else {
            return FrameOutcome::UnsupportedFormat;
        };

        let decoded = self.reader.decode(&luma);
        self.reader.reset();

        let text = match decoded {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(DecodeError::NotFound) => return FrameOutcome::NoCode,
            Err(e) => {
                tracing::debug!(error = %e, "Frame decode failed");
                return FrameOutcome::NoCode;
            }
        };

        if is_valid_check_in_url(&text) {
            self.state = ScannerState::Decoded { url: text.clone() };
            FrameOutcome::Accepted(text)
        } else {
            tracing::info!(text = %text, "Scanned code is not a check-in link, still scanning");
            FrameOutcome::Rejected(text)
        }
    }

    /// Back to idle once the decoded link has been handed off.
    pub fn finish_handoff(&mut self) {
        if matches!(self.state, ScannerState::Decoded { .. }) {
            self.state = ScannerState::Idle;
        }
    }
}

fn denied() -> ScannerState {
    ScannerState::Unavailable {
        reason: "Camera permission denied".to_string(),
    }
}

/// Background frame analysis around a [`QrScanner`].
#[derive(Clone)]
pub struct ScanService {
    scanner: Arc<Mutex<QrScanner>>,
    frames: Arc<watch::Sender<Option<Arc<Frame>>>>,
    state: Arc<watch::Sender<ScannerState>>,
}

impl ScanService {
    /// Must be called inside a tokio runtime: spawns the analysis task.
    pub fn new(
        scanner: QrScanner,
        feedback: Arc<dyn ScanFeedback>,
        handoff: Arc<dyn UrlHandoff>,
    ) -> Self {
        let (state_tx, _) = watch::channel(scanner.state().clone());
        let (frames_tx, frames_rx) = watch::channel(None);
        let service = Self {
            scanner: Arc::new(Mutex::new(scanner)),
            frames: Arc::new(frames_tx),
            state: Arc::new(state_tx),
        };

        tokio::spawn(analysis_loop(
            frames_rx,
            service.scanner.clone(),
            service.state.clone(),
            feedback,
            handoff,
        ));
        service
    }

    fn with_scanner<T>(&self, f: impl FnOnce(&mut QrScanner) -> T) -> T {
        let mut scanner = self.scanner.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut scanner);
        self.state.send_replace(scanner.state().clone());
        out
    }

    pub fn set_permission(&self, permission: CameraPermission) -> ScannerState {
        tracing::info!(?permission, "Camera permission updated");
        self.with_scanner(|s| {
            s.set_permission(permission);
            s.state().clone()
        })
    }

    pub fn start(&self) -> Result<ScannerState> {
        self.with_scanner(|s| s.start().map(|_| s.state().clone()))
    }

    pub fn submit_frame(&self, frame: Frame) -> ScannerState {
        self.frames.send_replace(Some(Arc::new(frame)));
        self.state()
    }

    pub fn state(&self) -> ScannerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerState> {
        self.state.subscribe()
    }
}

async fn analysis_loop(
    mut frames: watch::Receiver<Option<Arc<Frame>>>,
    scanner: Arc<Mutex<QrScanner>>,
    state: Arc<watch::Sender<ScannerState>>,
    feedback: Arc<dyn ScanFeedback>,
    handoff: Arc<dyn UrlHandoff>,
) {
    while frames.changed().await.is_ok() {
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };

        let worker = scanner.clone();
        let analyzed = tokio::task::spawn_blocking(move || {
            let mut scanner = worker.lock().unwrap_or_else(PoisonError::into_inner);
            let outcome = scanner.analyze(&frame);
            (outcome, scanner.state().clone())
        })
        .await;

        let (outcome, current) = match analyzed {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Frame analysis task failed");
                continue;
            }
        };
        state.send_replace(current);

        if let FrameOutcome::Accepted(url) = outcome {
            feedback.confirm(&url);
            if let Err(e) = handoff.hand_off(&url).await {
                tracing::warn!(error = %e, %url, "Check-in link hand-off failed");
            }
            let mut scanner = scanner.lock().unwrap_or_else(PoisonError::into_inner);
            scanner.finish_handoff();
            state.send_replace(scanner.state().clone());
        }
    }
    tracing::debug!("Frame source closed, analysis stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_in_url_policy() {
        assert!(is_valid_check_in_url("https://service.example/clic/login"));
        assert!(is_valid_check_in_url("HTTP://OSC.MMU.EDU.MY/attend"));
        assert!(!is_valid_check_in_url("ftp://service.example/clic"));
        assert!(is_valid_check_in_url("https://192.168.1.5/login"));
        assert!(!is_valid_check_in_url("https://example.com/"));
        assert!(!is_valid_check_in_url(""));
    }

    fn frame(format: FrameFormat) -> Frame {
        Frame {
            format,
            width: 4,
            height: 2,
            row_stride: 6,
            y_plane: vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8],
        }
    }

    #[test]
    fn luminance_map_drops_row_padding() {
        let luma = LuminanceMap::from_frame(&frame(FrameFormat::Yuv420_888)).unwrap();
        assert_eq!(luma.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(LuminanceMap::from_frame(&frame(FrameFormat::Other)).is_none());

        let mut short = frame(FrameFormat::Yuv444_888);
        short.y_plane.truncate(7);
        assert!(LuminanceMap::from_frame(&short).is_none());

        let huge = Frame {
            width: usize::MAX / 2,
            height: usize::MAX / 2,
            row_stride: usize::MAX / 2,
            ..frame(FrameFormat::Yuv420_888)
        };
        assert!(LuminanceMap::from_frame(&huge).is_none());
    }

    #[test]
    fn frame_format_codes() {
        assert_eq!(FrameFormat::from_code(0x23), FrameFormat::Yuv420_888);
        assert_eq!(FrameFormat::from_code(0x27), FrameFormat::Yuv422_888);
        assert_eq!(FrameFormat::from_code(0x28), FrameFormat::Yuv444_888);
        assert_eq!(FrameFormat::from_code(0x100), FrameFormat::Other);
    }

    fn scanning(reader: MockBarcodeReader) -> QrScanner {
        let mut scanner = QrScanner::new(Box::new(reader), CameraPermission::Granted);
        scanner.start().unwrap();
        scanner
    }

    #[test]
    fn unsupported_frames_skip_the_reader() {
        let mut reader = MockBarcodeReader::new();
        reader.expect_decode().times(0);
        reader.expect_reset().times(0);

        let mut scanner = scanning(reader);
        assert_eq!(scanner.analyze(&frame(FrameFormat::Other)), FrameOutcome::UnsupportedFormat);
        assert_eq!(scanner.state(), &ScannerState::Scanning);
    }

    #[test]
    fn reader_is_reset_after_every_attempt() {
        let mut reader = MockBarcodeReader::new();
        let mut seq = mockall::Sequence::new();
        reader.expect_decode()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DecodeError::NotFound));
        reader.expect_decode()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DecodeError::Failed("checksum".into())));
        reader.expect_decode()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("https://example.com/".into()));
        reader.expect_reset().times(3).return_const(());

        let mut scanner = scanning(reader);
        let f = frame(FrameFormat::Yuv420_888);
        assert_eq!(scanner.analyze(&f), FrameOutcome::NoCode);
        assert_eq!(scanner.analyze(&f), FrameOutcome::NoCode);
        assert_eq!(scanner.analyze(&f), FrameOutcome::Rejected("https://example.com/".into()));
        assert_eq!(scanner.state(), &ScannerState::Scanning);
    }

    #[test]
    fn accepted_code_stops_scanning_until_handoff() {
        let mut reader = MockBarcodeReader::new();
        reader.expect_decode()
            .times(1)
            .returning(|_| Ok("  https://osc.mmu.edu.my/clic?id=9 \n".into()));
        reader.expect_reset().return_const(());

        let mut scanner = scanning(reader);
        let f = frame(FrameFormat::Yuv422_888);
        assert_eq!(
            scanner.analyze(&f),
            FrameOutcome::Accepted("https://osc.mmu.edu.my/clic?id=9".into())
        );
        assert_eq!(scanner.analyze(&f), FrameOutcome::NotScanning);

        scanner.finish_handoff();
        assert_eq!(scanner.state(), &ScannerState::Idle);
    }

    #[test]
    fn denied_permission_makes_scanner_unavailable() {
        let mut scanner = QrScanner::new(Box::new(MockBarcodeReader::new()), CameraPermission::Denied);
        assert!(matches!(scanner.state(), ScannerState::Unavailable { .. }));
        assert!(matches!(scanner.start(), Err(Error::Unavailable(_))));

        scanner.set_permission(CameraPermission::Granted);
        assert_eq!(scanner.state(), &ScannerState::Idle);
        scanner.start().unwrap();
        assert_eq!(scanner.state(), &ScannerState::Scanning);
    }

    #[test]
    fn rqrr_reader_finds_nothing_in_a_flat_frame() {
        let luma = LuminanceMap {
            width: 64,
            height: 64,
            data: vec![200; 64 * 64],
        };
        assert_eq!(RqrrReader.decode(&luma), Err(DecodeError::NotFound));
    }

    struct CountingFeedback(Mutex<Vec<String>>);

    impl ScanFeedback for CountingFeedback {
        fn confirm(&self, url: &str) {
            self.0.lock().unwrap().push(url.to_string());
        }
    }

    struct RecordingHandoff(tokio::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl UrlHandoff for RecordingHandoff {
        async fn hand_off(&self, url: &str) -> Result<()> {
            self.0.lock().await.push(url.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn service_hands_off_once_and_returns_to_idle() {
        let mut reader = MockBarcodeReader::new();
        reader.expect_decode()
            .returning(|_| Ok("https://osc.mmu.edu.my/clic?id=1".into()));
        reader.expect_reset().return_const(());

        let feedback = Arc::new(CountingFeedback(Mutex::new(Vec::new())));
        let handoff = Arc::new(RecordingHandoff(tokio::sync::Mutex::new(Vec::new())));
        let service = ScanService::new(
            QrScanner::new(Box::new(reader), CameraPermission::Granted),
            feedback.clone(),
            handoff.clone(),
        );
        let mut states = service.subscribe();

        service.start().unwrap();
        service.submit_frame(frame(FrameFormat::Yuv420_888));
        states.wait_for(|s| *s == ScannerState::Idle).await.unwrap();

        assert_eq!(*handoff.0.lock().await, vec!["https://osc.mmu.edu.my/clic?id=1"]);
        assert_eq!(feedback.0.lock().unwrap().len(), 1);

        // Not scanning any more, so another frame is ignored.
        service.submit_frame(frame(FrameFormat::Yuv420_888));
        tokio::task::yield_now().await;
        assert_eq!(handoff.0.lock().await.len(), 1);
    }
}
