pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::prefs::PrefsStore;
use crate::error::Result;
use crate::services::{
    automation_service::{AutomationService, AutomationSettings, SurfaceFactory},
    credential_store::{CredentialStore, StoreSettings},
    qr_service::{BarcodeReader, CameraPermission, QrScanner, RqrrReader, ScanService, TerminalFeedback},
    webdriver::WebDriverFactory,
};
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub credential_store: CredentialStore,
    pub automation_service: AutomationService,
    pub scan_service: ScanService,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        let prefs = PrefsStore::open(&config.data_dir).await?;
        let credential_store = CredentialStore::open(
            prefs,
            StoreSettings {
                encryption: config.store_encryption,
            },
        )
        .await?;
        let factory = WebDriverFactory::new(http_client, config.webdriver_url.clone());

        Ok(Self::from_parts(
            credential_store,
            config.automation_settings(),
            Arc::new(factory),
            Box::new(RqrrReader),
            config.camera_permission,
        ))
    }

    /// Wires the services around caller-supplied collaborators. Spawns the
    /// frame analysis task, so it needs a running tokio runtime.
    pub fn from_parts(
        credential_store: CredentialStore,
        settings: AutomationSettings,
        factory: Arc<dyn SurfaceFactory>,
        reader: Box<dyn BarcodeReader>,
        permission: CameraPermission,
    ) -> Self {
        let automation_service = AutomationService::new(credential_store.clone(), settings, factory);
        let scan_service = ScanService::new(
            QrScanner::new(reader, permission),
            Arc::new(TerminalFeedback),
            Arc::new(automation_service.clone()),
        );

        Self {
            credential_store,
            automation_service,
            scan_service,
        }
    }
}
