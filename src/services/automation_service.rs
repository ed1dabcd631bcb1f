//! Sequential multi-account login automation.
//!
//! One run takes a snapshot of the active accounts, loads the check-in page
//! once and logs every account in through the same page, strictly one after
//! another. Readiness and settling are fixed delays: the target page offers no
//! signal that a login actually went through, so "submitted" only means the
//! submit control was clicked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::models::user::User;
use crate::services::credential_store::CredentialStore;
use crate::services::login_script::{BridgeMessage, InjectionMode, LoginCommand};
use crate::utils::time::now;

pub const NO_ACTIVE_USERS: &str = "No active users found!";
pub const COMPLETED: &str = "Attendance automation completed!";

/// Page lifecycle of the rendering surface.
#[async_trait]
pub trait WebSurface: Send {
    /// Resolves once the page reports it finished loading.
    async fn load(&mut self, url: &str) -> Result<()>;
    async fn reload(&mut self) -> Result<()>;
    async fn body_text_length(&mut self) -> Result<usize>;
    async fn close(&mut self) -> Result<()>;
}

/// Host side of the page script bridge: send one login command, receive one
/// answer.
#[async_trait]
pub trait ScriptBridge: Send {
    async fn submit(&mut self, command: &LoginCommand) -> Result<BridgeMessage>;
}

pub trait LoginSurface: WebSurface + ScriptBridge {}

impl<T: WebSurface + ScriptBridge> LoginSurface for T {}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self) -> Box<dyn LoginSurface>;
}

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub readiness_delay: Duration,
    pub submit_ack_delay: Duration,
    pub submit_settle_delay: Duration,
    pub failure_settle_delay: Duration,
    pub completion_close_delay: Duration,
    pub field_poll_attempts: u32,
    pub field_poll_interval: Duration,
    pub injection_mode: InjectionMode,
    pub blank_page_min_chars: usize,
    pub blank_page_probe: bool,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            readiness_delay: Duration::from_millis(2000),
            submit_ack_delay: Duration::from_millis(100),
            submit_settle_delay: Duration::from_millis(3000),
            failure_settle_delay: Duration::from_millis(2000),
            completion_close_delay: Duration::from_millis(3000),
            field_poll_attempts: 80,
            field_poll_interval: Duration::from_millis(100),
            injection_mode: InjectionMode::Polling,
            blank_page_min_chars: 20,
            blank_page_probe: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    AwaitingUsers,
    Loading { index: usize },
    WaitingReady { index: usize },
    Injecting { index: usize },
    Submitted { index: usize },
    Failed { index: usize, reason: String },
    LoadFailed { reason: String },
    Done,
    Aborted { reason: String },
}

impl RunState {
    pub fn index(&self) -> Option<usize> {
        match self {
            RunState::Loading { index }
            | RunState::WaitingReady { index }
            | RunState::Injecting { index }
            | RunState::Submitted { index }
            | RunState::Failed { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub message: String,
    pub current_user: Option<String>,
    pub total: usize,
    pub submitted: usize,
    pub failed: usize,
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    fn idle() -> Self {
        Self {
            state: RunState::Idle,
            message: "Idle".to_string(),
            current_user: None,
            total: 0,
            submitted: 0,
            failed: 0,
            updated_at: now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum LoginResult {
    Submitted,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    pub user_id: String,
    pub name: String,
    pub result: LoginResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub transitions: Vec<RunState>,
    pub outcomes: Vec<UserOutcome>,
}

impl RunReport {
    pub fn final_state(&self) -> Option<&RunState> {
        self.transitions.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    Retry,
}

pub struct Sequencer {
    surface: Box<dyn LoginSurface>,
    settings: AutomationSettings,
    url: String,
    users: Vec<User>,
    status: Arc<watch::Sender<RunStatus>>,
    commands: mpsc::Receiver<RunCommand>,
    transitions: Vec<RunState>,
    outcomes: Vec<UserOutcome>,
}

impl Sequencer {
    pub fn new(
        surface: Box<dyn LoginSurface>,
        settings: AutomationSettings,
        url: String,
        users: Vec<User>,
        status: Arc<watch::Sender<RunStatus>>,
        commands: mpsc::Receiver<RunCommand>,
    ) -> Self {
        Self {
            surface,
            settings,
            url,
            users,
            status,
            commands,
            transitions: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub async fn run(mut self) -> RunReport {
        self.enter(RunState::AwaitingUsers, "Loading attendance page...".to_string());

        if self.users.is_empty() {
            self.enter(
                RunState::Aborted {
                    reason: NO_ACTIVE_USERS.to_string(),
                },
                NO_ACTIVE_USERS.to_string(),
            );
            self.close_surface().await;
            return self.into_report();
        }

        for index in 0..self.users.len() {
            self.enter(
                RunState::Loading { index },
                format!("Preparing login for {}", self.users[index].name),
            );

            // Later accounts reuse the page the first one loaded.
            if index == 0 {
                if !self.load_page().await {
                    self.close_surface().await;
                    return self.into_report();
                }
                self.enter(
                    RunState::WaitingReady { index },
                    "Waiting for the page to settle...".to_string(),
                );
                sleep(self.settings.readiness_delay).await;
            }

            self.login(index).await;
        }

        self.enter(RunState::Done, COMPLETED.to_string());
        sleep(self.settings.completion_close_delay).await;
        self.close_surface().await;
        self.into_report()
    }

    async fn login(&mut self, index: usize) {
        let user = self.users[index].clone();
        self.enter(
            RunState::Injecting { index },
            format!("Logging in {}...", user.name),
        );

        let command = LoginCommand {
            user_id: user.user_id.clone(),
            password: user.password.clone(),
            mode: self.settings.injection_mode,
            attempts: self.settings.field_poll_attempts,
            interval: self.settings.field_poll_interval,
        };

        let message = match self.surface.submit(&command).await {
            Ok(message) => message,
            Err(e) => BridgeMessage::Failed(e.to_string()),
        };

        match message {
            BridgeMessage::Submitted => {
                sleep(self.settings.submit_ack_delay).await;
                self.outcomes.push(UserOutcome {
                    user_id: user.user_id.clone(),
                    name: user.name.clone(),
                    result: LoginResult::Submitted,
                });
                self.enter(
                    RunState::Submitted { index },
                    format!("Login submitted for {}. Processing...", user.name),
                );
                sleep(self.settings.submit_settle_delay).await;
            }
            BridgeMessage::Failed(reason) => {
                tracing::warn!(index, user = %user.user_id, %reason, "Login injection failed");
                self.outcomes.push(UserOutcome {
                    user_id: user.user_id.clone(),
                    name: user.name.clone(),
                    result: LoginResult::Failed(reason.clone()),
                });
                let message = format!("Login failed for {}: {}. Moving to next...", user.name, reason);
                self.enter(RunState::Failed { index, reason }, message);
                sleep(self.settings.failure_settle_delay).await;
            }
        }
    }

    /// Loads the target page, retrying a blank render once by itself and any
    /// other failure only on a manual retry. Returns false when the run ends.
    async fn load_page(&mut self) -> bool {
        let url = self.url.clone();
        let mut outcome = self.surface.load(&url).await;

        loop {
            let error = match self.check_loaded(outcome).await {
                Ok(()) => return true,
                Err(e) => e,
            };

            tracing::error!(error = %error, url = %url, "Attendance page failed to load");
            // Only a retry requested after this failure counts.
            while self.commands.try_recv().is_ok() {}
            self.enter(
                RunState::LoadFailed {
                    reason: error.to_string(),
                },
                format!("Failed to load attendance page: {}", error),
            );

            match self.commands.recv().await {
                Some(RunCommand::Retry) => {
                    tracing::info!(url = %url, "Manual retry requested");
                    self.enter(
                        RunState::Loading { index: 0 },
                        "Retrying attendance page...".to_string(),
                    );
                    outcome = self.surface.load(&url).await;
                }
                None => {
                    self.enter(
                        RunState::Aborted {
                            reason: "Automation was cancelled".to_string(),
                        },
                        "Automation was cancelled".to_string(),
                    );
                    return false;
                }
            }
        }
    }

    async fn check_loaded(&mut self, outcome: Result<()>) -> Result<()> {
        outcome?;
        if !self.settings.blank_page_probe {
            return Ok(());
        }

        let length = self.surface.body_text_length().await?;
        if length >= self.settings.blank_page_min_chars {
            return Ok(());
        }

        tracing::warn!(length, "Page body looks blank, reloading once");
        self.surface.reload().await?;
        let length = self.surface.body_text_length().await?;
        if length >= self.settings.blank_page_min_chars {
            return Ok(());
        }
        Err(Error::PageLoad(format!(
            "page is still blank after reload ({} characters)",
            length
        )))
    }

    async fn close_surface(&mut self) {
        if let Err(e) = self.surface.close().await {
            tracing::warn!(error = %e, "Failed to close web surface");
        }
    }

    fn enter(&mut self, state: RunState, message: String) {
        tracing::info!(state = ?state, %message, "Automation state changed");

        let current_user = state
            .index()
            .and_then(|i| self.users.get(i))
            .map(|u| u.name.clone());
        let submitted = self
            .outcomes
            .iter()
            .filter(|o| o.result == LoginResult::Submitted)
            .count();
        let status = RunStatus {
            state: state.clone(),
            message,
            current_user,
            total: self.users.len(),
            submitted,
            failed: self.outcomes.len() - submitted,
            updated_at: now(),
        };
        self.status.send_replace(status);
        self.transitions.push(state);
    }

    fn into_report(self) -> RunReport {
        RunReport {
            transitions: self.transitions,
            outcomes: self.outcomes,
        }
    }
}

struct ActiveRun {
    handle: JoinHandle<()>,
    commands: mpsc::Sender<RunCommand>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns the single automation run the process allows at a time.
#[derive(Clone)]
pub struct AutomationService {
    store: CredentialStore,
    settings: AutomationSettings,
    factory: Arc<dyn SurfaceFactory>,
    status: Arc<watch::Sender<RunStatus>>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    last_report: Arc<Mutex<Option<RunReport>>>,
}

impl AutomationService {
    pub fn new(
        store: CredentialStore,
        settings: AutomationSettings,
        factory: Arc<dyn SurfaceFactory>,
    ) -> Self {
        let (status, _) = watch::channel(RunStatus::idle());
        Self {
            store,
            settings,
            factory,
            status: Arc::new(status),
            active: Arc::new(Mutex::new(None)),
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts a run against `url` for the accounts active right now.
    pub async fn launch(&self, url: &str) -> Result<RunStatus> {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(Error::BadRequest(format!("Unsupported check-in link: {}", url)));
        }

        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            if !run.handle.is_finished() {
                return Err(Error::Conflict("An automation run is already in progress".to_string()));
            }
        }

        let users = self.store.active_users().await?;
        tracing::info!(url = %url, users = users.len(), "Starting attendance automation");

        let (commands_tx, commands_rx) = mpsc::channel(1);
        let sequencer = Sequencer::new(
            self.factory.create(),
            self.settings.clone(),
            url.to_string(),
            users,
            self.status.clone(),
            commands_rx,
        );

        let last_report = self.last_report.clone();
        let handle = tokio::spawn(async move {
            let report = sequencer.run().await;
            tracing::info!(
                outcomes = report.outcomes.len(),
                final_state = ?report.final_state(),
                "Attendance automation finished"
            );
            *last_report.lock().await = Some(report);
        });

        *active = Some(ActiveRun {
            handle,
            commands: commands_tx,
        });
        Ok(self.status())
    }

    /// Manual retry after the page failed to load.
    pub async fn retry(&self) -> Result<()> {
        if !matches!(self.status.borrow().state, RunState::LoadFailed { .. }) {
            return Err(Error::Conflict("Nothing to retry".to_string()));
        }
        let active = self.active.lock().await;
        let run = active
            .as_ref()
            .ok_or_else(|| Error::Conflict("Nothing to retry".to_string()))?;
        run.commands.try_send(RunCommand::Retry).map_err(|e| match e {
            TrySendError::Full(_) => Error::Conflict("A retry is already pending".to_string()),
            TrySendError::Closed(_) => {
                Error::Conflict("The automation run has already ended".to_string())
            }
        })
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.lock().await.clone()
    }
}
