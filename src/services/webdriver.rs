//! Rendering surface backed by a W3C WebDriver endpoint (chromedriver,
//! geckodriver, selenium).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::services::automation_service::{LoginSurface, ScriptBridge, SurfaceFactory, WebSurface};
use crate::services::login_script::{self, BridgeMessage, LoginCommand, ScriptReport};

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const BODY_LENGTH_SCRIPT: &str =
    "return document.body ? (document.body.innerText || '').trim().length : 0;";

// Navigation Timing level 2; browsers without `responseStatus` report 0.
const RESPONSE_STATUS_SCRIPT: &str = "var e = (performance.getEntriesByType && performance.getEntriesByType('navigation')[0]) || {}; return e.responseStatus || 0;";

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

pub struct WebDriverSurface {
    client: Client,
    base_url: url::Url,
    session_id: Option<String>,
}

impl WebDriverSurface {
    pub fn new(client: Client, base_url: url::Url) -> Self {
        Self {
            client,
            base_url,
            session_id: None,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn send(&self, method: Method, path: &str, body: Option<JsonValue>) -> Result<JsonValue> {
        let mut request = self.client.request(method, self.endpoint(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let payload: JsonValue = response.json().await?;
        let value = payload.get("value").cloned().unwrap_or(JsonValue::Null);

        if !status.is_success() {
            let wire: WireError = serde_json::from_value(value).unwrap_or(WireError {
                error: format!("HTTP {}", status.as_u16()),
                message: String::new(),
            });
            return Err(Error::WebDriver(format!("{}: {}", wire.error, wire.message)));
        }
        Ok(value)
    }

    async fn session(&mut self) -> Result<String> {
        if let Some(id) = &self.session_id {
            return Ok(id.clone());
        }

        let value = self
            .send(
                Method::POST,
                "session",
                Some(json!({
                    "capabilities": {
                        "alwaysMatch": { "pageLoadStrategy": "normal" }
                    }
                })),
            )
            .await?;
        let id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::WebDriver("new session response has no sessionId".to_string()))?
            .to_string();

        self.send(
            Method::POST,
            &format!("session/{}/timeouts", id),
            Some(json!({ "pageLoad": PAGE_LOAD_TIMEOUT.as_millis() as u64 })),
        )
        .await?;

        tracing::info!(session = %id, "WebDriver session created");
        self.session_id = Some(id.clone());
        Ok(id)
    }

    async fn execute(&mut self, script: &str) -> Result<JsonValue> {
        let id = self.session().await?;
        self.send(
            Method::POST,
            &format!("session/{}/execute/sync", id),
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn ensure_http_ok(&mut self) -> Result<()> {
        let status = self.execute(RESPONSE_STATUS_SCRIPT).await?.as_u64().unwrap_or(0);
        if status >= 400 {
            return Err(Error::PageLoad(format!("HTTP {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl WebSurface for WebDriverSurface {
    async fn load(&mut self, url: &str) -> Result<()> {
        let id = self.session().await?;
        self.send(
            Method::POST,
            &format!("session/{}/url", id),
            Some(json!({ "url": url })),
        )
        .await
        .map_err(|e| Error::PageLoad(e.to_string()))?;
        self.ensure_http_ok().await
    }

    async fn reload(&mut self) -> Result<()> {
        let id = self.session().await?;
        self.send(Method::POST, &format!("session/{}/refresh", id), Some(json!({})))
            .await
            .map_err(|e| Error::PageLoad(e.to_string()))?;
        self.ensure_http_ok().await
    }

    async fn body_text_length(&mut self) -> Result<usize> {
        Ok(self.execute(BODY_LENGTH_SCRIPT).await?.as_u64().unwrap_or(0) as usize)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(id) = self.session_id.take() {
            self.send(Method::DELETE, &format!("session/{}", id), None).await?;
            tracing::info!(session = %id, "WebDriver session closed");
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptBridge for WebDriverSurface {
    async fn submit(&mut self, command: &LoginCommand) -> Result<BridgeMessage> {
        let id = self.session().await?;
        let budget = command.budget() + Duration::from_secs(2);
        self.send(
            Method::POST,
            &format!("session/{}/timeouts", id),
            Some(json!({ "script": budget.as_millis() as u64 })),
        )
        .await?;

        let value = self
            .send(
                Method::POST,
                &format!("session/{}/execute/async", id),
                Some(json!({ "script": login_script::render(command), "args": [] })),
            )
            .await?;
        let report: ScriptReport = serde_json::from_value(value)
            .map_err(|e| Error::WebDriver(format!("malformed login script report: {}", e)))?;
        Ok(report.into_message())
    }
}

pub struct WebDriverFactory {
    client: Client,
    base_url: url::Url,
}

impl WebDriverFactory {
    pub fn new(client: Client, base_url: url::Url) -> Self {
        Self { client, base_url }
    }
}

impl SurfaceFactory for WebDriverFactory {
    fn create(&self) -> Box<dyn LoginSurface> {
        Box::new(WebDriverSurface::new(self.client.clone(), self.base_url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::login_script::InjectionMode;
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::{delete, post},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Driver {
        calls: Arc<Mutex<Vec<String>>>,
        page_status: Arc<Mutex<u64>>,
        body_length: Arc<Mutex<u64>>,
    }

    impl Driver {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    async fn new_session(State(d): State<Driver>) -> Json<JsonValue> {
        d.record("session".into());
        Json(json!({ "value": { "sessionId": "s1", "capabilities": {} } }))
    }

    async fn timeouts(State(d): State<Driver>, Path(id): Path<String>) -> Json<JsonValue> {
        d.record(format!("timeouts:{}", id));
        Json(json!({ "value": null }))
    }

    async fn navigate(
        State(d): State<Driver>,
        Json(body): Json<JsonValue>,
    ) -> (StatusCode, Json<JsonValue>) {
        let url = body["url"].as_str().unwrap_or_default().to_string();
        d.record(format!("url:{}", url));
        if url.contains("unreachable") {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "value": { "error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED" } })),
            );
        }
        (StatusCode::OK, Json(json!({ "value": null })))
    }

    async fn execute_sync(State(d): State<Driver>, Json(body): Json<JsonValue>) -> Json<JsonValue> {
        let script = body["script"].as_str().unwrap_or_default();
        if script.contains("responseStatus") {
            return Json(json!({ "value": *d.page_status.lock().unwrap() }));
        }
        d.record("body_length".into());
        Json(json!({ "value": *d.body_length.lock().unwrap() }))
    }

    async fn execute_async(State(d): State<Driver>, Json(body): Json<JsonValue>) -> Json<JsonValue> {
        let script = body["script"].as_str().unwrap_or_default();
        d.record("execute_async".into());
        if script.contains("\"garbled-report\"") {
            return Json(json!({ "value": "not a report" }));
        }
        if script.contains("\"no-such-form\"") {
            return Json(json!({ "value": { "discovery": "timeout", "submitted": false, "reason": "Login fields not found after 80 attempts" } }));
        }
        Json(json!({ "value": { "discovery": "found", "submitted": true } }))
    }

    async fn delete_session(State(d): State<Driver>, Path(id): Path<String>) -> Json<JsonValue> {
        d.record(format!("delete:{}", id));
        Json(json!({ "value": null }))
    }

    async fn spawn_driver(driver: Driver) -> url::Url {
        let app = Router::new()
            .route("/session", post(new_session))
            .route("/session/:id/timeouts", post(timeouts))
            .route("/session/:id/url", post(navigate))
            .route("/session/:id/refresh", post(timeouts))
            .route("/session/:id/execute/sync", post(execute_sync))
            .route("/session/:id/execute/async", post(execute_async))
            .route("/session/:id", delete(delete_session))
            .with_state(driver);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        url::Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn command(user_id: &str) -> LoginCommand {
        LoginCommand {
            user_id: user_id.into(),
            password: "pass1234".into(),
            mode: InjectionMode::Polling,
            attempts: 80,
            interval: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn drives_a_full_login_over_the_wire() {
        let driver = Driver::default();
        *driver.body_length.lock().unwrap() = 300;
        let base = spawn_driver(driver.clone()).await;
        let mut surface = WebDriverSurface::new(Client::new(), base);

        surface.load("https://osc.mmu.edu.my/clic").await.unwrap();
        assert_eq!(surface.body_text_length().await.unwrap(), 300);
        assert_eq!(surface.submit(&command("1211100001")).await.unwrap(), BridgeMessage::Submitted);
        assert!(matches!(
            surface.submit(&command("no-such-form")).await.unwrap(),
            BridgeMessage::Failed(reason) if reason.contains("80 attempts")
        ));
        assert!(matches!(
            surface.submit(&command("garbled-report")).await,
            Err(Error::WebDriver(msg)) if msg.contains("malformed login script report")
        ));
        surface.close().await.unwrap();
        surface.close().await.unwrap();

        let calls = driver.calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| *c == "session").count(), 1);
        assert!(calls.contains(&"url:https://osc.mmu.edu.my/clic".to_string()));
        assert_eq!(calls.iter().filter(|c| *c == "delete:s1").count(), 1);
    }

    #[tokio::test]
    async fn navigation_and_http_errors_are_page_load_failures() {
        let driver = Driver::default();
        let base = spawn_driver(driver.clone()).await;
        let mut surface = WebDriverSurface::new(Client::new(), base);

        assert!(matches!(
            surface.load("https://unreachable.example/clic").await,
            Err(Error::PageLoad(msg)) if msg.contains("ERR_NAME_NOT_RESOLVED")
        ));

        *driver.page_status.lock().unwrap() = 503;
        assert!(matches!(
            surface.load("https://osc.mmu.edu.my/clic").await,
            Err(Error::PageLoad(msg)) if msg == "HTTP 503"
        ));
    }
}
