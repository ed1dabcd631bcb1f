//! Page-side half of the login bridge.
//!
//! The rendered script runs as an asynchronous WebDriver script: it receives a
//! completion callback as its last argument and reports exactly one
//! [`ScriptReport`] through it.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionMode {
    /// Re-query the form until all controls show up or attempts run out.
    #[default]
    Polling,
    /// Look once, 500 ms after injection.
    Single,
}

impl FromStr for InjectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "polling" => Ok(Self::Polling),
            "single" => Ok(Self::Single),
            other => Err(format!("unknown injection mode '{}'", other)),
        }
    }
}

/// Credentials plus the discovery budget for one injection.
#[derive(Debug, Clone)]
pub struct LoginCommand {
    pub user_id: String,
    pub password: String,
    pub mode: InjectionMode,
    pub attempts: u32,
    pub interval: Duration,
}

impl LoginCommand {
    /// Upper bound on how long the page may take to answer.
    pub fn budget(&self) -> Duration {
        match self.mode {
            InjectionMode::Polling => self.interval * self.attempts + Duration::from_millis(500),
            InjectionMode::Single => Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDiscovery {
    Found,
    NotFound,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// The submit control was clicked. Nothing more is known about the outcome.
    Submitted,
    Failed(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptReport {
    pub discovery: FieldDiscovery,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ScriptReport {
    pub fn into_message(self) -> BridgeMessage {
        match (self.discovery, self.submitted) {
            (FieldDiscovery::Found, true) => BridgeMessage::Submitted,
            (FieldDiscovery::Found, false) => BridgeMessage::Failed(
                self.reason
                    .unwrap_or_else(|| "Submit button not found".to_string()),
            ),
            (FieldDiscovery::NotFound, _) => BridgeMessage::Failed(
                self.reason
                    .unwrap_or_else(|| "Login fields not found".to_string()),
            ),
            (FieldDiscovery::Timeout, _) => BridgeMessage::Failed(
                self.reason
                    .unwrap_or_else(|| "Timed out waiting for login fields".to_string()),
            ),
        }
    }
}

const FIND_CONTROLS: &str = r#"
function findControls() {
  return {
    user: document.querySelector('input[type="text"], input[name*="user"], input[id*="user"], input[placeholder*="User"]'),
    pass: document.querySelector('input[type="password"]'),
    submit: document.querySelector('input[type="submit"], button[type="submit"], input[value*="Sign"], button')
  };
}
function setValue(field, value) {
  field.value = value;
  field.dispatchEvent(new Event('input', { bubbles: true }));
  field.dispatchEvent(new Event('change', { bubbles: true }));
}
"#;

const POLLING_BODY: &str = r#"
var attempt = 0;
function poll() {
  attempt += 1;
  var c = findControls();
  if (c.user && c.pass && c.submit) {
    setValue(c.user, '');
    setValue(c.pass, '');
    setValue(c.user, loginUser);
    setValue(c.pass, loginPass);
    c.submit.click();
    done({ discovery: 'found', submitted: true });
    return;
  }
  if (attempt >= __ATTEMPTS__) {
    if (c.user && c.pass) {
      done({ discovery: 'found', submitted: false, reason: 'Submit button not found' });
    } else {
      done({ discovery: 'timeout', submitted: false, reason: 'Login fields not found after ' + attempt + ' attempts' });
    }
    return;
  }
  setTimeout(poll, __INTERVAL__);
}
poll();
"#;

const SINGLE_BODY: &str = r#"
setTimeout(function () {
  var c = findControls();
  if (!(c.user && c.pass)) {
    done({ discovery: 'not_found', submitted: false, reason: 'Login fields not found' });
    return;
  }
  setValue(c.user, '');
  setValue(c.pass, '');
  setValue(c.user, loginUser);
  setValue(c.pass, loginPass);
  if (c.submit) {
    c.submit.click();
    done({ discovery: 'found', submitted: true });
  } else {
    done({ discovery: 'found', submitted: false, reason: 'Submit button not found' });
  }
}, 500);
"#;

/// Renders the script for `command`. Credentials are embedded as JSON string
/// literals and can't terminate the surrounding code.
pub fn render(command: &LoginCommand) -> String {
    let user = js_string(&command.user_id);
    let pass = js_string(&command.password);

    let body = match command.mode {
        InjectionMode::Polling => POLLING_BODY
            .replace("__ATTEMPTS__", &command.attempts.max(1).to_string())
            .replace("__INTERVAL__", &command.interval.as_millis().to_string()),
        InjectionMode::Single => SINGLE_BODY.to_string(),
    };

    format!(
        "var done = arguments[arguments.length - 1];\nvar loginUser = {};\nvar loginPass = {};\n{}{}",
        user, pass, FIND_CONTROLS, body
    )
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(mode: InjectionMode) -> LoginCommand {
        LoginCommand {
            user_id: "1211100001".into(),
            password: "it's \"quoted\"".into(),
            mode,
            attempts: 80,
            interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn polling_script_carries_budget_and_escaped_credentials() {
        let script = render(&command(InjectionMode::Polling));
        assert!(script.contains("attempt >= 80"));
        assert!(script.contains("setTimeout(poll, 100)"));
        assert!(script.contains(r#""it's \"quoted\"""#));
        assert!(!script.contains("__"));
    }

    #[test]
    fn single_script_waits_half_a_second() {
        let script = render(&command(InjectionMode::Single));
        assert!(script.contains("}, 500);"));
        assert!(!script.contains("poll()"));
        assert!(!script.contains("__"));
    }

    #[test]
    fn reports_map_to_bridge_messages() {
        let parse = |v: serde_json::Value| serde_json::from_value::<ScriptReport>(v).unwrap().into_message();

        assert_eq!(
            parse(serde_json::json!({"discovery": "found", "submitted": true})),
            BridgeMessage::Submitted
        );
        assert_eq!(
            parse(serde_json::json!({"discovery": "found", "submitted": false})),
            BridgeMessage::Failed("Submit button not found".into())
        );
        assert_eq!(
            parse(serde_json::json!({"discovery": "not_found"})),
            BridgeMessage::Failed("Login fields not found".into())
        );
        assert!(matches!(
            parse(serde_json::json!({"discovery": "timeout", "reason": "Login fields not found after 80 attempts"})),
            BridgeMessage::Failed(reason) if reason.contains("80 attempts")
        ));
    }

    #[test]
    fn injection_mode_parses_case_insensitively() {
        assert_eq!("Polling".parse::<InjectionMode>().unwrap(), InjectionMode::Polling);
        assert_eq!("single".parse::<InjectionMode>().unwrap(), InjectionMode::Single);
        assert!("burst".parse::<InjectionMode>().is_err());
    }
}
