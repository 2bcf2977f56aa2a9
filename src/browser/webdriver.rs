//! Minimal W3C WebDriver client for driving headless Chrome through chromedriver.

use super::{BrowserLauncher, Page};
use crate::config::BrowserConfig;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

const COUNT_SCRIPT: &str = "return document.querySelectorAll(arguments[0]).length;";
const SCROLL_SCRIPT: &str = "window.scrollBy(0, window.innerHeight); return true;";
const SCROLL_INTO_VIEW_SCRIPT: &str = r#"
const el = document.querySelectorAll(arguments[0])[arguments[1]];
if (!el) { return false; }
el.scrollIntoView({ block: 'center' });
return true;
"#;
const CLICK_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.click();
return true;
"#;
const CLICK_TEXT_SCRIPT: &str = r#"
const needle = arguments[1].toLowerCase();
const el = Array.from(document.querySelectorAll(arguments[0]))
  .find(e => (e.textContent || '').toLowerCase().includes(needle));
if (!el) { return false; }
el.click();
return true;
"#;

pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    headless: bool,
    user_agent: String,
}

impl WebDriverLauncher {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.headless,
            user_agent: config.user_agent.clone(),
        })
    }

    fn capabilities(&self) -> Value {
        session_capabilities(self.headless, &self.user_agent)
    }
}

/// New-session payload for Chrome. Hides `navigator.webdriver` through the
/// AutomationControlled blink feature switch.
pub fn session_capabilities(headless: bool, user_agent: &str) -> Value {
    let mut args = vec![
        "--window-size=1366,900".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        format!("--user-agent={user_agent}"),
    ];
    if headless {
        args.insert(0, "--headless=new".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "pageLoadStrategy": "normal",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

/// Pull the WebDriver error out of a failed response body
fn webdriver_error(status: reqwest::StatusCode, body: &Value) -> ScraperError {
    let value = &body["value"];
    let error = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"].as_str().unwrap_or("");
    ScraperError::Browser(format!("WebDriver {status}: {error}: {message}"))
}

async fn send_command(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let mut body: Value = response.json().await?;
    if !status.is_success() {
        return Err(webdriver_error(status, &body));
    }
    Ok(body["value"].take())
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    fn backend_name(&self) -> &'static str {
        "webdriver"
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn launch(&self) -> Result<Box<dyn Page>> {
        let value = send_command(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(self.capabilities()),
        )
        .await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| ScraperError::MissingField("sessionId in new session response".into()))?;
        debug!("Started WebDriver session {}", session_id);
        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

pub struct WebDriverPage {
    client: Client,
    session_url: String,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        send_command(&self.client, method, &format!("{}{}", self.session_url, path), body).await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ScraperError::Browser("current URL is not a string".into()))
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let value = self.execute(COUNT_SCRIPT, json!([selector])).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn scroll_by_viewport(&mut self) -> Result<()> {
        self.execute(SCROLL_SCRIPT, json!([])).await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str, index: usize) -> Result<()> {
        let found = self
            .execute(SCROLL_INTO_VIEW_SCRIPT, json!([selector, index]))
            .await?;
        if found.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(ScraperError::Browser(format!("no element #{index} for '{selector}'")))
        }
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let clicked = self.execute(CLICK_SCRIPT, json!([selector])).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    async fn click_with_text(&mut self, selector: &str, text: &str) -> Result<bool> {
        let clicked = self.execute(CLICK_TEXT_SCRIPT, json!([selector, text])).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    async fn content(&mut self) -> Result<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ScraperError::Browser("page source is not a string".into()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Err(e) = send_command(&self.client, Method::DELETE, &self.session_url, None).await {
            warn!("Failed to delete WebDriver session {}: {}", self.session_url, e);
            return Err(e);
        }
        debug!("Closed WebDriver session {}", self.session_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_request_headless_chrome() {
        let caps = session_capabilities(true, "UA/1.0");
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert_eq!(args[0], "--headless=new");
        assert!(args.iter().any(|a| a == "--user-agent=UA/1.0"));
        assert!(args
            .iter()
            .any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert_eq!(caps["capabilities"]["alwaysMatch"]["browserName"], "chrome");
    }

    #[test]
    fn test_headful_session_omits_headless_flag() {
        let caps = session_capabilities(false, "UA");
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a.as_str().unwrap_or("").starts_with("--headless")));
    }

    #[test]
    fn test_webdriver_error_message() {
        let body = json!({ "value": { "error": "no such window", "message": "window closed" } });
        let err = webdriver_error(reqwest::StatusCode::NOT_FOUND, &body);
        let text = err.to_string();
        assert!(text.contains("no such window"));
        assert!(text.contains("window closed"));
    }
}
