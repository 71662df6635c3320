//! Headless browser session

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, SetBypassCspParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
    RemoteObjectSubtype,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bridge::{BridgeSender, ConsoleLevel, ConsoleLine};
use crate::config::BrowserSettings;

/// One browser process with the single page the run uses
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    tasks: Vec<JoinHandle<()>>,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page
    pub async fn launch(executable: &Path, settings: &BrowserSettings) -> Result<Self> {
        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .args(settings.args.iter().map(String::as_str))
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .with_context(|| format!("Failed to launch {}", executable.display()))?;

        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            tasks: vec![driver],
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Disable CSP and register `script` to run before any page script
    pub async fn inject(&self, script: String) -> Result<()> {
        self.page.execute(SetBypassCspParams::new(true)).await?;
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await?;
        Ok(())
    }

    /// Relay console calls and uncaught exceptions into the bridge
    pub async fn relay_console(&mut self, bridge: BridgeSender) -> Result<()> {
        let mut console = self.page.event_listener::<EventConsoleApiCalled>().await?;
        let mut exceptions = self.page.event_listener::<EventExceptionThrown>().await?;

        let console_bridge = bridge.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                console_bridge.send(console_line(&event));
            }
        }));

        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                bridge.send(exception_line(&event));
            }
        }));

        Ok(())
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    /// Close the browser and stop the relay tasks
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("browser wait failed: {}", e);
        }
        for task in self.tasks {
            task.abort();
        }
    }
}

fn console_level(kind: &ConsoleApiCalledType) -> ConsoleLevel {
    match kind {
        ConsoleApiCalledType::Log => ConsoleLevel::Log,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
        _ => ConsoleLevel::Other,
    }
}

/// JSON value of one console argument. Errors become their message with
/// stack; objects without a by-value form fall back to their description.
fn remote_value(object: &RemoteObject) -> Value {
    if matches!(object.subtype, Some(RemoteObjectSubtype::Error)) {
        if let Some(description) = &object.description {
            return Value::String(description.clone());
        }
    }

    if let Some(value) = &object.value {
        return value.clone();
    }

    if let Some(unserializable) = &object.unserializable_value {
        return Value::String(unserializable.inner().clone());
    }

    object
        .description
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn console_line(event: &EventConsoleApiCalled) -> ConsoleLine {
    ConsoleLine::new(
        console_level(&event.r#type),
        event.args.iter().map(remote_value).collect(),
    )
}

fn exception_line(event: &EventExceptionThrown) -> ConsoleLine {
    let details = &event.exception_details;
    let text = details
        .exception
        .as_ref()
        .and_then(|e| e.description.clone())
        .unwrap_or_else(|| details.text.clone());

    ConsoleLine::new(ConsoleLevel::Error, vec![Value::String(text)])
}
