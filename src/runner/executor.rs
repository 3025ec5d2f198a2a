//! Step execution
//!
//! [`execute_step`] dispatches on [`StepKind`] to one handler per kind. Each
//! handler checks the fields its kind needs, performs one browser action and
//! maps any failure into a [`StepError`].

use std::path::Path;
use std::time::Duration;

use crate::driver::traits::{BrowserSession, UrlMatch};
use crate::error::StepError;
use crate::parser::types::{Step, StepKind, WaitState};
use crate::utils::config::RunConfig;

/// Total fill attempts inside an iframe
pub const IFRAME_FILL_ATTEMPTS: u32 = 3;

/// Pause between iframe fill attempts
pub const IFRAME_RETRY_DELAY: Duration = Duration::from_millis(500);

type StepOutcome = Result<(), StepError>;

/// Execute a single step against the session
pub async fn execute_step(
    session: &dyn BrowserSession,
    step: &Step,
    config: &RunConfig,
) -> StepOutcome {
    log::debug!("Executing {} step", step.kind);

    match &step.kind {
        StepKind::Goto => goto(session, step, config).await,
        StepKind::Fill => fill(session, step).await,
        StepKind::Click => click(session, step).await,
        StepKind::WaitForUrl => wait_for_url(session, step).await,
        StepKind::WaitForSelector => wait_for_selector(session, step).await,
        StepKind::WaitForText => wait_for_text(session, step).await,
        StepKind::Wait => wait(session, step).await,
        StepKind::IframeFill => iframe_fill(session, step).await,
        StepKind::AssertText => assert_text(session, step).await,
        StepKind::AssertUrl => assert_url(session, step).await,
        StepKind::Screenshot => screenshot(session, step).await,
        StepKind::Unknown(tag) => Err(StepError::UnknownStep(tag.clone())),
    }
}

fn require<'a>(
    value: &'a Option<String>,
    step: &'static str,
    field: &'static str,
) -> Result<&'a str, StepError> {
    value
        .as_deref()
        .ok_or(StepError::MissingField { step, field })
}

/// `contains` wins over `equals` when both are given
fn url_predicate(step: &Step, name: &'static str) -> Result<UrlMatch, StepError> {
    if let Some(ref part) = step.contains {
        Ok(UrlMatch::Contains(part.clone()))
    } else if let Some(ref exact) = step.equals {
        Ok(UrlMatch::Equals(exact.clone()))
    } else {
        Err(StepError::MissingField {
            step: name,
            field: "contains or equals",
        })
    }
}

async fn goto(session: &dyn BrowserSession, step: &Step, config: &RunConfig) -> StepOutcome {
    let url = match (&step.url, &step.path) {
        (Some(url), _) => url.clone(),
        (None, Some(path)) => format!("{}{}", config.base_url, path),
        (None, None) => {
            return Err(StepError::MissingField {
                step: "goto",
                field: "url or path",
            })
        }
    };
    session.goto(&url).await?;
    Ok(())
}

async fn fill(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let selector = require(&step.selector, "fill", "selector")?;
    let value = require(&step.value, "fill", "value")?;
    session.fill(selector, value).await?;
    Ok(())
}

async fn click(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    if let Some(ref selector) = step.selector {
        session.click(selector).await?;
    } else if let Some(ref text) = step.text {
        session.click_text(text).await?;
    } else {
        return Err(StepError::MissingField {
            step: "click",
            field: "selector or text",
        });
    }
    Ok(())
}

async fn wait_for_url(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let expected = url_predicate(step, "wait-for-url")?;
    session.wait_for_url(&expected).await?;
    Ok(())
}

async fn wait_for_selector(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let selector = require(&step.selector, "wait-for-selector", "selector")?;
    let state = match step.state.as_deref() {
        None => WaitState::default(),
        Some(raw) => WaitState::parse(raw).ok_or_else(|| StepError::InvalidField {
            step: "wait-for-selector",
            field: "state",
            value: raw.to_string(),
        })?,
    };
    session.wait_for_selector(selector, state).await?;
    Ok(())
}

async fn wait_for_text(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let selector = require(&step.selector, "wait-for-text", "selector")?;
    let text = require(&step.text, "wait-for-text", "text")?;
    session.wait_for_text(selector, text).await?;
    Ok(())
}

async fn wait(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let ms = step.ms.ok_or(StepError::MissingField {
        step: "wait",
        field: "ms",
    })?;
    session.pause(Duration::from_millis(ms)).await;
    Ok(())
}

/// Fill an input inside an iframe.
///
/// Embedded fields (payment widgets and the like) can be attached before
/// they accept input, so the fill is attempted [`IFRAME_FILL_ATTEMPTS`]
/// times with [`IFRAME_RETRY_DELAY`] between attempts. A frame without
/// accessible content fails at once.
async fn iframe_fill(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let iframe_selector = require(&step.iframe_selector, "iframe-fill", "iframeSelector")?;
    let selector = require(&step.selector, "iframe-fill", "selector")?;
    let value = require(&step.value, "iframe-fill", "value")?;

    let frame = session
        .frame(iframe_selector)
        .await?
        .ok_or_else(|| StepError::FrameUnavailable {
            iframe_selector: iframe_selector.to_string(),
        })?;

    let mut attempt = 1;
    loop {
        match frame.fill(selector, value).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= IFRAME_FILL_ATTEMPTS => return Err(e.into()),
            Err(e) => {
                log::debug!(
                    "iframe-fill attempt {}/{} failed: {}",
                    attempt,
                    IFRAME_FILL_ATTEMPTS,
                    e
                );
                session.pause(IFRAME_RETRY_DELAY).await;
                attempt += 1;
            }
        }
    }
}

async fn assert_text(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let selector = require(&step.selector, "assert-text", "selector")?;
    let expected = require(&step.text, "assert-text", "text")?;

    let actual = session.text_content(selector).await?;
    match actual {
        Some(ref text) if text.contains(expected) => Ok(()),
        _ => Err(StepError::TextMismatch {
            selector: selector.to_string(),
            expected: expected.to_string(),
            actual,
        }),
    }
}

async fn assert_url(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let mut predicates = Vec::new();
    if let Some(ref part) = step.contains {
        predicates.push(UrlMatch::Contains(part.clone()));
    }
    if let Some(ref exact) = step.equals {
        predicates.push(UrlMatch::Equals(exact.clone()));
    }
    if predicates.is_empty() {
        return Err(StepError::MissingField {
            step: "assert-url",
            field: "contains or equals",
        });
    }

    let current = session.current_url().await?;
    match predicates.into_iter().find(|p| !p.matches(&current)) {
        Some(expected) => Err(StepError::UrlMismatch {
            expected,
            actual: current,
        }),
        None => Ok(()),
    }
}

async fn screenshot(session: &dyn BrowserSession, step: &Step) -> StepOutcome {
    let path = Path::new(require(&step.path, "screenshot", "path")?);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StepError::Filesystem {
            path: parent.display().to_string(),
            message: e.to_string(),
        })?;
    }
    session.screenshot(path).await?;
    Ok(())
}

fn or_missing(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("?")
}

fn url_detail(step: &Step) -> String {
    match (&step.contains, &step.equals) {
        (Some(part), _) => format!("contains \"{}\"", part),
        (None, eq) => format!("equals \"{}\"", or_missing(eq)),
    }
}

/// One-line progress description of a step (`index` is 0-based)
pub fn format_step(step: &Step, index: usize) -> String {
    let num = index + 1;
    let kind = step.kind.as_str();
    let detail = match step.kind {
        StepKind::Goto => step
            .path
            .as_deref()
            .or(step.url.as_deref())
            .unwrap_or("?")
            .to_string(),
        StepKind::Fill
        | StepKind::WaitForSelector
        | StepKind::IframeFill
        | StepKind::AssertText => or_missing(&step.selector).to_string(),
        StepKind::Click => match step.selector {
            Some(ref selector) => selector.clone(),
            None => format!("text=\"{}\"", or_missing(&step.text)),
        },
        StepKind::WaitForUrl | StepKind::AssertUrl => url_detail(step),
        StepKind::WaitForText => format!("\"{}\"", or_missing(&step.text)),
        StepKind::Wait => format!("{}ms", step.ms.map_or("?".to_string(), |ms| ms.to_string())),
        StepKind::Screenshot => or_missing(&step.path).to_string(),
        StepKind::Unknown(_) => String::new(),
    };

    if detail.is_empty() {
        format!("STEP {}: {}", num, kind)
    } else {
        format!("STEP {}: {} {}", num, kind, detail)
    }
}
