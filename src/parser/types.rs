use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::utils::config::FlowConfig;

/// Represents a parsed flow from YAML or JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub config: Option<FlowConfig>,

    pub steps: Vec<Step>,
}

impl Flow {
    /// Name used in progress output and reports, falling back to the file it came from.
    pub fn label(&self, source: &str) -> String {
        self.name.clone().unwrap_or_else(|| source.to_string())
    }
}

/// Step discriminator, read from the `type` key.
///
/// Unrecognized tags are kept as [`StepKind::Unknown`] so they fail when
/// executed instead of when the flow is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Goto,
    Fill,
    Click,
    WaitForUrl,
    WaitForSelector,
    WaitForText,
    Wait,
    IframeFill,
    AssertText,
    AssertUrl,
    Screenshot,
    Unknown(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Goto => "goto",
            StepKind::Fill => "fill",
            StepKind::Click => "click",
            StepKind::WaitForUrl => "wait-for-url",
            StepKind::WaitForSelector => "wait-for-selector",
            StepKind::WaitForText => "wait-for-text",
            StepKind::Wait => "wait",
            StepKind::IframeFill => "iframe-fill",
            StepKind::AssertText => "assert-text",
            StepKind::AssertUrl => "assert-url",
            StepKind::Screenshot => "screenshot",
            StepKind::Unknown(tag) => tag,
        }
    }
}

impl Default for StepKind {
    fn default() -> Self {
        StepKind::Unknown(String::new())
    }
}

impl From<String> for StepKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "goto" => StepKind::Goto,
            "fill" => StepKind::Fill,
            "click" => StepKind::Click,
            "wait-for-url" => StepKind::WaitForUrl,
            "wait-for-selector" => StepKind::WaitForSelector,
            "wait-for-text" => StepKind::WaitForText,
            "wait" => StepKind::Wait,
            "iframe-fill" => StepKind::IframeFill,
            "assert-text" => StepKind::AssertText,
            "assert-url" => StepKind::AssertUrl,
            "screenshot" => StepKind::Screenshot,
            _ => StepKind::Unknown(tag),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative browser action or assertion.
///
/// Every kind-specific field is optional here; the executor checks the
/// ones its kind needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "type", default)]
    pub kind: StepKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_selector: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_string"
    )]
    pub value: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "scalar_string"
    )]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,

    /// Keys no step kind reads, kept so the definition can be echoed back verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }
}

/// Element states accepted by `wait-for-selector`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    Attached,
    Detached,
    #[default]
    Visible,
    Hidden,
}

impl WaitState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "attached" => Some(WaitState::Attached),
            "detached" => Some(WaitState::Detached),
            "visible" => Some(WaitState::Visible),
            "hidden" => Some(WaitState::Hidden),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
        }
    }
}

/// Accept `value: 12345` as well as `value: "12345"`.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|s| match s {
        Scalar::Str(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
    }))
}
