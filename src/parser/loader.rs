use std::path::Path;

use super::types::Flow;
use crate::error::StartupError;

/// Flow document formats, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowFormat {
    Yaml,
    Json,
}

impl FlowFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "yaml" | "yml" => Some(FlowFormat::Yaml),
            "json" => Some(FlowFormat::Json),
            _ => None,
        }
    }
}

/// Load a flow file from disk.
pub fn load_flow(path: &Path) -> Result<Flow, StartupError> {
    if !path.is_file() {
        return Err(StartupError::FlowNotFound(path.to_path_buf()));
    }

    let format = FlowFormat::from_path(path)
        .ok_or_else(|| StartupError::UnsupportedFormat(path.to_path_buf()))?;

    let content = std::fs::read_to_string(path).map_err(|source| StartupError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_flow(&content, format, path)
}

/// Parse flow text that was read from `source`.
pub fn parse_flow(content: &str, format: FlowFormat, source: &Path) -> Result<Flow, StartupError> {
    let flow = match format {
        FlowFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|source_err| StartupError::Yaml {
                path: source.to_path_buf(),
                source: source_err,
            })?
        }
        FlowFormat::Json => {
            serde_json::from_str(content).map_err(|source_err| StartupError::Json {
                path: source.to_path_buf(),
                source: source_err,
            })?
        }
    };

    log::debug!("Loaded flow from {}", source.display());
    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::StepKind;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_flow() {
        let file = write_temp(
            ".yaml",
            r#"
name: checkout
config:
  baseUrl: https://shop.test
  timeoutMs: 5000
steps:
  - type: goto
    path: /cart
  - type: click
    text: Checkout
  - type: wait
    ms: 250
"#,
        );

        let flow = load_flow(file.path()).unwrap();
        assert_eq!(flow.name.as_deref(), Some("checkout"));
        let config = flow.config.unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://shop.test"));
        assert_eq!(config.timeout_ms, Some(5000));
        assert_eq!(flow.steps.len(), 3);
        assert_eq!(flow.steps[1].kind, StepKind::Click);
        assert_eq!(flow.steps[2].ms, Some(250));
    }

    #[test]
    fn test_load_json_flow() {
        let file = write_temp(
            ".json",
            r#"{"steps": [{"type": "assert-url", "contains": "/success"}]}"#,
        );

        let flow = load_flow(file.path()).unwrap();
        assert!(flow.name.is_none());
        assert_eq!(flow.steps[0].kind, StepKind::AssertUrl);
        assert_eq!(flow.label("flows/pay.json"), "flows/pay.json");
    }

    #[test]
    fn test_missing_file() {
        let err = load_flow(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, StartupError::FlowNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".txt", "steps: []");
        let err = load_flow(file.path()).unwrap_err();
        assert!(matches!(err, StartupError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unparseable_yaml() {
        let file = write_temp(".yml", "steps: [unclosed");
        let err = load_flow(file.path()).unwrap_err();
        assert!(matches!(err, StartupError::Yaml { .. }));
    }

    #[test]
    fn test_unparseable_json() {
        let file = write_temp(".json", "{ \"steps\": ");
        let err = load_flow(file.path()).unwrap_err();
        assert!(matches!(err, StartupError::Json { .. }));
    }
}
