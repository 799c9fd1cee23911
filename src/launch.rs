use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const GENERATED_KIND: &str = "ktether";
pub const LEGACY_GENERATED_KINDS: [&str; 2] = ["local-tunnel-debug", "bridge-debug"];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LaunchConfig {
    pub name: String,
    pub kind: String,
}

impl LaunchConfig {
    pub fn is_generated(&self) -> bool {
        self.kind == GENERATED_KIND
            || LEGACY_GENERATED_KINDS
                .iter()
                .any(|legacy| *legacy == self.kind)
    }
}

#[derive(Debug, Clone)]
pub struct LaunchStore {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct LaunchFile {
    #[serde(default)]
    configurations: Vec<LaunchSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct LaunchSpec {
    name: String,
    #[serde(default, alias = "type")]
    kind: String,
}

impl LaunchStore {
    pub fn discover() -> Self {
        Self {
            path: discover_launch_path(),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn configurations(&self) -> Result<Vec<LaunchConfig>> {
        let Some(path) = self.path.as_ref() else {
            return Ok(Vec::new());
        };

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read launch configurations {}", path.display()))?;
        let parsed: LaunchFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse launch configurations {}", path.display()))?;

        Ok(parsed
            .configurations
            .into_iter()
            .map(|spec| LaunchConfig {
                name: spec.name,
                kind: spec.kind,
            })
            .collect())
    }
}

fn discover_launch_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KTETHER_LAUNCH")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("ktether-launch.yaml"),
        PathBuf::from("ktether-launch.yml"),
        PathBuf::from(".ktether-launch.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/ktether/launch.yaml"),
            PathBuf::from(&home).join(".config/ktether/launch.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{LaunchConfig, LaunchStore};
    use std::io::Write;

    #[test]
    fn generated_and_legacy_kinds_are_recognized() {
        let generated = LaunchConfig {
            name: "api (redirected)".to_string(),
            kind: "ktether".to_string(),
        };
        let legacy = LaunchConfig {
            name: "api (old tunnel)".to_string(),
            kind: "local-tunnel-debug".to_string(),
        };
        let plain = LaunchConfig {
            name: "debug api".to_string(),
            kind: "cargo".to_string(),
        };
        assert!(generated.is_generated());
        assert!(legacy.is_generated());
        assert!(!plain.is_generated());
    }

    #[test]
    fn configurations_parse_names_and_kinds() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "configurations:\n  - name: debug api\n    kind: cargo\n  - name: attach billing\n    type: lldb\n"
        )
        .expect("write");

        let store = LaunchStore::at(file.path().to_path_buf());
        let configs = store.configurations().expect("parse");
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "debug api");
        assert_eq!(configs[0].kind, "cargo");
        assert_eq!(configs[1].kind, "lldb");
    }

    #[test]
    fn missing_store_yields_no_configurations() {
        let store = LaunchStore { path: None };
        assert!(store.configurations().expect("empty").is_empty());
    }

    #[test]
    fn unreadable_store_is_an_error() {
        let store = LaunchStore::at("/nonexistent/ktether-launch.yaml".into());
        assert!(store.configurations().is_err());
    }
}
