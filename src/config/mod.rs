//! Host configuration: memory limits, import names, assertion mode.
//!
//! User-level config: `~/.chocohost/config.yaml`
//! Project-level config: `.chocohost/config.yaml`
//! Explicit config: `--config FILE` (strict: parse errors are fatal)
//!
//! Resolution: defaults → user → project → explicit file → CLI overrides.
//! Each layer only replaces the fields it sets.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::wasm::error::{HostError, HostResult};
use crate::wasm::imports::{AssertMode, ImportNames};
use crate::wasm::memory::MemoryLimits;

/// Fully resolved host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub memory: MemoryLimits,
    pub imports: ImportNames,
    pub assert_mode: AssertMode,
}

/// On-disk shape of a config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    memory: MemoryFile,
    imports: ImportsFile,
    assert_mode: Option<AssertMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MemoryFile {
    initial_pages: Option<u32>,
    maximum_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ImportsFile {
    functions: Option<String>,
    memory_module: Option<String>,
    memory_name: Option<String>,
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub initial_pages: Option<u32>,
    pub maximum_pages: Option<u32>,
    pub assert_mode: Option<AssertMode>,
}

/// Path to `~/.chocohost/config.yaml`.
fn user_config_path() -> Option<PathBuf> {
    #[cfg(windows)]
    let home = std::env::var("USERPROFILE").ok();
    #[cfg(not(windows))]
    let home = std::env::var("HOME").ok();
    home.map(|p| PathBuf::from(p).join(".chocohost").join("config.yaml"))
}

fn project_config_path() -> PathBuf {
    PathBuf::from(".chocohost").join("config.yaml")
}

impl HostConfig {
    /// Load user + project config, then an optional explicit file.
    pub fn load(explicit: Option<&Path>) -> HostResult<Self> {
        Self::load_layers(user_config_path().as_deref(), &project_config_path(), explicit)
    }

    /// Layered load with caller-supplied paths.
    ///
    /// Missing or unparseable implicit files fall back to defaults with a
    /// warning. The explicit file must exist and parse.
    pub fn load_layers(
        user: Option<&Path>,
        project: &Path,
        explicit: Option<&Path>,
    ) -> HostResult<Self> {
        let mut config = Self::default();

        if let Some(path) = user {
            if let Some(file) = read_lenient(path) {
                config.apply_file(file);
            }
        }
        if let Some(file) = read_lenient(project) {
            config.apply_file(file);
        }
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path).map_err(|e| {
                HostError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            config.apply_file(parse(&content).map_err(|e| {
                HostError::Config(format!("{}: {e}", path.display()))
            })?);
        }

        Ok(config)
    }

    /// Parse a single YAML document on top of the defaults.
    pub fn from_yaml(content: &str) -> HostResult<Self> {
        let mut config = Self::default();
        config.apply_file(parse(content).map_err(|e| HostError::Config(e.to_string()))?);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(n) = overrides.initial_pages {
            self.memory.initial_pages = n;
        }
        if let Some(n) = overrides.maximum_pages {
            self.memory.maximum_pages = n;
        }
        if let Some(mode) = overrides.assert_mode {
            self.assert_mode = mode;
        }
    }

    pub fn validate(&self) -> HostResult<()> {
        self.memory.validate()?;
        for (field, value) in [
            ("imports.functions", &self.imports.functions),
            ("imports.memory_module", &self.imports.memory_module),
            ("imports.memory_name", &self.imports.memory_name),
        ] {
            if value.is_empty() {
                return Err(HostError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(n) = file.memory.initial_pages {
            self.memory.initial_pages = n;
        }
        if let Some(n) = file.memory.maximum_pages {
            self.memory.maximum_pages = n;
        }
        if let Some(ns) = file.imports.functions {
            self.imports.functions = ns;
        }
        if let Some(ns) = file.imports.memory_module {
            self.imports.memory_module = ns;
        }
        if let Some(name) = file.imports.memory_name {
            self.imports.memory_name = name;
        }
        if let Some(mode) = file.assert_mode {
            self.assert_mode = mode;
        }
    }
}

fn parse(content: &str) -> Result<ConfigFile, serde_yaml::Error> {
    // An empty document deserializes as unit, not as an empty map.
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(content)
}

fn read_lenient(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match parse(&content) {
        Ok(file) => {
            debug!(path = %path.display(), "loaded config");
            Some(file)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_script() {
        let config = HostConfig::default();
        assert_eq!(config.memory, MemoryLimits::new(10, 100));
        assert_eq!(config.imports.functions, "imports");
        assert_eq!(config.imports.memory_module, "js");
        assert_eq!(config.imports.memory_name, "mem");
        assert_eq!(config.assert_mode, AssertMode::Halt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_yaml_string() {
        let yaml = r#"
memory:
  initial_pages: 2
  maximum_pages: 50
imports:
  memory_module: env
assert_mode: warn
"#;
        let config = HostConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.memory, MemoryLimits::new(2, 50));
        assert_eq!(config.imports.memory_module, "env");
        // Unset fields keep their defaults
        assert_eq!(config.imports.functions, "imports");
        assert_eq!(config.imports.memory_name, "mem");
        assert_eq!(config.assert_mode, AssertMode::Warn);
    }

    #[test]
    fn empty_yaml_is_defaults() {
        assert_eq!(HostConfig::from_yaml("").unwrap(), HostConfig::default());
    }

    #[test]
    fn unknown_field_rejected() {
        let err = HostConfig::from_yaml("memroy:\n  initial_pages: 2\n").unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn unknown_assert_mode_rejected() {
        assert!(HostConfig::from_yaml("assert_mode: ignore\n").is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = HostConfig::from_yaml("memory:\n  initial_pages: 2\n").unwrap();
        config.apply_overrides(&ConfigOverrides {
            initial_pages: Some(4),
            maximum_pages: None,
            assert_mode: Some(AssertMode::Warn),
        });
        assert_eq!(config.memory, MemoryLimits::new(4, 100));
        assert_eq!(config.assert_mode, AssertMode::Warn);
    }

    #[test]
    fn layers_merge_field_by_field() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = dir.path().join("user.yaml");
        let project = dir.path().join("project.yaml");
        std::fs::write(&user, "memory:\n  initial_pages: 3\n  maximum_pages: 30\n").unwrap();
        std::fs::write(&project, "memory:\n  maximum_pages: 40\n").unwrap();

        let config = HostConfig::load_layers(Some(&user), &project, None).unwrap();
        assert_eq!(config.memory, MemoryLimits::new(3, 40));
    }

    #[test]
    fn explicit_file_overrides_project() {
        let dir = tempfile::TempDir::new().unwrap();
        let project = dir.path().join("project.yaml");
        let explicit = dir.path().join("explicit.yaml");
        std::fs::write(&project, "assert_mode: warn\n").unwrap();
        std::fs::write(&explicit, "assert_mode: halt\n").unwrap();

        let config = HostConfig::load_layers(None, &project, Some(&explicit)).unwrap();
        assert_eq!(config.assert_mode, AssertMode::Halt);
    }

    #[test]
    fn invalid_implicit_file_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let project = dir.path().join("project.yaml");
        std::fs::write(&project, "memory: [not, a, map]\n").unwrap();

        let config = HostConfig::load_layers(None, &project, None).unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn invalid_explicit_file_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let explicit = dir.path().join("explicit.yaml");
        std::fs::write(&explicit, "memory: [not, a, map]\n").unwrap();
        let missing = dir.path().join("none.yaml");

        assert!(HostConfig::load_layers(None, &missing, Some(&explicit)).is_err());
    }

    #[test]
    fn missing_explicit_file_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("none.yaml");
        let err = HostConfig::load_layers(None, &missing, Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("none.yaml"));
    }

    #[test]
    fn empty_namespace_rejected() {
        let config = HostConfig::from_yaml("imports:\n  functions: \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }
}
