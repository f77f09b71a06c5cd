use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Agent configuration determining its identity, task, and capabilities.
/// Loaded once at startup and read-only for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent description, used as the endpoint summary.
    pub description: String,
    /// Legacy identity field, kept so older configurations are still
    /// recognized as agents.
    pub system_prompt: Option<String>,
    /// Generator override for this agent.
    pub generator: Option<String>,
    /// Configuration version.
    pub version: String,
    /// The agent directive (identity prompt).
    pub agent: Option<String>,
    /// The main task directive.
    pub task: Option<String>,
    /// Default values for declared inputs.
    pub defaults: BTreeMap<String, Value>,
    /// Command tools exposed by this agent.
    pub tools: Vec<ToolSpec>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            system_prompt: None,
            generator: None,
            version: "1.0.0".to_string(),
            agent: None,
            task: None,
            defaults: BTreeMap::new(),
            tools: Vec::new(),
        }
    }
}

/// A declared command tool: a named shell command template the agent (or a
/// remote caller) can invoke with named arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub arguments: Vec<ToolArg>,
    /// Shell command template, rendered with `{{ argument }}` placeholders.
    pub tool: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolArg {
    pub name: String,
    pub description: String,
    pub example: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no agent configuration found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid agent configuration in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// An agent configuration together with its resolved file path and display
/// name.
#[derive(Debug, Clone)]
pub struct LoadedAgent {
    pub path: PathBuf,
    pub name: String,
    pub config: AgentConfig,
}

impl LoadedAgent {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let resolved = resolve_config_path(path)?;
        let config = AgentConfig::from_path(&resolved)?;
        let name = agent_name(&resolved);
        Ok(Self {
            path: resolved,
            name,
            config,
        })
    }
}

impl AgentConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether this configuration carries any agent identity at all. A
    /// configuration with none of the directive fields can only serve tools.
    pub fn has_directives(&self) -> bool {
        self.system_prompt.is_some() || self.agent.is_some() || self.task.is_some()
    }
}

/// Resolve a user-supplied path to a concrete configuration file. Directories
/// are probed for `task.yml`, then `agent.yml`.
pub fn resolve_config_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_dir() {
        for candidate in ["task.yml", "agent.yml"] {
            let sub = path.join(candidate);
            if sub.is_file() {
                return Ok(sub);
            }
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(ConfigError::NotFound(path.to_path_buf()))
    }
}

/// Display name for an agent file. Generic stems take the parent directory
/// name instead.
pub fn agent_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if matches!(stem, "agent" | "task" | "workflow") {
        if let Some(parent) = path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            return parent.to_string();
        }
    }
    stem.to_string()
}
