use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;

use axon_core::config::{AgentConfig, ToolArg, ToolSpec};
use axon_core::inputs::render;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool command: {0}")]
    Command(String),
    #[error("tool command failed to start")]
    Spawn(#[source] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

pub type ToolHandler = Arc<
    dyn Fn(Map<String, Value>) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A registered tool: identity, documentation, argument surface, and the
/// async callable behind it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub arguments: Vec<ToolArg>,
    handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<ToolArg>,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments,
            handler,
        }
    }

    pub async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        (self.handler)(args).await
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The tool registry for one serving process. Built only when the resolved
/// mode includes tool endpoints; read-only once serving begins.
#[derive(Clone, Debug, Default)]
pub struct ToolSet {
    tools: Vec<ToolDescriptor>,
}

impl ToolSet {
    /// Build the registry from the tools declared in the agent
    /// configuration. Externally supplied handlers register through
    /// [`ToolSet::register`] with the same descriptor type.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut set = Self::default();
        for spec in &config.tools {
            if let Some(descriptor) = command_tool(spec) {
                set.register(descriptor);
            }
        }
        set
    }

    pub fn register(&mut self, tool: ToolDescriptor) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Descriptor for a YAML-declared command tool. Specs without a command
/// template have nothing to execute and produce no descriptor.
fn command_tool(spec: &ToolSpec) -> Option<ToolDescriptor> {
    let template = spec.tool.clone()?;
    if spec.name.is_empty() {
        return None;
    }
    let handler: ToolHandler = Arc::new(move |args| {
        let template = template.clone();
        Box::pin(async move { run_command_tool(&template, &args).await })
    });
    Some(ToolDescriptor::new(
        spec.name.clone(),
        spec.description.clone(),
        spec.arguments.clone(),
        handler,
    ))
}

async fn run_command_tool(template: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
    let rendered = render(template, args);
    let parts =
        shell_words::split(&rendered).map_err(|err| ToolError::Command(err.to_string()))?;
    let (program, rest) = parts
        .split_first()
        .ok_or_else(|| ToolError::Command("empty command".to_string()))?;

    tracing::debug!(command = %rendered, "running command tool");

    let output = Command::new(program)
        .args(rest)
        .output()
        .await
        .map_err(ToolError::Spawn)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command exited with status {}", output.status)
        } else {
            stderr
        };
        return Err(ToolError::Failed(message));
    }

    let stdout = String::from_utf8_lossy(&output.stdout)
        .trim_end()
        .to_string();
    Ok(Value::String(stdout))
}
