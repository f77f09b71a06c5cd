pub mod runner;
pub mod tools;

use serde_json::{Map, Value};
use thiserror::Error;

use axon_core::config::LoadedAgent;
use axon_core::inputs::{self, InputDeclaration, InputError};
use axon_core::route::RouteTable;

use crate::runner::{Runner, RunnerError, RunnerSettings};
use crate::tools::{ToolDescriptor, ToolError, ToolSet};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("agent execution failed: {0}")]
    Runner(#[from] RunnerError),
    #[error("tool execution failed: {0}")]
    Tool(#[from] ToolError),
}

/// Process-wide serving state: the loaded agent, its declared inputs, the
/// resolved route table, and everything one invocation needs. Built once
/// before the adapter starts serving; read-only afterwards.
pub struct Gateway {
    agent_name: String,
    description: String,
    declared: InputDeclaration,
    runner: RunnerSettings,
    tools: Option<ToolSet>,
    routes: RouteTable,
}

impl Gateway {
    pub fn new(
        agent: &LoadedAgent,
        runner: RunnerSettings,
        tools: Option<ToolSet>,
        routes: RouteTable,
    ) -> Self {
        Self {
            agent_name: agent.name.clone(),
            description: agent.config.description.clone(),
            declared: inputs::declared_inputs(&agent.config),
            runner,
            tools,
            routes,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn declared_inputs(&self) -> &InputDeclaration {
        &self.declared
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.as_ref().and_then(|set| set.get(name))
    }

    /// Resolve the caller-supplied values against the declared inputs, then
    /// run one fresh, isolated agent execution. Returns the full output
    /// state; the caller picks the response shape.
    pub async fn invoke_agent(
        &self,
        supplied: &Map<String, Value>,
    ) -> Result<Map<String, Value>, GatewayError> {
        let input_state = inputs::resolve(&self.declared, supplied)?;
        let runner = Runner::new(&self.runner, input_state);
        Ok(runner.run().await?)
    }

    /// Invoke a registered tool with the caller-supplied named arguments.
    /// Tool arguments are passed through as-is; only agent inputs go through
    /// declaration-based resolution.
    pub async fn invoke_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let tool = self
            .tools
            .as_ref()
            .and_then(|set| set.get(name))
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;
        Ok(tool.call(args).await?)
    }
}
