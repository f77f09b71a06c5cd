use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::AgentConfig;
use crate::mode::Exposure;

/// One invocable endpoint: the agent's, or a single tool's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Agent { summary: String },
    Tool { name: String, summary: String },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Agent { .. } => "/".to_string(),
            Route::Tool { name, .. } => format!("/{name}"),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Route::Agent { summary } => summary,
            Route::Tool { summary, .. } => summary,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("duplicate tool name '{0}' in route table")]
    DuplicateTool(String),
}

/// The immutable set of invocable endpoints, built once before any adapter
/// starts serving.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Assemble the route table for the resolved exposure. At most one agent
    /// route, plus one route per tool. Duplicate tool names are rejected
    /// rather than silently dropped.
    pub fn build(
        exposure: Exposure,
        config: &AgentConfig,
        tools: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, RouteError> {
        let mut routes = Vec::new();

        if exposure.includes_agent() {
            routes.push(Route::Agent {
                summary: config.description.clone(),
            });
        }

        if exposure.includes_tools() {
            let mut seen = BTreeSet::new();
            for (name, summary) in tools {
                if !seen.insert(name.clone()) {
                    return Err(RouteError::DuplicateTool(name));
                }
                routes.push(Route::Tool { name, summary });
            }
        }

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn has_agent(&self) -> bool {
        self.routes.iter().any(|route| matches!(route, Route::Agent { .. }))
    }

    pub fn agent_summary(&self) -> Option<&str> {
        self.routes.iter().find_map(|route| match route {
            Route::Agent { summary } => Some(summary.as_str()),
            Route::Tool { .. } => None,
        })
    }

    pub fn tool(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| matches!(route, Route::Tool { name: n, .. } if n == name))
    }

    pub fn tool_routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().filter_map(|route| match route {
            Route::Tool { name, summary } => Some((name.as_str(), summary.as_str())),
            Route::Agent { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
