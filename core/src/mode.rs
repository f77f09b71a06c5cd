use crate::config::AgentConfig;

/// Which route categories the gateway exposes. Resolved exactly once at
/// process start; never re-evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// Only the agent invocation endpoint.
    AgentOnly,
    /// Only per-tool endpoints; the agent endpoint is suppressed.
    ToolsOnly,
    /// Agent endpoint plus per-tool endpoints.
    Combined,
}

impl Exposure {
    /// Decision table:
    /// 1. `tools_only` set, or the configuration carries no identity
    ///    directive at all -> tools only.
    /// 2. `serve_tools` set -> combined.
    /// 3. otherwise -> agent only.
    pub fn resolve(tools_only: bool, serve_tools: bool, config: &AgentConfig) -> Self {
        if tools_only || !config.has_directives() {
            Exposure::ToolsOnly
        } else if serve_tools {
            Exposure::Combined
        } else {
            Exposure::AgentOnly
        }
    }

    pub fn includes_agent(self) -> bool {
        !matches!(self, Exposure::ToolsOnly)
    }

    pub fn includes_tools(self) -> bool {
        !matches!(self, Exposure::AgentOnly)
    }
}

/// Which transport serves the routes. Exactly one is active per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
    Sse,
}

impl Transport {
    pub fn resolve(mcp: bool, mcp_sse: bool) -> Self {
        if mcp_sse {
            Transport::Sse
        } else if mcp {
            Transport::Stdio
        } else {
            Transport::Http
        }
    }
}
