use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use axon_api::AppState;
use axon_core::config::LoadedAgent;
use axon_core::mode::{Exposure, Transport};
use axon_core::route::RouteTable;
use axon_mcp_runtime::McpServer;
use axon_runtime::Gateway;
use axon_runtime::runner::RunnerSettings;
use axon_runtime::tools::ToolSet;

#[derive(Args)]
pub struct ServeArgs {
    /// Agent or workflow to serve
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Bind host to serve the agent on
    #[arg(long, env = "AXON_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port to serve the agent on
    #[arg(short, long, env = "AXON_PORT", default_value_t = 8667)]
    pub port: u16,

    /// Generator to use when the agent does not set one
    #[arg(short, long, env = "AXON_GENERATOR", default_value = "openai/gpt-4o")]
    pub generator: String,

    /// Conversation strategy to use
    #[arg(short, long, default_value = "full")]
    pub conversation: String,

    /// Maximum number of steps. Set to 0 to disable.
    #[arg(short = 's', long, default_value_t = 100)]
    pub max_steps: u32,

    /// Stop when the cost exceeds this value in USD. Set to 0 to disable.
    #[arg(long, default_value_t = 10.0)]
    pub max_cost: f64,

    /// Timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Quiet mode for runner processes
    #[arg(short, long)]
    pub quiet: bool,

    /// Start as MCP server over stdio
    #[arg(long)]
    pub mcp: bool,

    /// Start as MCP server with SSE transport
    #[arg(long)]
    pub mcp_sse: bool,

    /// Serve tools along with the agent. Automatically enabled if the agent
    /// has no identity directive.
    #[arg(short = 't', long = "tools")]
    pub serve_tools: bool,

    /// Serve tools only
    #[arg(long)]
    pub tools_only: bool,

    /// Runner binary that owns the `run` subcommand. Defaults to this
    /// executable.
    #[arg(long)]
    pub runner: Option<PathBuf>,
}

pub async fn run(args: ServeArgs) -> i32 {
    let agent = match LoadedAgent::load(&args.path) {
        Ok(agent) => agent,
        Err(err) => {
            tracing::error!("{err}");
            return 1;
        }
    };
    tracing::info!(agent = %agent.name, "loaded agent: {}", agent.config.description);

    // Both decisions are made exactly once, before anything binds.
    let exposure = Exposure::resolve(args.tools_only, args.serve_tools, &agent.config);
    let transport = Transport::resolve(args.mcp, args.mcp_sse);

    match exposure {
        Exposure::ToolsOnly => tracing::info!("tools-only mode"),
        Exposure::Combined => tracing::info!("serving agent and tools"),
        Exposure::AgentOnly => tracing::info!("serving agent"),
    }

    // The tool runtime is only built when tool endpoints are exposed.
    let tools = exposure
        .includes_tools()
        .then(|| ToolSet::from_config(&agent.config));
    if let Some(tools) = &tools {
        tracing::info!("registered {} tools", tools.len());
    }

    let routes = match RouteTable::build(
        exposure,
        &agent.config,
        tools
            .iter()
            .flat_map(ToolSet::iter)
            .map(|tool| (tool.name.clone(), tool.description.clone())),
    ) {
        Ok(routes) => routes,
        Err(err) => {
            tracing::error!("{err}");
            return 1;
        }
    };

    let runner_bin = match args.runner {
        Some(path) => path,
        None => match std::env::current_exe() {
            Ok(path) => path,
            Err(err) => {
                tracing::error!("cannot determine runner binary: {err}");
                return 1;
            }
        },
    };

    let settings = RunnerSettings {
        runner_bin,
        agent_path: agent.path.clone(),
        generator: args.generator,
        conversation_strategy: args.conversation,
        max_steps: args.max_steps,
        max_cost: args.max_cost,
        timeout: args.timeout,
        quiet: args.quiet,
    };

    let agent_name = agent.name.clone();
    let gateway = Arc::new(Gateway::new(&agent, settings, tools, routes));

    match transport {
        Transport::Stdio => {
            tracing::info!("serving {agent_name} on stdio ...");
            let server = McpServer::new(gateway);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!("{err}");
                    1
                }
            }
        }
        Transport::Sse => {
            tracing::info!(
                "serving {agent_name} on sse://{}:{}/ ...",
                args.host,
                args.port
            );
            let app = axon_api::sse::router(Arc::new(McpServer::new(gateway)));
            match axon_api::serve(app, &args.host, args.port).await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!("failed to serve: {err}");
                    1
                }
            }
        }
        Transport::Http => {
            tracing::info!(
                "serving {agent_name} on http://{}:{}/ ...",
                args.host,
                args.port
            );
            let app = axon_api::rest::router(AppState { gateway });
            match axon_api::serve(app, &args.host, args.port).await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!("failed to serve: {err}");
                    1
                }
            }
        }
    }
}
