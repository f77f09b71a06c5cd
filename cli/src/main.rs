use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::serve::ServeArgs;

#[derive(Parser)]
#[command(
    name = "axon",
    version,
    about = "Axon — serve declaratively configured agents over HTTP or MCP"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Log to a file
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an agent as a REST API or MCP server
    Serve(ServeArgs),
    /// List the agents available in a directory
    Agents {
        /// Directory to scan for agent configurations
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // The stdio stream transport owns stdout; logs must go to stderr there.
    let log_to_stderr = matches!(&cli.command, Commands::Serve(args) if args.mcp && !args.mcp_sse);
    logging::init(cli.debug, log_to_stderr, cli.log.as_deref());

    let code = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Agents { path } => commands::agents::run(&path),
    };
    std::process::exit(code);
}
