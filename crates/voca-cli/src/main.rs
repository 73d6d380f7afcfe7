mod cli;
mod commands;

use std::process::ExitCode;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use cli::Command;
use commands::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "voca=info";

fn init_logging(directive: Option<&str>) {
    let directive = directive
        .unwrap_or(DEFAULT_LOG_DIRECTIVE)
        .parse::<Directive>()
        .or_else(|_| DEFAULT_LOG_DIRECTIVE.parse());
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = directive {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: cli::Args) -> Result<String, CliError> {
    let env = |key: &str| std::env::var(key).ok();
    match args.command {
        Command::CheckPassword { password } => commands::check_password(&password),
        Command::CreateRoom(server) => {
            let config = commands::resolve_config(args.config.as_deref(), &server, env)?;
            commands::create_room(&config).await
        }
        Command::SocketUrl { room, server } => {
            let config = commands::resolve_config(args.config.as_deref(), &server, env)?;
            commands::socket_url(&config, &room)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_logging(args.log_level.as_deref());

    tracing::debug!("voca v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {}", path.display());
    }

    match run(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
