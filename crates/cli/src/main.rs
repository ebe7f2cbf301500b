mod config_commands;
mod tool_commands;

use std::path::PathBuf;

use {
    agenda_config::AgendaConfig,
    anyhow::Result,
    clap::{Parser, Subcommand},
    secrecy::Secret,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "agenda", about = "agenda: calendar tools with duplicate and conflict screening")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./agenda.toml and the user config dir).
    #[arg(long, global = true, env = "AGENDA_CONFIG")]
    config: Option<PathBuf>,

    /// OAuth access token for the calendar API (overrides config value).
    #[arg(long, global = true, env = "AGENDA_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Calendar API root (overrides config value).
    #[arg(long, global = true, env = "AGENDA_CALENDAR_API_URL")]
    calendar_api_url: Option<String>,

    /// Calendar used when a call names none (overrides config value).
    #[arg(long, global = true)]
    calendar: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available tools and their parameter schemas.
    Tools,
    /// Run one tool operation.
    Call {
        /// Operation name, e.g. create_event.
        operation: String,
        /// Operation parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value = "calendar")]
        tool: String,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Config from `--config` (or discovery), with command-line overrides applied.
fn effective_config(cli: &Cli) -> Result<AgendaConfig> {
    let mut config = match &cli.config {
        Some(path) => agenda_config::load_config(path)?,
        None => agenda_config::discover_and_load(),
    };
    if let Some(token) = &cli.access_token {
        config.calendar.access_token = Some(Secret::new(token.clone()));
    }
    if let Some(url) = &cli.calendar_api_url {
        config.calendar.api_base_url = url.clone();
    }
    if let Some(calendar) = &cli.calendar {
        config.calendar.default_calendar = calendar.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    debug!(version = env!("CARGO_PKG_VERSION"), "agenda starting");

    let config = effective_config(&cli)?;
    match cli.command {
        Commands::Tools => tool_commands::list_tools(&config),
        Commands::Call {
            ref operation,
            ref params,
            ref tool,
        } => tool_commands::call(&config, tool, operation, params).await,
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref(), &config)
        },
    }
}
