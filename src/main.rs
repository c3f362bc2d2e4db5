use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app;
mod client;
mod config;
mod conflict;
mod error;
mod handler;
mod logging;
mod markup;
mod plan;
mod session;
mod tui;
mod ui;
mod voice;

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "account-planner")]
#[command(version, about = "Terminal chat client for building and editing company account plans")]
struct Cli {
    /// Base URL of the planner backend
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Session identifier sent with every request
    #[arg(long, global = true)]
    session: Option<String>,
    /// Delay between revealed characters of a reply (0 disables the effect)
    #[arg(long, global = true)]
    typing_delay_ms: Option<u64>,
    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

impl Cli {
    /// Flags win over the config file and environment
    fn apply(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(session) = &self.session {
            config.session_id = session.clone();
        }
        if let Some(delay) = self.typing_delay_ms {
            config.typing_delay_ms = delay;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.apply(&mut config);

    match cli.command {
        Some(Commands::Config { write }) => show_config(&config, write),
        None => {
            let log_file = cli.log_file.unwrap_or_else(Config::default_log_path);
            run(config, log_file).await
        }
    }
}

fn show_config(config: &Config, write: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        let path = config.save()?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn run(config: Config, log_file: PathBuf) -> Result<()> {
    logging::init(&log_file)?;
    tracing::info!(
        base_url = %config.base_url,
        session = %config.session_id,
        "starting account planner"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init().context("Failed to initialise terminal")?;
    let mut events = tui::EventHandler::new(tui::TICK_RATE);
    let mut app = App::new(&config);

    let result = event_loop(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!("exited with error: {:#}", e);
    }
    result
}

async fn event_loop(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event);
        app.poll_pending().await;
    }
    tracing::info!(pending = app.pending_count(), "quit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "account-planner",
            "--base-url",
            "http://planner.local:8000",
            "--typing-delay-ms",
            "0",
        ])
        .unwrap();

        let mut config = Config::new();
        cli.apply(&mut config);
        assert_eq!(config.base_url, "http://planner.local:8000");
        assert_eq!(config.typing_delay_ms, 0);
        assert_eq!(config.session_id, "default-session");
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_subcommand_accepts_global_flags() {
        let cli = Cli::try_parse_from(["account-planner", "config", "--write", "--session", "acme"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config { write: true })));

        let mut config = Config::new();
        cli.apply(&mut config);
        assert_eq!(config.session_id, "acme");
    }
}
