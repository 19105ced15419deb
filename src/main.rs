mod app;
mod audit;
mod cache;
mod catalog;
mod clock;
mod commands;
mod config;
mod error;
mod helpers;
mod store;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "brickaudit")]
#[command(about = "Check off the parts of your LEGO sets against the Rebrickable catalog")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/brickaudit/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logs go to a file so they never mix with command output
  let log_dir = config::Config::data_dir()?;
  std::fs::create_dir_all(&log_dir)?;
  let (writer, _guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, "brickaudit.log"));

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_env("BRICKAUDIT_LOG")
        .unwrap_or_else(|_| "brickaudit=info".into()),
    )
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .init();

  let config = config::Config::load(args.config.as_deref())?;

  let mut app = app::App::new(config)?;
  commands::run(&mut app, args.command).await?;

  Ok(())
}
