mod api;
mod app;
mod attendance;
mod cache;
mod commands;
mod config;
mod error;
mod event;
mod notifications;
mod query;
mod rate_limit;
mod session;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::app::{App, AppContext};
use crate::attendance::AttendanceCache;
use crate::cache::MemoryStorage;
use crate::config::Config;
use crate::rate_limit::{RateLimiter, DEFAULT_LIMIT};
use crate::session::{AuthSignals, SessionCache, SessionManager, SessionSettings, TokenStore};
use crate::ui::StatusLine;

#[derive(Parser, Debug)]
#[command(name = "almacen")]
#[command(about = "A terminal client for warehouse attendance, inspired by k9s")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./almacen.yaml, then $XDG_CONFIG_HOME/almacen/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
  /// Sign in and store the session (password from ALMACEN_PASSWORD or stdin)
  Login {
    #[arg(long)]
    correo: String,
  },
  /// End the stored session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Download the attendance workbook for some dates of a sub-warehouse
  Export {
    #[arg(long)]
    subalmacen: u64,
    /// Comma separated date ids
    #[arg(long, value_delimiter = ',', required = true)]
    fechas: Vec<u64>,
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

/// Log to a daily file; the terminal belongs to the TUI.
fn init_logging(config: &Config, data_dir: &Path) -> Result<WorkerGuard> {
  let directory = config
    .log
    .directory
    .clone()
    .unwrap_or_else(|| data_dir.join("logs"));
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let appender = tracing_appender::rolling::daily(&directory, "almacen.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(config.log.filter.as_deref().unwrap_or("info"))?,
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn read_password() -> Result<String> {
  if let Ok(password) = std::env::var("ALMACEN_PASSWORD") {
    return Ok(password);
  }
  eprint!("Contraseña: ");
  let mut line = String::new();
  std::io::stdin().read_line(&mut line)?;
  let password = line.trim_end_matches(['\r', '\n']).to_string();
  if password.is_empty() {
    return Err(eyre!("No password given"));
  }
  Ok(password)
}

async fn run_cli(command: CliCommand, ctx: &AppContext) -> Result<()> {
  match command {
    CliCommand::Login { correo } => {
      let password = read_password()?;
      let usuario = ctx.manager.login(&correo, &password).await?;
      println!("Sesión iniciada: {} ({})", usuario.nombre, usuario.rol_label());
    }
    CliCommand::Logout => {
      ctx.manager.logout().await;
      println!("Sesión cerrada");
    }
    CliCommand::Whoami => match ctx.manager.session().current_user().await? {
      Some(usuario) => println!(
        "{} <{}> {}",
        usuario.nombre,
        usuario.correo.as_deref().unwrap_or("-"),
        usuario.rol_label()
      ),
      None => println!("Sin sesión"),
    },
    CliCommand::Export {
      subalmacen,
      fechas,
      output,
    } => {
      let bytes = ctx.client.export_fechas(subalmacen, &fechas).await?;
      let path = output.unwrap_or_else(|| PathBuf::from(format!("asistencias-{}.xlsx", subalmacen)));
      tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
      println!("{} ({} bytes)", path.display(), bytes.len());
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = Config::data_dir()?;
  let _log_guard = init_logging(&config, &data_dir)?;
  info!(api = %config.api.url, "starting");

  let limiter = match config.endpoint_limits() {
    Some((limits, fallback)) => RateLimiter::new(limits, fallback.unwrap_or(DEFAULT_LIMIT)),
    None => RateLimiter::default(),
  };
  let tokens = TokenStore::open(&data_dir)?;
  let client = ApiClient::new(&config, tokens.clone(), Arc::new(limiter), AuthSignals::new())?;
  let session = SessionCache::new(
    Arc::new(client.clone()),
    tokens,
    SessionSettings::from_config(&config.session),
  );
  let manager = SessionManager::new(client.clone(), session);
  let attendance = AttendanceCache::new(MemoryStorage::new()).with_ttl(config.attendance_ttl());

  let ctx = AppContext {
    client,
    manager,
    attendance,
    status: StatusLine::new(),
  };

  if let Some(command) = args.command {
    return run_cli(command, &ctx).await;
  }

  let mut app = App::new(config, ctx);
  app.run().await?;

  Ok(())
}
