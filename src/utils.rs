use std::path::PathBuf;

use color_eyre::eyre::Result;
use directories::ProjectDirs;
use lazy_static::lazy_static;
use tracing::error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{self, layer::SubscriberExt, util::SubscriberInitExt, Layer};

const VERSION_MESSAGE: &str = env!("CARGO_PKG_VERSION");

lazy_static! {
  pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
  pub static ref DATA_FOLDER: Option<PathBuf> =
    std::env::var(format!("{}_DATA", PROJECT_NAME.clone())).ok().map(PathBuf::from);
  pub static ref LOG_ENV: String = format!("{}_LOGLEVEL", PROJECT_NAME.clone());
  pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

fn project_directory() -> Option<ProjectDirs> {
  ProjectDirs::from("com", "uiprobe", env!("CARGO_PKG_NAME"))
}

pub fn initialize_panic_handler() -> Result<()> {
  let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
    .capture_span_trace_by_default(false)
    .display_location_section(true)
    .display_env_section(false)
    .into_hooks();
  eyre_hook.install()?;
  std::panic::set_hook(Box::new(move |panic_info| {
    let msg = panic_hook.panic_report(panic_info).to_string();
    error!("Error: {}", strip_ansi(&msg));
    better_panic::Settings::auto()
      .most_recent_first(false)
      .lineno_suffix(true)
      .verbosity(better_panic::Verbosity::Full)
      .create_panic_handler()(panic_info);
    std::process::exit(1);
  }));
  Ok(())
}

fn strip_ansi(s: &str) -> String {
  // Log files do not want terminal colors.
  let mut out = String::with_capacity(s.len());
  let mut in_escape = false;
  for ch in s.chars() {
    if in_escape {
      if ch.is_ascii_alphabetic() {
        in_escape = false;
      }
    } else if ch == '\u{1b}' {
      in_escape = true;
    } else {
      out.push(ch);
    }
  }
  out
}

pub fn get_data_dir() -> PathBuf {
  let directory = if let Some(s) = DATA_FOLDER.clone() {
    s
  } else if let Some(proj_dirs) = project_directory() {
    proj_dirs.data_local_dir().to_path_buf()
  } else {
    PathBuf::from(".").join(".data")
  };
  directory
}

pub fn initialize_logging() -> Result<()> {
  let directory = get_data_dir();
  std::fs::create_dir_all(directory.clone())?;
  let log_path = directory.join(LOG_FILE.clone());
  let log_file = std::fs::File::create(log_path)?;
  std::env::set_var(
    "RUST_LOG",
    std::env::var("RUST_LOG")
      .or_else(|_| std::env::var(LOG_ENV.clone()))
      .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME"))),
  );
  let file_subscriber = tracing_subscriber::fmt::layer()
    .with_file(true)
    .with_line_number(true)
    .with_writer(log_file)
    .with_target(false)
    .with_ansi(false)
    .with_filter(tracing_subscriber::filter::EnvFilter::from_default_env());
  let stderr_subscriber = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_file(false)
    .with_filter(tracing_subscriber::filter::EnvFilter::from_default_env());
  tracing_subscriber::registry()
    .with(file_subscriber)
    .with(stderr_subscriber)
    .with(ErrorLayer::default())
    .init();
  Ok(())
}

/// Landing pad for `break_on_error`. Never inlined, so a breakpoint placed
/// here stops on every failing check that requested a break.
#[inline(never)]
pub fn debugger_break() {
  std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
}

pub fn version() -> String {
  let author = clap::crate_authors!();

  let data_dir_path = get_data_dir().display().to_string();

  format!(
    "\
{VERSION_MESSAGE}

Authors: {author}

Data dir: {data_dir_path}"
  )
}
