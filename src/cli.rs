use std::path::PathBuf;

use clap::Parser;

use crate::config::{EngineIo, ExportFormat};
use crate::test::VerboseLevel;
use crate::utils::version;

fn parse_verbose(s: &str) -> Result<VerboseLevel, String> {
  if let Ok(n) = s.parse::<u8>() {
    return Ok(VerboseLevel::from_index(n));
  }
  s.parse::<VerboseLevel>().map_err(|_| format!("unknown verbosity '{s}'"))
}

fn parse_export_format(s: &str) -> Result<ExportFormat, String> {
  s.parse::<ExportFormat>().map_err(|_| format!("unknown export format '{s}'"))
}

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
  // Test selection
  #[arg(
    value_name = "FILTER",
    help = "Test filters: substring include, -substring exclude, ^prefix anchor, or the group tokens all/tests/perf"
  )]
  pub filters: Vec<String>,

  #[arg(long, help = "List matching tests without running them")]
  pub list: bool,

  // Run behavior
  #[arg(long, help = "Hint that a gui host is attached (relaxes watchdog timers)")]
  pub gui: bool,

  #[arg(long, help = "Run at presentation speed instead of as fast as possible")]
  pub slow: bool,

  #[arg(long = "stop-on-error", help = "Stop the batch at the first failing test")]
  pub stop_on_error: bool,

  #[arg(long = "break-on-error", help = "Request a debugger break on the first failing check")]
  pub break_on_error: bool,

  #[arg(
    long = "fixed-dt",
    value_name = "SECONDS",
    help = "Fixed per-frame delta time; 0 uses the host clock"
  )]
  pub fixed_delta_time: Option<f32>,

  #[arg(long = "stress", value_name = "N", help = "Workload multiplier for perf tests")]
  pub stress_amount: Option<i32>,

  // Captures
  #[arg(long = "no-capture", help = "Disable screenshot and video captures")]
  pub no_capture: bool,

  #[arg(long = "capture-on-error", help = "Capture a screenshot whenever a test fails")]
  pub capture_on_error: bool,

  // Output
  #[arg(
    short('v'),
    long = "verbose",
    value_name = "LEVEL",
    help = "Log verbosity: 0-5 or silent, error, warning, info, debug, trace",
    value_parser = parse_verbose
  )]
  pub verbose: Option<VerboseLevel>,

  #[arg(
    long = "verbose-on-error",
    value_name = "LEVEL",
    help = "Verbosity used when dumping a failing test's log",
    value_parser = parse_verbose
  )]
  pub verbose_on_error: Option<VerboseLevel>,

  #[arg(short('e'), long = "export", value_name = "FILE", help = "Write a JUnit XML result file")]
  pub export: Option<PathBuf>,

  #[arg(
    long = "export-format",
    value_name = "FORMAT",
    help = "Result export format: none or junit",
    value_parser = parse_export_format
  )]
  pub export_format: Option<ExportFormat>,

  #[arg(short('c'), long = "config", value_name = "FILE", help = "Engine configuration file (toml)")]
  pub config: Option<PathBuf>,
}

impl Cli {
  /// Layer the command line over an already-loaded configuration.
  pub fn apply(&self, io: &mut EngineIo) {
    io.run_with_gui = self.gui;
    if self.slow {
      io.run_fast = false;
    }
    if self.stop_on_error {
      io.stop_on_error = true;
    }
    if self.break_on_error {
      io.break_on_error = true;
    }
    if self.no_capture {
      io.capture_enabled = false;
    }
    if self.capture_on_error {
      io.capture_on_error = true;
    }
    if let Some(level) = self.verbose {
      io.verbose_level = level;
    }
    if let Some(level) = self.verbose_on_error {
      io.verbose_level_on_error = level;
    }
    if let Some(dt) = self.fixed_delta_time {
      io.fixed_delta_time = dt;
    }
    if let Some(n) = self.stress_amount {
      io.perf_stress_amount = n;
    }
    if let Some(path) = &self.export {
      io.export_results_file = Some(path.clone());
      io.export_results_format = ExportFormat::JUnitXml;
    }
    if let Some(format) = self.export_format {
      io.export_results_format = format;
    }
  }
}
