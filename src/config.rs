use std::path::PathBuf;

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::test::VerboseLevel;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
  #[default]
  None,
  #[strum(serialize = "junit")]
  #[serde(rename = "junit")]
  JUnitXml,
}

/// Engine configuration and public I/O block. Inputs are read by the
/// scheduler every frame; the two trailing fields are outputs for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineIo {
  /// Hint that a graphics output exists; relaxes watchdog timers.
  pub run_with_gui: bool,
  /// Run as fast as possible (teleport pointer, skip delays). Watchdog is
  /// disabled when this is off.
  pub run_fast: bool,
  /// Stop queued tests on the first test error.
  pub stop_on_error: bool,
  /// Ask callers of check to trigger a debugger break on error.
  pub break_on_error: bool,
  /// Keep the gui routine spinning after the test routine ends.
  pub keep_gui_func: bool,
  pub verbose_level: VerboseLevel,
  pub verbose_level_on_error: VerboseLevel,
  pub no_throttle: bool,
  /// Fixed delta time override, 0 = use the host clock.
  pub fixed_delta_time: f32,
  pub capture_enabled: bool,
  pub capture_on_error: bool,
  /// Pointer speed in pixels/second when not running fast.
  pub mouse_speed: f32,
  pub scroll_speed: f32,
  /// Character input speed in chars/second when not running fast.
  pub typing_speed: f32,
  /// Multiplier for the amount of items perf tests submit.
  pub perf_stress_amount: i32,
  /// Swap wheel axes while shift is held (macOS-style hosts).
  pub swap_wheel_axes_with_shift: bool,
  pub export_results_file: Option<PathBuf>,
  pub export_results_format: ExportFormat,

  // Outputs.
  #[serde(skip)]
  pub running_tests: bool,
  #[serde(skip)]
  pub render_want_max_speed: bool,
}

impl Default for EngineIo {
  fn default() -> Self {
    Self {
      run_with_gui: false,
      run_fast: true,
      stop_on_error: false,
      break_on_error: false,
      keep_gui_func: false,
      verbose_level: VerboseLevel::Warning,
      verbose_level_on_error: VerboseLevel::Info,
      no_throttle: false,
      fixed_delta_time: 0.0,
      capture_enabled: true,
      capture_on_error: false,
      mouse_speed: 1000.0,
      scroll_speed: 1600.0,
      typing_speed: 30.0,
      perf_stress_amount: 1,
      swap_wheel_axes_with_shift: false,
      export_results_file: None,
      export_results_format: ExportFormat::None,
      running_tests: false,
      render_want_max_speed: false,
    }
  }
}

impl EngineIo {
  /// Layered load: defaults, then an optional `uiprobe.toml`, then
  /// `UIPROBE_*` environment overrides.
  pub fn load(file: Option<&std::path::Path>) -> Result<Self> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(&EngineIo::default())?);
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    } else {
      builder = builder.add_source(config::File::with_name("uiprobe").required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("UIPROBE"));
    let io = builder.build()?.try_deserialize()?;
    Ok(io)
  }
}
