//! Named handler for the host's generic `[Type][Data]` / `Key=Value`
//! settings persistence. Unknown keys on read are ignored so older hosts can
//! load newer files.

use crate::config::EngineIo;

pub const SETTINGS_TYPE_NAME: &str = "UiProbe";

/// The engine state slice that round-trips through host settings.
#[derive(Debug, Default, Clone)]
pub struct PersistedSettings {
  pub filter_tests: String,
  pub filter_perfs: String,
}

pub fn write_all(persisted: &PersistedSettings, io: &EngineIo, out: &mut String) {
  out.push_str(&format!("[{SETTINGS_TYPE_NAME}][Data]\n"));
  out.push_str(&format!("FilterTests={}\n", persisted.filter_tests));
  out.push_str(&format!("FilterPerfs={}\n", persisted.filter_perfs));
  out.push_str(&format!("CaptureEnabled={}\n", i32::from(io.capture_enabled)));
  out.push_str(&format!("CaptureOnError={}\n", i32::from(io.capture_on_error)));
  out.push('\n');
}

pub fn read_line(persisted: &mut PersistedSettings, io: &mut EngineIo, line: &str) {
  let Some((key, value)) = line.split_once('=') else {
    return;
  };
  match key {
    "FilterTests" => persisted.filter_tests = value.to_string(),
    "FilterPerfs" => persisted.filter_perfs = value.to_string(),
    "CaptureEnabled" => io.capture_enabled = value.trim() != "0",
    "CaptureOnError" => io.capture_on_error = value.trim() != "0",
    _ => {},
  }
}
