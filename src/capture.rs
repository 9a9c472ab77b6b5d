use color_eyre::eyre::Result;

use crate::host::Rect;

pub mod capture_flags {
  pub const NONE: u32 = 0;
  /// Capture on the very next presented frame, no stabilization yield.
  pub const INSTANT: u32 = 1 << 0;
}

/// Parameters for one capture. These live on the requesting test's stack, so
/// a mid-flight video capture must be finalized before the check that failed
/// it returns.
#[derive(Debug, Clone, Default)]
pub struct CaptureArgs {
  pub rect: Rect,
  pub output_file: String,
  pub flags: u32,
  /// Filled in by the backend once the file is written.
  pub out_saved_file: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
  InProgress,
  Done,
}

/// Pixel-capture strategy. The external collaborator drives the actual
/// encoding; the engine only tracks "in progress" and yields until
/// resolution.
pub trait CaptureBackend: Send {
  fn begin(&mut self, args: &CaptureArgs) -> Result<()>;
  fn poll(&mut self) -> CaptureStatus;
  fn end(&mut self, args: &CaptureArgs) -> Result<()>;
}

/// Default backend for hosts without a pixel source: completes immediately.
#[derive(Debug, Default)]
pub struct NullCapture;

impl CaptureBackend for NullCapture {
  fn begin(&mut self, _args: &CaptureArgs) -> Result<()> {
    Ok(())
  }

  fn poll(&mut self) -> CaptureStatus {
    CaptureStatus::Done
  }

  fn end(&mut self, _args: &CaptureArgs) -> Result<()> {
    Ok(())
  }
}
