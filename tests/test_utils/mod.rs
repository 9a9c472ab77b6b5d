//! Shared fixtures for engine tests: a started engine bound to a headless
//! host, pumped from the test thread.

use uiprobe::test::VerboseLevel;
use uiprobe::{Engine, EngineIo, HeadlessHost};

/// Frame delta used by every pumped frame.
pub const TEST_DT: f32 = 1.0 / 60.0;

/// Upper bound on pumped frames before a run is declared stuck.
pub const MAX_FRAMES: u32 = 2000;

/// Engine defaults with the tracing mirror silenced.
pub fn quiet_io() -> EngineIo {
  let mut io = EngineIo::default();
  io.verbose_level = VerboseLevel::Silent;
  io
}

pub struct EngineHarness {
  pub engine: Engine,
  pub host: HeadlessHost,
}

impl EngineHarness {
  pub fn new() -> Self {
    Self::with_io(quiet_io())
  }

  pub fn with_io(io: EngineIo) -> Self {
    let engine = Engine::new(io);
    engine.start();
    Self { engine, host: HeadlessHost::new() }
  }

  pub fn pump(&mut self, frames: u32) {
    for _ in 0..frames {
      self.host.frame(&self.engine, TEST_DT);
    }
  }

  /// Pump until the queue drains; false when the frame budget ran out.
  #[must_use]
  pub fn run_until_idle(&mut self) -> bool {
    self.host.run_until_idle(&self.engine, TEST_DT, MAX_FRAMES)
  }
}

impl Drop for EngineHarness {
  fn drop(&mut self) {
    self.engine.stop();
  }
}
