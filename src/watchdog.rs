/// Extra wall-clock grace the process-kill tier adds on top of the test-kill
/// tier. A tunable, not a load-bearing invariant.
pub const KILL_PROCESS_GRACE_SECS: f32 = 5.0;

/// Escalating wall-clock thresholds for one running test.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WatchdogLimits {
  pub warn: f32,
  pub kill_test: f32,
  pub kill_process: f32,
}

impl WatchdogLimits {
  /// Interactive (gui) runs get laxer timers and never a process kill; the
  /// user can see what is stuck.
  pub fn new(run_with_gui: bool) -> Self {
    if run_with_gui {
      Self { warn: 30.0, kill_test: 60.0, kill_process: f32::INFINITY }
    } else {
      Self { warn: 15.0, kill_test: 30.0, kill_process: 30.0 + KILL_PROCESS_GRACE_SECS }
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WatchdogAction {
  Warn,
  /// Mark the test Error and cancel it through the cooperative-abort path.
  KillTest,
  /// Hard process exit; the only way out of a test that yields forever.
  KillProcess,
}

/// Evaluate the running-time transition `t0 -> t1` against the limits.
/// Each tier fires exactly once, on the frame its threshold is crossed.
pub fn evaluate(t0: f64, t1: f64, limits: &WatchdogLimits) -> Option<WatchdogAction> {
  let crossed = |threshold: f32| (t0 as f32) < threshold && (t1 as f32) >= threshold;
  if crossed(limits.kill_process) {
    return Some(WatchdogAction::KillProcess);
  }
  if crossed(limits.kill_test) {
    return Some(WatchdogAction::KillTest);
  }
  if crossed(limits.warn) {
    return Some(WatchdogAction::Warn);
  }
  None
}
