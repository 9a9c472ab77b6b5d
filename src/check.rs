//! Assertion plumbing shared by the `check!` macro family. Every check is
//! routed through the engine so failures update test status, honor
//! `stop_on_error`, and land in the per-test log.

use crate::capture::CaptureStatus;
use crate::engine::Engine;
use crate::test::{run_flags, TestStatus, VerboseLevel};

pub mod check_flags {
  pub const NONE: u32 = 0;
  /// Log nothing on success; failures still report.
  pub const SILENT_SUCCESS: u32 = 1 << 0;
}

/// Outcome of a string comparison check.
#[derive(Debug, Copy, Clone)]
pub struct StrOpOutcome {
  pub passed: bool,
  pub should_break: bool,
}

fn short_file(file: &str) -> &str {
  file.rsplit(['/', '\\']).next().unwrap_or(file)
}

/// Expression display for string comparisons. Single-line values are shown
/// inline; multiline values are elided here and dumped separately.
pub(crate) fn str_compare_expr(lhs_var: &str, lhs: &str, op: &str, rhs_var: &str, rhs: &str) -> (String, bool) {
  let multiline = lhs.contains('\n') || rhs.contains('\n');
  if multiline {
    (format!("{lhs_var} {op} {rhs_var}"), true)
  } else {
    (format!("{lhs_var} [\"{lhs}\"] {op} {rhs_var} [\"{rhs}\"]"), false)
  }
}

impl Engine {
  /// Record one check result. Returns true when the caller should trigger a
  /// debugger break (`break_on_error`).
  pub fn check(&self, file: &str, line: u32, flags: u32, result: bool, expr: &str) -> bool {
    let file = short_file(file);
    let mut state = self.state();

    // A failure mid video capture finalizes the file first so the failing
    // frames are kept.
    if !result && state.capture.in_progress && state.capture.is_video {
      if let Some(args) = state.capture.args.take() {
        if let Err(err) = state.capture.backend.end(&args) {
          tracing::warn!("capture finalize on error failed: {err}");
        }
      }
      state.capture.in_progress = false;
      state.capture.is_video = false;
    }

    match state.ctx.as_ref().map(|c| (c.test, c.run_flags)) {
      Some((id, ctx_run_flags)) => {
        let probe_only = ctx_run_flags & run_flags::GUI_FUNC_ONLY != 0;
        if result {
          if flags & check_flags::SILENT_SUCCESS == 0 {
            let text = if file.is_empty() {
              format!("OK '{expr}'")
            } else {
              format!("OK {file}:{line} '{expr}'")
            };
            state.log(VerboseLevel::Info, text);
          }
        } else {
          let text = if file.is_empty() {
            format!("KO '{expr}'")
          } else {
            format!("KO {file}:{line} '{expr}'")
          };
          state.log(VerboseLevel::Error, text);
          if !probe_only {
            state.tests[id.0].status = TestStatus::Error;
          }
          if let Some(ctx) = state.ctx.as_mut() {
            ctx.error_counter += 1;
          }
        }
      },
      None => {
        tracing::debug!("check outside a running test: '{expr}'");
      },
    }

    if !result && state.io.stop_on_error && !state.abort {
      state.abort = true;
    }
    // The break request is independent of stop_on_error having already
    // flagged the batch.
    !result && state.io.break_on_error
  }

  /// String comparison check, `op` is `"=="` or `"!="`. Multiline operands
  /// are dumped as fenced blocks on failure instead of inline.
  #[allow(clippy::too_many_arguments)]
  pub fn check_str_op(
    &self,
    file: &str,
    line: u32,
    flags: u32,
    op: &str,
    lhs_var: &str,
    lhs: &str,
    rhs_var: &str,
    rhs: &str,
  ) -> StrOpOutcome {
    let passed = match op {
      "!=" => lhs != rhs,
      _ => lhs == rhs,
    };
    let (expr, multiline) = str_compare_expr(lhs_var, lhs, op, rhs_var, rhs);
    let should_break = self.check(file, line, flags, passed, &expr);
    if !passed && multiline {
      let mut state = self.state();
      state.log(VerboseLevel::Error, format!("with {lhs_var}:\n```\n{lhs}\n```"));
      state.log(VerboseLevel::Error, format!("with {rhs_var}:\n```\n{rhs}\n```"));
    }
    StrOpOutcome { passed, should_break }
  }

  /// Poll the capture backend once per presented frame; called from the
  /// frame-end hook.
  pub(crate) fn poll_capture(&self) {
    let mut state = self.state();
    if !state.capture.in_progress {
      return;
    }
    if state.capture.backend.poll() == CaptureStatus::Done {
      if let Some(args) = state.capture.args.take() {
        if let Err(err) = state.capture.backend.end(&args) {
          tracing::warn!("capture finalize failed: {err}");
        }
      }
      state.capture.in_progress = false;
      state.capture.is_video = false;
    }
  }
}

/// Check an expression; on failure, log, mark the test errored, and return
/// from the enclosing routine.
#[macro_export]
macro_rules! check {
  ($ctx:expr, $expr:expr) => {{
    let result = $expr;
    if $ctx.check_expr(file!(), line!(), $crate::check::check_flags::NONE, result, stringify!($expr)) {
      $crate::utils::debugger_break();
    }
    if !result {
      return;
    }
  }};
}

/// Like `check!` but keeps running after a failure.
#[macro_export]
macro_rules! check_noret {
  ($ctx:expr, $expr:expr) => {{
    let result = $expr;
    if $ctx.check_expr(file!(), line!(), $crate::check::check_flags::NONE, result, stringify!($expr)) {
      $crate::utils::debugger_break();
    }
  }};
}

/// Like `check!` but logs nothing on success.
#[macro_export]
macro_rules! check_silent {
  ($ctx:expr, $expr:expr) => {{
    let result = $expr;
    if $ctx.check_expr(file!(), line!(), $crate::check::check_flags::SILENT_SUCCESS, result, stringify!($expr)) {
      $crate::utils::debugger_break();
    }
    if !result {
      return;
    }
  }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __check_binary_op {
  ($ctx:expr, $lhs:expr, $rhs:expr, $op:tt) => {{
    let (lhs, rhs) = (&$lhs, &$rhs);
    let result = lhs $op rhs;
    let expr = format!(
      "{} {} {}  [{:?} {} {:?}]",
      stringify!($lhs), stringify!($op), stringify!($rhs), lhs, stringify!($op), rhs,
    );
    if $ctx.check_expr(file!(), line!(), $crate::check::check_flags::NONE, result, &expr) {
      $crate::utils::debugger_break();
    }
    if !result {
      return;
    }
  }};
}

#[macro_export]
macro_rules! check_eq {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, ==)
  };
}

#[macro_export]
macro_rules! check_ne {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, !=)
  };
}

#[macro_export]
macro_rules! check_lt {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, <)
  };
}

#[macro_export]
macro_rules! check_le {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, <=)
  };
}

#[macro_export]
macro_rules! check_gt {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, >)
  };
}

#[macro_export]
macro_rules! check_ge {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {
    $crate::__check_binary_op!($ctx, $lhs, $rhs, >=)
  };
}

#[macro_export]
macro_rules! check_str_eq {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {{
    let outcome = $ctx.check_str(file!(), line!(), "==", stringify!($lhs), &$lhs, stringify!($rhs), &$rhs);
    if outcome.should_break {
      $crate::utils::debugger_break();
    }
    if !outcome.passed {
      return;
    }
  }};
}

#[macro_export]
macro_rules! check_str_ne {
  ($ctx:expr, $lhs:expr, $rhs:expr) => {{
    let outcome = $ctx.check_str(file!(), line!(), "!=", stringify!($lhs), &$lhs, stringify!($rhs), &$rhs);
    if outcome.should_break {
      $crate::utils::debugger_break();
    }
    if !outcome.passed {
      return;
    }
  }};
}

/// Report a formatted failure without an expression, then keep running.
#[macro_export]
macro_rules! errorf {
  ($ctx:expr, $($arg:tt)*) => {{
    if $ctx.check_expr(file!(), line!(), $crate::check::check_flags::NONE, false, &format!($($arg)*)) {
      $crate::utils::debugger_break();
    }
  }};
}
