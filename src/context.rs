//! Execution contexts handed to user test code. [`TestCtx`] lives on the
//! scheduler coroutine and may block across frames; [`GuiCtx`] runs on the
//! host thread inside the frame-end hook and must return within the frame.

use std::any::Any;
use std::sync::Arc;

use crate::check::{check_flags, StrOpOutcome};
use crate::coro::Yielder;
use crate::engine::Engine;
use crate::host::{hash_path, key_mods, ClipboardBuffer, ElemId, Key, Vec2};
use crate::inputs::SimInput;
use crate::query::ItemInfo;
use crate::test::{TestId, TestStatus, VerboseLevel};

/// Which user routine the engine is currently inside, for reentrancy and
/// logging decisions.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ActiveFunc {
  #[default]
  None,
  Gui,
  Test,
}

/// Frames a point query is retried before it is reported as not found.
const ITEM_RETRY_FRAMES: i32 = 10;

/// Per-run state bound while one test occupies the engine.
pub(crate) struct CtxData {
  pub test: TestId,
  pub run_flags: u32,
  /// Test-local frame counter; warm-up frames count negative.
  pub frame_count: i64,
  pub first_test_frame_count: i64,
  /// Wall-clock seconds of simulated time since the run began.
  pub running_time: f64,
  pub active_func: ActiveFunc,
  pub ref_path: String,
  pub ref_id: ElemId,
  pub error_counter: u32,
  /// Cooperative cancellation of this run only.
  pub abort: bool,
  pub clipboard: ClipboardBuffer,
  pub first_gui_frame: bool,
}

impl CtxData {
  pub fn new(test: TestId, run_flags: u32) -> Self {
    Self {
      test,
      run_flags,
      frame_count: 0,
      first_test_frame_count: 0,
      running_time: 0.0,
      active_func: ActiveFunc::None,
      ref_path: String::new(),
      ref_id: ElemId::NONE,
      error_counter: 0,
      abort: false,
      clipboard: Arc::default(),
      first_gui_frame: true,
    }
  }
}

/// Blocking-style test API. Every motion primitive hides one or more yields;
/// the engine lock is never held across them.
pub struct TestCtx<'a> {
  engine: Engine,
  yielder: &'a Yielder,
}

impl<'a> TestCtx<'a> {
  pub(crate) fn new(engine: Engine, yielder: &'a Yielder) -> Self {
    Self { engine, yielder }
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Suspend until the host has presented one more frame.
  pub fn yield_now(&mut self) {
    self.yielder.yield_now();
  }

  pub fn yield_frames(&mut self, count: u32) {
    for _ in 0..count {
      if self.is_aborted() {
        return;
      }
      self.yielder.yield_now();
    }
  }

  /// Simulated-clock sleep; keeps yielding until the host clock advances by
  /// `seconds`.
  pub fn sleep(&mut self, seconds: f32) {
    let deadline = {
      let state = self.engine.state();
      match state.ctx.as_ref() {
        Some(ctx) => ctx.running_time + f64::from(seconds),
        None => return,
      }
    };
    loop {
      if self.is_aborted() {
        return;
      }
      let now = self.engine.state().ctx.as_ref().map_or(f64::MAX, |c| c.running_time);
      if now >= deadline {
        return;
      }
      self.yielder.yield_now();
    }
  }

  /// Small settle delay for a human watching the run; no-op when running
  /// fast.
  pub fn sleep_short(&mut self) {
    if self.engine.state().io.run_fast {
      return;
    }
    self.sleep(0.25);
  }

  /// End the run early with a success, for tests driven by their gui routine.
  pub fn finish(&mut self) {
    let mut state = self.engine.state();
    let id = match state.ctx.as_ref() {
      Some(ctx) => ctx.test,
      None => return,
    };
    if state.tests[id.0].status == TestStatus::Running {
      state.tests[id.0].status = TestStatus::Success;
    }
  }

  pub fn abort(&mut self) {
    if let Some(ctx) = self.engine.state().ctx.as_mut() {
      ctx.abort = true;
    }
  }

  pub fn is_aborted(&self) -> bool {
    let state = self.engine.state();
    state.abort || state.ctx.as_ref().is_some_and(|c| c.abort)
  }

  pub fn is_error(&self) -> bool {
    let state = self.engine.state();
    state.ctx.as_ref().is_some_and(|c| state.tests[c.test.0].status == TestStatus::Error)
  }

  pub fn error_counter(&self) -> u32 {
    self.engine.state().ctx.as_ref().map_or(0, |c| c.error_counter)
  }

  /// Test-local frame counter; negative during warm-up.
  pub fn frame_count(&self) -> i64 {
    self.engine.state().ctx.as_ref().map_or(0, |c| c.frame_count)
  }

  /// Anchor subsequent relative paths. `//`-prefixed paths reset to the
  /// root scope.
  pub fn set_ref(&mut self, path: &str) {
    let mut state = self.engine.state();
    let Some(ctx) = state.ctx.as_mut() else { return };
    let base = ctx.ref_id;
    ctx.ref_id = hash_path(path, base);
    ctx.ref_path = path.to_string();
  }

  fn ref_id(&self) -> ElemId {
    self.engine.state().ctx.as_ref().map_or(ElemId::NONE, |c| c.ref_id)
  }

  /// Resolve a path to live element state, yielding until the element has
  /// been submitted or the retry window closes. Supports one `**/` wildcard.
  pub fn item_info(&mut self, path: &str) -> Option<ItemInfo> {
    if self.is_aborted() {
      return None;
    }
    let id = match path.split_once("**/") {
      Some((prefix, suffix)) => self.resolve_wildcard(prefix, suffix)?,
      None => hash_path(path, self.ref_id()),
    };
    let info = self.poll_item(id, path);
    if info.is_none() {
      let mut state = self.engine.state();
      state.log(VerboseLevel::Error, format!("Unable to locate item: '{path}'"));
    }
    info
  }

  /// Like [`TestCtx::item_info`] but silent when the element never appears.
  pub fn item_info_opt(&mut self, path: &str) -> Option<ItemInfo> {
    if self.is_aborted() {
      return None;
    }
    let id = match path.split_once("**/") {
      Some((prefix, suffix)) => self.resolve_wildcard(prefix, suffix)?,
      None => hash_path(path, self.ref_id()),
    };
    self.poll_item(id, path)
  }

  /// Poll a concrete id without path resolution.
  pub fn item_info_by_id(&mut self, id: ElemId) -> Option<ItemInfo> {
    self.poll_item(id, "")
  }

  fn poll_item(&mut self, id: ElemId, debug_name: &str) -> Option<ItemInfo> {
    for _ in 0..=ITEM_RETRY_FRAMES {
      if let Some(info) = self.engine.find_item_info(id, debug_name) {
        return Some(info);
      }
      if self.is_aborted() {
        return None;
      }
      self.yielder.yield_now();
    }
    None
  }

  fn resolve_wildcard(&mut self, prefix: &str, suffix: &str) -> Option<ElemId> {
    let prefix_id = if prefix.is_empty() { self.ref_id() } else { hash_path(prefix, self.ref_id()) };
    {
      let mut state = self.engine.state();
      if state.label_task.is_some() {
        state.log(VerboseLevel::Error, "Only one label lookup may run at a time".to_string());
        return None;
      }
      state.label_task = Some(crate::query::FindByLabelTask::new(prefix_id, suffix, 0));
    }
    let mut found = None;
    for _ in 0..=ITEM_RETRY_FRAMES {
      if self.is_aborted() {
        break;
      }
      self.yielder.yield_now();
      found = self.engine.state().label_task.as_ref().and_then(|t| t.out_id);
      if found.is_some() {
        break;
      }
    }
    self.engine.state().label_task = None;
    found
  }

  /// Collect a subtree of elements below `parent`. Exclusive; a second
  /// concurrent gather is an error.
  pub fn gather_items(&mut self, parent: &str, depth: i32) -> crate::query::ItemList {
    let parent_id = hash_path(parent, self.ref_id());
    {
      let mut state = self.engine.state();
      if state.gather_task.is_some() {
        state.log(VerboseLevel::Error, "Only one gather may run at a time".to_string());
        return crate::query::ItemList::default();
      }
      state.gather_task = Some(crate::query::GatherTask::new(parent_id, depth));
    }
    // Two frames: one for the task to become visible to the hooks, one for a
    // full submission pass.
    self.yield_frames(2);
    let mut state = self.engine.state();
    state.gather_task.take().map(|t| t.out).unwrap_or_default()
  }

  /// Move the simulated pointer over an element and wait for the hover to
  /// be observed.
  pub fn pointer_to(&mut self, path: &str) -> Option<ItemInfo> {
    if self.is_aborted() {
      return None;
    }
    let info = self.item_info(path)?;
    let target = if info.rect_clipped.width() > 0.0 { info.rect_clipped.center() } else { info.rect_full.center() };
    self.pointer_to_pos(target);
    Some(info)
  }

  pub fn pointer_to_pos(&mut self, target: Vec2) {
    let run_fast = self.engine.state().io.run_fast;
    if run_fast {
      self.engine.state().inputs.pos = target;
      // One frame to merge, one for the host to resolve hover.
      self.yield_frames(2);
      return;
    }
    loop {
      if self.is_aborted() {
        return;
      }
      let arrived = {
        let mut state = self.engine.state();
        let speed = state.io.mouse_speed;
        let dt = state.last_delta_time.max(1.0 / 60.0);
        let pos = state.inputs.pos;
        let (dx, dy) = (target.x - pos.x, target.y - pos.y);
        let dist = (dx * dx + dy * dy).sqrt();
        let step = speed * dt;
        if dist <= step {
          state.inputs.pos = target;
          true
        } else {
          state.inputs.pos = Vec2::new(pos.x + dx / dist * step, pos.y + dy / dist * step);
          false
        }
      };
      self.yielder.yield_now();
      if arrived {
        self.yielder.yield_now();
        return;
      }
    }
  }

  pub fn mouse_down(&mut self, button: u32) {
    self.engine.state().inputs.buttons |= button;
    self.yield_frames(1);
  }

  pub fn mouse_up(&mut self, button: u32) {
    self.engine.state().inputs.buttons &= !button;
    self.yield_frames(1);
  }

  /// Move over an element and left-click it.
  pub fn item_click(&mut self, path: &str) {
    if self.pointer_to(path).is_none() {
      return;
    }
    self.mouse_down(crate::host::mouse_buttons::LEFT);
    self.mouse_up(crate::host::mouse_buttons::LEFT);
    // Let activation side effects settle.
    self.yield_frames(1);
    self.sleep_short();
  }

  pub fn key_down(&mut self, key: Key, mods: u32) {
    self.engine.state().inputs.queue.push(SimInput::Key { key, mods, down: true });
    self.yield_frames(1);
  }

  pub fn key_up(&mut self, key: Key, mods: u32) {
    self.engine.state().inputs.queue.push(SimInput::Key { key, mods, down: false });
    self.yield_frames(1);
  }

  pub fn key_press(&mut self, key: Key) {
    self.key_chord(key, key_mods::NONE);
  }

  pub fn key_chord(&mut self, key: Key, mods: u32) {
    if mods != key_mods::NONE {
      self.engine.state().inputs.queue.push(SimInput::Mods { mods, down: true });
    }
    self.key_down(key, mods);
    self.key_up(key, mods);
    if mods != key_mods::NONE {
      self.engine.state().inputs.queue.push(SimInput::Mods { mods, down: false });
      self.yield_frames(1);
    }
  }

  /// Type characters one per frame, paced by `typing_speed` when not running
  /// fast.
  pub fn type_text(&mut self, text: &str) {
    let (run_fast, pace) = {
      let state = self.engine.state();
      (state.io.run_fast, 1.0 / state.io.typing_speed.max(1.0))
    };
    for ch in text.chars() {
      if self.is_aborted() {
        return;
      }
      self.engine.state().inputs.queue.push(SimInput::Char(ch));
      self.yielder.yield_now();
      if !run_fast {
        self.sleep(pace);
      }
    }
  }

  pub fn scroll(&mut self, delta: Vec2) {
    {
      let mut state = self.engine.state();
      state.inputs.wheel.x += delta.x;
      state.inputs.wheel.y += delta.y;
    }
    self.yield_frames(1);
  }

  pub fn clipboard_text(&self) -> String {
    let buf = self.engine.state().ctx.as_ref().map(|c| c.clipboard.clone());
    match buf {
      Some(buf) => buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone(),
      None => String::new(),
    }
  }

  pub fn set_clipboard_text(&mut self, text: &str) {
    let buf = self.engine.state().ctx.as_ref().map(|c| c.clipboard.clone());
    if let Some(buf) = buf {
      *buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = text.to_string();
    }
  }

  /// One still capture; blocks until the backend resolves it.
  pub fn capture_screenshot(&mut self, output_file: &str) -> bool {
    if !self.engine.begin_capture(output_file, false) {
      return false;
    }
    while self.engine.state().capture.in_progress {
      if self.is_aborted() {
        break;
      }
      self.yielder.yield_now();
    }
    true
  }

  pub fn begin_video_capture(&mut self, output_file: &str) -> bool {
    self.engine.begin_capture(output_file, true)
  }

  pub fn end_video_capture(&mut self) {
    self.engine.end_capture();
  }

  pub fn log_error(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Error, text.into());
  }

  pub fn log_warning(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Warning, text.into());
  }

  pub fn log_info(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Info, text.into());
  }

  pub fn log_debug(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Debug, text.into());
  }

  /// Borrow the typed per-run state block.
  pub fn with_vars<T: 'static, R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    let mut vars = self.engine.state().user_vars.take()?;
    let result = vars.downcast_mut::<T>().map(f);
    self.engine.state().user_vars = Some(vars);
    result
  }

  pub fn check_expr(&mut self, file: &str, line: u32, flags: u32, result: bool, expr: &str) -> bool {
    self.engine.check(file, line, flags, result, expr)
  }

  pub fn check_str(&mut self, file: &str, line: u32, op: &str, lhs_var: &str, lhs: &str, rhs_var: &str, rhs: &str) -> StrOpOutcome {
    self.engine.check_str_op(file, line, check_flags::NONE, op, lhs_var, lhs, rhs_var, rhs)
  }
}

/// Frame-scoped context for the gui routine. No yielding: the routine is
/// called once per frame and must return. The host's UI builder rides along
/// as an opaque slot so gui routines can submit elements through it.
pub struct GuiCtx<'a> {
  engine: Engine,
  ui: &'a mut dyn Any,
}

impl<'a> GuiCtx<'a> {
  pub(crate) fn new(engine: Engine, ui: &'a mut dyn Any) -> Self {
    Self { engine, ui }
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Downcast the host's UI builder. Returns None when the gui routine runs
  /// under a different host binding than it was written for.
  pub fn ui<T: 'static>(&mut self) -> Option<&mut T> {
    self.ui.downcast_mut::<T>()
  }

  /// True only on the first frame the gui routine runs for this test.
  pub fn is_first_gui_frame(&self) -> bool {
    self.engine.state().ctx.as_ref().is_some_and(|c| c.first_gui_frame)
  }

  pub fn is_aborted(&self) -> bool {
    let state = self.engine.state();
    state.abort || state.ctx.as_ref().is_some_and(|c| c.abort)
  }

  /// Mark a still-running test successful; the normal way out of a
  /// gui-driven (`NO_AUTO_FINISH`) test.
  pub fn finish(&mut self) {
    let mut state = self.engine.state();
    let id = match state.ctx.as_ref() {
      Some(ctx) => ctx.test,
      None => return,
    };
    if state.tests[id.0].status == TestStatus::Running {
      state.tests[id.0].status = TestStatus::Success;
    }
  }

  pub fn log_error(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Error, text.into());
  }

  pub fn log_info(&mut self, text: impl Into<String>) {
    self.engine.state().log(VerboseLevel::Info, text.into());
  }

  pub fn with_vars<T: 'static, R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    let mut vars = self.engine.state().user_vars.take()?;
    let result = vars.downcast_mut::<T>().map(f);
    self.engine.state().user_vars = Some(vars);
    result
  }

  pub fn check_expr(&mut self, file: &str, line: u32, flags: u32, result: bool, expr: &str) -> bool {
    self.engine.check(file, line, flags, result, expr)
  }

  pub fn check_str(&mut self, file: &str, line: u32, op: &str, lhs_var: &str, lhs: &str, rhs_var: &str, rhs: &str) -> StrOpOutcome {
    self.engine.check_str_op(file, line, check_flags::NONE, op, lhs_var, lhs, rhs_var, rhs)
  }
}
