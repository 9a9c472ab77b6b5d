//! The scheduler. Owns the test registry, the run queue, the coroutine the
//! queue drains on, and the per-frame reconciliation with the host.
//!
//! Locking rule: the engine lock is scoped to straight-line sections and is
//! never held across a coroutine yield or a user-routine call.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use color_eyre::eyre::Result;

use crate::capture::{capture_flags, CaptureArgs, CaptureBackend, NullCapture};
use crate::config::{EngineIo, ExportFormat};
use crate::context::{ActiveFunc, CtxData, GuiCtx, TestCtx};
use crate::coro::{Coroutine, CoroutineBackend, ThreadCoroutineBackend, Yielder};
use crate::export;
use crate::filter::TestFilter;
use crate::host::{ClipboardBuffer, ElemId, HostIntrospect, Rect, UiHost};
use crate::inputs::{self, SimulatedInputs, ABORT_HOLD_SECS};
use crate::query::{
  gather_depth, match_label_task, trim_label, FindByLabelTask, GatherTask, InfoTask, ItemInfo,
  ITEM_TASK_ELAPSE_FRAMES,
};
use crate::settings::PersistedSettings;
use crate::test::{
  run_flags, test_flags, RunTask, Test, TestId, TestStatus, VerboseLevel,
};
use crate::watchdog::{self, WatchdogAction, WatchdogLimits};

/// Host-side effects requested by the coroutine, executed on the host thread
/// at the next frame-begin hook.
pub(crate) enum HostOp {
  BeginTest { clipboard: ClipboardBuffer },
  EndTest,
}

pub(crate) struct CaptureState {
  pub in_progress: bool,
  pub is_video: bool,
  pub args: Option<CaptureArgs>,
  pub backend: Box<dyn CaptureBackend>,
}

pub(crate) struct EngineState {
  pub io: EngineIo,
  pub tests: Vec<Test>,
  pub queue: VecDeque<RunTask>,
  /// Host frame counter mirrored at frame-begin; hook timestamps use this.
  pub frame_count: i64,
  pub last_delta_time: f32,
  /// Engine-wide abort: stops the current test and drains the queue.
  pub abort: bool,
  pub coroutine_should_exit: bool,
  pub started: bool,
  pub hooking_wanted: bool,
  pub ctx: Option<CtxData>,
  pub inputs: SimulatedInputs,
  pub info_tasks: Vec<InfoTask>,
  pub gather_task: Option<GatherTask>,
  pub label_task: Option<FindByLabelTask>,
  pub pending_host_ops: Vec<HostOp>,
  pub capture: CaptureState,
  pub batch_start_time: i64,
  pub batch_end_time: i64,
  pub user_vars: Option<Box<dyn Any + Send>>,
  pub persisted: PersistedSettings,
}

impl EngineState {
  /// Append to the running test's log and mirror to the tracing pipeline at
  /// the configured verbosity.
  pub fn log(&mut self, level: VerboseLevel, text: String) {
    if level <= self.io.verbose_level {
      match level {
        VerboseLevel::Silent => {},
        VerboseLevel::Error => tracing::error!("{text}"),
        VerboseLevel::Warning => tracing::warn!("{text}"),
        VerboseLevel::Info => tracing::info!("{text}"),
        VerboseLevel::Debug => tracing::debug!("{text}"),
        VerboseLevel::Trace => tracing::trace!("{text}"),
      }
    }
    if let Some(ctx) = self.ctx.as_ref() {
      self.tests[ctx.test.0].log.append(level, text);
    }
  }

  fn refresh_hooking(&mut self) {
    self.hooking_wanted =
      !self.info_tasks.is_empty() || self.gather_task.is_some() || self.label_task.is_some();
  }
}

struct EngineShared {
  state: Mutex<EngineState>,
  coroutine: Mutex<Option<Box<dyn Coroutine>>>,
  backend: Box<dyn CoroutineBackend + Send + Sync>,
}

/// Cheap cloneable handle; all clones share one scheduler.
#[derive(Clone)]
pub struct Engine {
  shared: Arc<EngineShared>,
}

/// Batch outcome counts for exit codes and the end-of-run banner.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ResultSummary {
  pub count_tested: usize,
  pub count_success: usize,
  pub count_remaining: usize,
}

fn now_micros() -> i64 {
  chrono::Utc::now().timestamp_micros()
}

impl Engine {
  pub fn new(io: EngineIo) -> Self {
    Self::with_capture_backend(io, Box::new(NullCapture))
  }

  pub fn with_capture_backend(io: EngineIo, capture: Box<dyn CaptureBackend>) -> Self {
    let state = EngineState {
      io,
      tests: Vec::new(),
      queue: VecDeque::new(),
      frame_count: 0,
      last_delta_time: 0.0,
      abort: false,
      coroutine_should_exit: false,
      started: false,
      hooking_wanted: false,
      ctx: None,
      inputs: SimulatedInputs::default(),
      info_tasks: Vec::new(),
      gather_task: None,
      label_task: None,
      pending_host_ops: Vec::new(),
      capture: CaptureState { in_progress: false, is_video: false, args: None, backend: capture },
      batch_start_time: 0,
      batch_end_time: 0,
      user_vars: None,
      persisted: PersistedSettings::default(),
    };
    Self {
      shared: Arc::new(EngineShared {
        state: Mutex::new(state),
        coroutine: Mutex::new(None),
        backend: Box::new(ThreadCoroutineBackend),
      }),
    }
  }

  pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
    self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn coroutine(&self) -> MutexGuard<'_, Option<Box<dyn Coroutine>>> {
    self.shared.coroutine.lock().unwrap_or_else(PoisonError::into_inner)
  }

  // ---- lifecycle ----

  /// Spawn the scheduler coroutine. Idempotent.
  pub fn start(&self) {
    {
      let mut state = self.state();
      if state.started {
        return;
      }
      state.started = true;
      state.coroutine_should_exit = false;
    }
    let engine = self.clone();
    let coroutine =
      self.shared.backend.spawn("uiprobe-queue", Box::new(move |yielder| engine.queue_main(yielder)));
    *self.coroutine() = Some(coroutine);
    tracing::debug!("engine started");
  }

  /// Abort everything and reclaim the coroutine.
  pub fn stop(&self) {
    {
      let mut state = self.state();
      if !state.started {
        return;
      }
      state.coroutine_should_exit = true;
      state.abort = true;
      if let Some(ctx) = state.ctx.as_mut() {
        ctx.abort = true;
      }
    }
    if let Some(mut coroutine) = self.coroutine().take() {
      coroutine.stop_and_join();
    }
    self.state().started = false;
    tracing::debug!("engine stopped");
  }

  /// Stop and flush result exports. For the host's shutdown hook.
  pub fn shutdown(&self) {
    self.stop();
    if let Err(err) = self.export_results() {
      tracing::error!("result export failed: {err}");
    }
  }

  pub fn is_started(&self) -> bool {
    self.state().started
  }

  // ---- registry and queue ----

  pub fn register(&self, test: Test) -> TestId {
    let mut state = self.state();
    let id = TestId(state.tests.len());
    state.tests.push(test);
    id
  }

  pub fn test_count(&self) -> usize {
    self.state().tests.len()
  }

  pub fn test_status(&self, id: TestId) -> TestStatus {
    self.state().tests[id.0].status
  }

  /// Read-only pass over the registry, for listings and reporting.
  pub fn with_tests<R>(&self, f: impl FnOnce(&[Test]) -> R) -> R {
    f(&self.state().tests)
  }

  pub fn queue_test(&self, id: TestId, run_flags: u32) {
    let mut state = self.state();
    if !state.started {
      tracing::error!("queue_test before start; ignoring");
      return;
    }
    let test = &mut state.tests[id.0];
    if matches!(test.status, TestStatus::Queued | TestStatus::Running) {
      tracing::warn!("test '{}' is already queued or running", test.name);
      return;
    }
    test.status = TestStatus::Queued;
    state.queue.push_back(RunTask { test: id, run_flags });
  }

  /// Queue every registered test matching the filter; returns the count.
  pub fn queue_tests(&self, filter: &TestFilter, run_flags: u32) -> usize {
    let matching: Vec<TestId> = {
      let state = self.state();
      state
        .tests
        .iter()
        .enumerate()
        .filter(|(_, t)| filter.matches(t.group, &t.category, &t.name))
        .map(|(i, _)| TestId(i))
        .collect()
    };
    for id in &matching {
      self.queue_test(*id, run_flags);
    }
    matching.len()
  }

  pub fn is_running_tests(&self) -> bool {
    let state = self.state();
    state.ctx.is_some() || !state.queue.is_empty()
  }

  /// Cooperatively cancel the test currently holding the engine.
  pub fn abort_current_test(&self) {
    if let Some(ctx) = self.state().ctx.as_mut() {
      ctx.abort = true;
    }
  }

  /// Cancel the current test and drain the queue. Cancellation is
  /// cooperative; returns true once nothing is running anymore.
  pub fn try_abort_engine(&self) -> bool {
    let mut state = self.state();
    state.abort = true;
    if let Some(ctx) = state.ctx.as_mut() {
      ctx.abort = true;
      return false;
    }
    state.queue.is_empty()
  }

  pub fn with_io<R>(&self, f: impl FnOnce(&mut EngineIo) -> R) -> R {
    f(&mut self.state().io)
  }

  // ---- frame hooks (host thread) ----

  /// First engine touch of a new frame, before the host dispatches input.
  pub fn on_frame_begin(&self, host: &mut dyn UiHost) {
    let mut state = self.state();
    if !state.started {
      return;
    }
    if state.io.fixed_delta_time > 0.0 {
      host.override_delta_time(state.io.fixed_delta_time);
    }
    state.frame_count = host.frame_count();
    let dt = if state.io.fixed_delta_time > 0.0 { state.io.fixed_delta_time } else { host.delta_time() };
    state.last_delta_time = dt;

    // Hold-to-abort on the real keyboard, usable even while input is
    // simulated.
    if host.abort_key_down() {
      if state.inputs.abort_hold < 0.0 {
        state.inputs.abort_hold = 0.0;
      } else {
        state.inputs.abort_hold += dt;
      }
      if state.inputs.abort_hold >= ABORT_HOLD_SECS {
        if let Some(ctx) = state.ctx.as_mut() {
          ctx.abort = true;
        } else {
          state.abort = true;
        }
      }
    } else {
      state.inputs.abort_hold = -1.0;
    }

    self.advance_test_clock(&mut state, host, dt);

    for op in std::mem::take(&mut state.pending_host_ops) {
      match op {
        HostOp::BeginTest { clipboard } => {
          host.snapshot_io_style();
          host.set_clipboard_backend(Some(clipboard));
        },
        HostOp::EndTest => {
          host.set_clipboard_backend(None);
          host.restore_io_style();
        },
      }
    }

    let active = match state.ctx.as_ref() {
      Some(ctx) => {
        state.tests[ctx.test.0].status == TestStatus::Running
          && ctx.run_flags & (run_flags::GUI_FUNC_ONLY | run_flags::ENABLE_RAW_INPUTS) == 0
      },
      None => false,
    };
    let swap = state.io.swap_wheel_axes_with_shift;
    inputs::apply_to_host(&mut state.inputs, host, active, swap);

    state.refresh_hooking();
    state.io.running_tests = state.ctx.is_some() || !state.queue.is_empty();
    state.io.render_want_max_speed =
      state.io.no_throttle || (state.io.run_fast && state.io.running_tests);
  }

  /// Advance the running test's clock and arm the watchdog tiers.
  fn advance_test_clock(&self, state: &mut EngineState, host: &dyn UiHost, dt: f32) {
    let run_fast = state.io.run_fast;
    let run_with_gui = state.io.run_with_gui;
    let Some(ctx) = state.ctx.as_mut() else { return };
    ctx.frame_count += 1;
    let t0 = ctx.running_time;
    ctx.running_time += f64::from(dt);
    let t1 = ctx.running_time;
    let id = ctx.test;
    let manual = ctx.run_flags & run_flags::MANUAL_RUN != 0;
    if !run_fast || manual || host.debugger_attached() {
      return;
    }
    let limits = WatchdogLimits::new(run_with_gui);
    match watchdog::evaluate(t0, t1, &limits) {
      Some(WatchdogAction::Warn) => {
        let warn = limits.warn;
        state.log(
          VerboseLevel::Warning,
          format!("Test has been running for over {warn:.0} seconds, may be stuck"),
        );
      },
      Some(WatchdogAction::KillTest) => {
        state.tests[id.0].status = TestStatus::Error;
        if let Some(ctx) = state.ctx.as_mut() {
          ctx.abort = true;
        }
        let kill = limits.kill_test;
        state.log(VerboseLevel::Error, format!("Watchdog: test exceeded {kill:.0} seconds, aborting"));
      },
      Some(WatchdogAction::KillProcess) => {
        tracing::error!("Watchdog: test did not respond to abort, terminating process");
        std::process::exit(1);
      },
      None => {},
    }
  }

  /// Run the bound test's gui routine. The host calls this while its frame
  /// is open, handing over its UI builder.
  pub fn run_gui_func(&self, ui: &mut dyn Any) {
    let taken = {
      let mut state = self.state();
      let Some(ctx) = state.ctx.as_mut() else { return };
      if ctx.run_flags & run_flags::GUI_FUNC_DISABLE != 0 {
        return;
      }
      ctx.active_func = ActiveFunc::Gui;
      let id = ctx.test;
      state.tests[id.0].gui_func.take().map(|f| (id, f))
    };
    let Some((id, mut func)) = taken else {
      if let Some(ctx) = self.state().ctx.as_mut() {
        ctx.active_func = ActiveFunc::None;
      }
      return;
    };
    // Called with no lock held; the routine may freely use check/log/vars.
    let mut gui_ctx = GuiCtx::new(self.clone(), ui);
    func(&mut gui_ctx);
    let mut state = self.state();
    state.tests[id.0].gui_func = Some(func);
    if let Some(ctx) = state.ctx.as_mut() {
      ctx.active_func = ActiveFunc::None;
      ctx.first_gui_frame = false;
    }
  }

  /// Last engine touch of the frame: recovery, task GC, one coroutine step.
  pub fn on_frame_end(&self, host: &mut dyn UiHost) {
    if !self.state().started {
      return;
    }
    self.poll_capture();

    let leftovers = host.recover_unterminated_blocks();
    if !leftovers.is_empty() {
      let mut state = self.state();
      let warn = state
        .ctx
        .as_ref()
        .map(|c| state.tests[c.test.0].flags & test_flags::NO_RECOVER_WARNINGS == 0)
        .unwrap_or(false);
      if warn {
        for label in leftovers {
          state.log(VerboseLevel::Warning, format!("Recovered from missing end of '{label}'"));
        }
      }
    }

    {
      let mut state = self.state();
      let frame = state.frame_count;
      state
        .info_tasks
        .retain(|t| t.ref_count > 0 || frame - t.frame_count < ITEM_TASK_ELAPSE_FRAMES);
      state.refresh_hooking();
    }

    // Exactly one scheduler step per presented frame.
    if let Some(coroutine) = self.coroutine().as_mut() {
      coroutine.resume();
    }

    let mut state = self.state();
    state.refresh_hooking();
    state.io.running_tests = state.ctx.is_some() || !state.queue.is_empty();
  }

  // ---- element hooks (host thread, during frame build) ----

  /// Whether the host should bother calling the element hooks this frame.
  pub fn hooking_wanted(&self) -> bool {
    self.state().hooking_wanted
  }

  /// Structural registration of one submitted element.
  pub fn on_element_registered(&self, host: &dyn HostIntrospect, id: ElemId, rect: Rect) {
    let mut state = self.state();
    if !state.hooking_wanted {
      return;
    }
    let frame = state.frame_count;
    let parent = host.id_stack().last().copied().unwrap_or(ElemId::NONE);
    let clipped = rect.clipped_to(&host.clip_rect());

    for task in &mut state.info_tasks {
      if task.id != id {
        continue;
      }
      let result = &mut task.result;
      result.id = id;
      result.parent_id = parent;
      result.window = Some(host.current_window());
      result.rect_full = rect;
      result.rect_clipped = clipped;
      result.nav_layer = host.nav_layer();
      result.timestamp_main = frame;
    }

    if let Some(gather) = state.gather_task.as_mut() {
      match gather_depth(gather.depth, gather.parent_id, id, host.id_stack()) {
        Some(depth) => {
          let item = gather.out.entry(id).or_default();
          item.id = id;
          item.parent_id = parent;
          item.window = Some(host.current_window());
          item.rect_full = rect;
          item.rect_clipped = clipped;
          item.nav_layer = host.nav_layer();
          item.depth = depth;
          item.timestamp_main = frame;
          gather.last_item = Some(id);
        },
        None => gather.last_item = None,
      }
    }
  }

  /// Status resolution of one element, after the host computed interaction
  /// flags and the display label.
  pub fn on_element_status(&self, host: &dyn HostIntrospect, id: ElemId, label: &str, status_flags: u32) {
    let mut state = self.state();
    if !state.hooking_wanted {
      return;
    }
    let frame = state.frame_count;

    for task in &mut state.info_tasks {
      if task.id != id {
        continue;
      }
      task.result.status_flags = status_flags;
      task.result.timestamp_status = frame;
      task.result.debug_label = trim_label(label);
    }

    if let Some(gather) = state.gather_task.as_mut() {
      if gather.last_item == Some(id) {
        if let Some(item) = gather.out.get_mut(&id) {
          item.status_flags = status_flags;
          item.timestamp_status = frame;
          item.debug_label = trim_label(label);
        }
      }
    }

    if let Some(task) = state.label_task.as_mut() {
      if task.out_id.is_none() && match_label_task(task, host, id, label, status_flags) {
        task.out_id = Some(id);
      }
    }
  }

  // ---- queries (coroutine thread) ----

  /// Poll a point query, creating and renewing its task. Returns the result
  /// only while it is at most two frames stale.
  pub(crate) fn find_item_info(&self, id: ElemId, debug_name: &str) -> Option<ItemInfo> {
    let mut state = self.state();
    let frame = state.frame_count;
    for task in &mut state.info_tasks {
      if task.id != id {
        continue;
      }
      task.frame_count = frame;
      if task.result.timestamp_main + 2 >= frame {
        return Some(task.result.clone());
      }
      return None;
    }
    state.info_tasks.push(InfoTask::new(id, debug_name, frame));
    state.refresh_hooking();
    None
  }

  /// Pin a point-query task so it survives collection while a caller holds
  /// on to its result across frames.
  pub fn item_retain(&self, id: ElemId) {
    let mut state = self.state();
    for task in &mut state.info_tasks {
      if task.id == id {
        task.ref_count += 1;
      }
    }
  }

  pub fn item_release(&self, id: ElemId) {
    let mut state = self.state();
    for task in &mut state.info_tasks {
      if task.id == id {
        task.ref_count = task.ref_count.saturating_sub(1);
      }
    }
  }

  // ---- capture ----

  pub(crate) fn begin_capture(&self, output_file: &str, is_video: bool) -> bool {
    let mut state = self.state();
    if !state.io.capture_enabled {
      return false;
    }
    if state.capture.in_progress {
      state.log(VerboseLevel::Error, "A capture is already in progress".to_string());
      return false;
    }
    let args = CaptureArgs {
      rect: Rect::default(),
      output_file: output_file.to_string(),
      flags: capture_flags::NONE,
      out_saved_file: String::new(),
    };
    if let Err(err) = state.capture.backend.begin(&args) {
      state.log(VerboseLevel::Error, format!("Capture failed to start: {err}"));
      return false;
    }
    state.capture.args = Some(args);
    state.capture.in_progress = true;
    state.capture.is_video = is_video;
    true
  }

  pub(crate) fn end_capture(&self) {
    let mut state = self.state();
    if let Some(args) = state.capture.args.take() {
      if let Err(err) = state.capture.backend.end(&args) {
        tracing::warn!("capture finalize failed: {err}");
      }
    }
    state.capture.in_progress = false;
    state.capture.is_video = false;
  }

  // ---- scheduler (coroutine thread) ----

  fn queue_main(&self, yielder: &Yielder) {
    loop {
      if self.state().coroutine_should_exit {
        break;
      }
      if !self.state().queue.is_empty() {
        self.process_test_queue(yielder);
      }
      yielder.yield_now();
    }
  }

  fn process_test_queue(&self, yielder: &Yielder) {
    {
      let mut state = self.state();
      state.batch_start_time = now_micros();
      state.io.running_tests = true;
    }
    loop {
      let task = {
        let mut state = self.state();
        if state.abort {
          // Everything still queued is reported as never run.
          while let Some(t) = state.queue.pop_front() {
            state.tests[t.test.0].status = TestStatus::Unknown;
          }
        }
        state.queue.pop_front()
      };
      let Some(task) = task else { break };
      self.run_one(yielder, task);
    }
    let mut state = self.state();
    state.batch_end_time = now_micros();
    state.io.running_tests = false;
    state.abort = false;
  }

  /// Bind one test to the engine, run it, unbind.
  fn run_one(&self, yielder: &Yielder, task: RunTask) {
    let id = task.test;
    {
      let mut state = self.state();
      let clipboard: ClipboardBuffer = Arc::default();
      state.user_vars = state.tests[id.0].vars_ctor.as_ref().map(|ctor| ctor());
      let mut ctx = CtxData::new(id, task.run_flags);
      ctx.clipboard = clipboard.clone();
      state.inputs.clear();
      state.pending_host_ops.push(HostOp::BeginTest { clipboard });
      let test = &mut state.tests[id.0];
      test.status = TestStatus::Running;
      test.log.clear();
      test.start_time = now_micros();
      let header = format!("Test: '{}' '{}'..", test.category, test.name);
      state.ctx = Some(ctx);
      state.log(VerboseLevel::Info, "--------------------------------".to_string());
      state.log(VerboseLevel::Info, header);
    }

    self.run_test_body(yielder, task);

    let mut state = self.state();
    state.tests[id.0].end_time = now_micros();
    state.user_vars = None;
    state.ctx = None;
    state.gather_task = None;
    state.label_task = None;
    state.inputs.clear();
    state.pending_host_ops.push(HostOp::EndTest);
  }

  fn test_aborted(&self) -> bool {
    let state = self.state();
    state.abort || state.ctx.as_ref().is_some_and(|c| c.abort)
  }

  fn run_test_body(&self, yielder: &Yielder, task: RunTask) {
    let id = task.test;
    let flags = self.state().tests[id.0].flags;

    // Two warm-up frames let the gui routine build stable state before the
    // test routine observes it. They count negative on the test clock.
    if flags & test_flags::NO_WARM_UP == 0 {
      if let Some(ctx) = self.state().ctx.as_mut() {
        ctx.frame_count -= 2;
      }
      yielder.yield_now();
      if self.test_status(id) == TestStatus::Running {
        yielder.yield_now();
      }
    }
    if let Some(ctx) = self.state().ctx.as_mut() {
      ctx.first_test_frame_count = ctx.frame_count;
    }

    if task.run_flags & run_flags::GUI_FUNC_ONLY != 0 {
      // Interactive probe: only the gui routine runs, until aborted.
      while !self.test_aborted() && self.test_status(id) == TestStatus::Running {
        yielder.yield_now();
      }
    } else {
      let func = self.state().tests[id.0].test_func.take();
      if let Some(mut func) = func {
        if let Some(ctx) = self.state().ctx.as_mut() {
          ctx.active_func = ActiveFunc::Test;
        }
        let mut test_ctx = TestCtx::new(self.clone(), yielder);
        func(&mut test_ctx);
        let mut state = self.state();
        state.tests[id.0].test_func = Some(func);
        if let Some(ctx) = state.ctx.as_mut() {
          ctx.active_func = ActiveFunc::None;
        }
      } else if flags & test_flags::NO_AUTO_FINISH != 0 {
        // Gui-driven test: runs until its gui routine calls finish().
        while self.test_status(id) == TestStatus::Running && !self.test_aborted() {
          yielder.yield_now();
        }
      }
    }

    let want_error_capture = {
      let state = self.state();
      state.tests[id.0].status == TestStatus::Error
        && state.io.capture_on_error
        && state.io.capture_enabled
        && !state.capture.in_progress
    };
    if want_error_capture {
      let output = {
        let state = self.state();
        let test = &state.tests[id.0];
        format!("output/failures/{}_{}.png", test.category, test.name)
      };
      if self.begin_capture(&output, false) {
        while self.state().capture.in_progress && !self.test_aborted() {
          yielder.yield_now();
        }
      }
    }

    // Keep presenting the gui for a human to inspect, until abort.
    while self.state().io.keep_gui_func && !self.test_aborted() {
      yielder.yield_now();
    }

    {
      let mut state = self.state();
      let aborted = state.abort || state.ctx.as_ref().is_some_and(|c| c.abort);
      let test = &mut state.tests[id.0];
      if test.status == TestStatus::Running {
        test.status = TestStatus::Success;
      }
      if aborted && test.status != TestStatus::Error {
        test.status = TestStatus::Unknown;
      }
      let status = test.status;
      let name = test.name.clone();
      match status {
        TestStatus::Success => {
          if task.run_flags & run_flags::NO_SUCCESS_MSG == 0 {
            state.log(VerboseLevel::Info, "Success.".to_string());
          }
        },
        TestStatus::Unknown => state.log(VerboseLevel::Warning, "Aborted.".to_string()),
        _ => state.log(VerboseLevel::Error, format!("'{name}' test failed.")),
      }
    }

    // Two trailing frames with the gui routine disabled, so the host settles
    // without test content before io/style are restored.
    if let Some(ctx) = self.state().ctx.as_mut() {
      ctx.run_flags |= run_flags::GUI_FUNC_DISABLE;
    }
    yielder.yield_now();
    yielder.yield_now();
  }

  // ---- results ----

  pub fn result_summary(&self) -> ResultSummary {
    let state = self.state();
    let mut summary = ResultSummary::default();
    for test in &state.tests {
      match test.status {
        TestStatus::Unknown => {},
        TestStatus::Queued | TestStatus::Running => summary.count_remaining += 1,
        TestStatus::Success => {
          summary.count_tested += 1;
          summary.count_success += 1;
        },
        TestStatus::Error | TestStatus::Suspended => summary.count_tested += 1,
      }
    }
    summary
  }

  pub fn print_result_summary(&self) {
    let summary = self.result_summary();
    let failing: Vec<(String, String)> = {
      let state = self.state();
      state
        .tests
        .iter()
        .filter(|t| t.status == TestStatus::Error)
        .map(|t| (t.category.clone(), t.name.clone()))
        .collect()
    };
    for (category, name) in &failing {
      tracing::error!("Failed: '{category}' '{name}'");
    }
    if summary.count_success == summary.count_tested {
      tracing::info!("Tests Result: OK ({}/{} succeeded)", summary.count_success, summary.count_tested);
    } else {
      tracing::error!("Tests Result: Errors ({}/{} succeeded)", summary.count_success, summary.count_tested);
    }
  }

  /// Write the configured result export, if any.
  pub fn export_results(&self) -> Result<()> {
    let state = self.state();
    let Some(path) = state.io.export_results_file.clone() else {
      return Ok(());
    };
    if state.io.export_results_format != ExportFormat::JUnitXml {
      return Ok(());
    }
    if let Some(dir) = path.parent() {
      if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
      }
    }
    let file = std::fs::File::create(&path)?;
    export::write_junit_xml(
      &state.tests,
      &state.io,
      state.batch_start_time,
      state.batch_end_time,
      std::io::BufWriter::new(file),
    )?;
    tracing::info!("Wrote test results to {}", path.display());
    Ok(())
  }

  /// Chain a panic hook that flushes result exports before the usual
  /// reporter runs, so a crashed batch still leaves a result file.
  pub fn install_crash_handler(&self) {
    let engine = self.clone();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
      engine.export_results_on_crash();
      previous(info);
    }));
  }

  fn export_results_on_crash(&self) {
    // try_lock: the panic may have happened while the engine lock was held.
    if self.shared.state.try_lock().is_err() {
      return;
    }
    if let Err(err) = self.export_results() {
      eprintln!("result export during crash failed: {err}");
    }
  }

  // ---- settings ----

  pub fn settings_write(&self, out: &mut String) {
    let state = self.state();
    crate::settings::write_all(&state.persisted, &state.io, out);
  }

  pub fn settings_read_line(&self, line: &str) {
    let mut state = self.state();
    let EngineState { persisted, io, .. } = &mut *state;
    crate::settings::read_line(persisted, io, line);
  }

  pub fn persisted_settings(&self) -> PersistedSettings {
    self.state().persisted.clone()
  }

  pub fn set_persisted_settings(&self, persisted: PersistedSettings) {
    self.state().persisted = persisted;
  }
}
