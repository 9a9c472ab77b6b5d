//! Reference host: a windowless immediate-mode UI with deterministic layout,
//! enough surface to run the engine end to end. The CLI runner and the
//! integration tests both bind through it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::Engine;
use crate::host::{
  hash_segment, item_status, mouse_buttons, ClipboardBuffer, ElemId, HostIntrospect, Key, NavLayer,
  Rect, UiHost, Vec2, WindowId,
};

#[derive(Debug, Clone)]
struct KeyEvent {
  key: Key,
  down: bool,
  simulated: bool,
}

#[derive(Debug, Clone)]
struct CharEvent {
  ch: char,
  simulated: bool,
}

#[derive(Debug, Clone)]
struct WindowRecord {
  rect: Rect,
  input_transparent: bool,
  parent: Option<WindowId>,
}

#[derive(Debug, Default, Copy, Clone)]
struct IoStyleSnapshot {
  pointer_visible: bool,
  nav_enabled: bool,
}

#[derive(Default)]
struct HeadlessState {
  frame_count: i64,
  delta_time: f32,
  delta_override: Option<f32>,

  pointer: Vec2,
  buttons: u32,
  prev_buttons: u32,
  wheel: Vec2,
  mods: u32,
  keys_down: HashSet<Key>,
  key_events: Vec<KeyEvent>,
  char_events: Vec<CharEvent>,
  abort_key: bool,

  hovered_window: Option<WindowId>,
  pointer_visible: bool,
  nav_enabled: bool,
  focused: Option<ElemId>,

  clipboard_redirect: Option<ClipboardBuffer>,
  native_clipboard: String,

  io_snapshot: Option<IoStyleSnapshot>,

  /// Draw-order list, last on top; rebuilt incrementally as windows submit.
  window_order: Vec<WindowId>,
  windows: BTreeMap<WindowId, WindowRecord>,

  /// Labels of blocks the last frame's gui left unterminated.
  unterminated: Vec<String>,
}

/// Cloneable handle over the shared host state.
#[derive(Clone, Default)]
pub struct HeadlessHost {
  inner: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHost {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HeadlessState> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Drive one full frame: input merge, gui routine, scheduler step.
  pub fn frame(&mut self, engine: &Engine, dt: f32) {
    {
      let mut state = self.lock();
      state.frame_count += 1;
      state.delta_time = state.delta_override.take().unwrap_or(dt);
    }
    engine.on_frame_begin(self);
    {
      let mut ui = Ui::new(self.clone(), engine.clone());
      engine.run_gui_func(&mut ui);
    }
    engine.on_frame_end(self);
    let mut state = self.lock();
    state.prev_buttons = state.buttons;
    state.key_events.clear();
    state.char_events.clear();
    state.wheel = Vec2::default();
  }

  /// Pump frames until the engine's queue is drained, with a frame cap so a
  /// stuck run fails instead of hanging.
  pub fn run_until_idle(&mut self, engine: &Engine, dt: f32, max_frames: u32) -> bool {
    for _ in 0..max_frames {
      if !engine.is_running_tests() {
        return true;
      }
      self.frame(engine, dt);
    }
    !engine.is_running_tests()
  }

  /// Real keyboard abort key, for the hold-to-abort path.
  pub fn press_abort_key(&self, down: bool) {
    self.lock().abort_key = down;
  }

  /// What a paste would observe right now.
  pub fn clipboard_text(&self) -> String {
    let state = self.lock();
    match state.clipboard_redirect.as_ref() {
      Some(buf) => buf.lock().unwrap_or_else(PoisonError::into_inner).clone(),
      None => state.native_clipboard.clone(),
    }
  }

  pub fn set_native_clipboard(&self, text: &str) {
    self.lock().native_clipboard = text.to_string();
  }

  /// Simulate a character arriving from the real input backend; stripped
  /// while a test is merging simulated input.
  pub fn inject_real_char(&self, ch: char) {
    self.lock().char_events.push(CharEvent { ch, simulated: false });
  }

  pub fn pointer_pos(&self) -> Vec2 {
    self.lock().pointer
  }

  pub fn frame_index(&self) -> i64 {
    self.lock().frame_count
  }

  fn upsert_window(&self, id: WindowId, rect: Rect, parent: Option<WindowId>) {
    let mut state = self.lock();
    if !state.window_order.contains(&id) {
      state.window_order.push(id);
    }
    state.windows.insert(id, WindowRecord { rect, input_transparent: false, parent });
  }

  fn window_parent_of(&self, id: WindowId) -> Option<WindowId> {
    self.lock().windows.get(&id).and_then(|w| w.parent)
  }

  fn set_focus(&self, id: Option<ElemId>) {
    self.lock().focused = id;
  }

  fn store_unterminated(&self, labels: Vec<String>) {
    self.lock().unterminated = labels;
  }
}

impl UiHost for HeadlessHost {
  fn frame_count(&self) -> i64 {
    self.lock().frame_count
  }

  fn delta_time(&self) -> f32 {
    self.lock().delta_time
  }

  fn override_delta_time(&mut self, dt: f32) {
    let mut state = self.lock();
    state.delta_time = dt;
    state.delta_override = Some(dt);
  }

  fn force_pointer_visible(&mut self, on: bool) {
    self.lock().pointer_visible = on;
  }

  fn enable_virtual_nav(&mut self, on: bool) {
    self.lock().nav_enabled = on;
  }

  fn strip_foreign_events(&mut self) {
    let mut state = self.lock();
    state.key_events.retain(|e| e.simulated);
    state.char_events.retain(|e| e.simulated);
  }

  fn push_pointer_state(&mut self, pos: Vec2, buttons: u32) {
    let mut state = self.lock();
    state.pointer = pos;
    state.buttons = buttons;
  }

  fn push_wheel(&mut self, wheel: Vec2) {
    let mut state = self.lock();
    state.wheel.x += wheel.x;
    state.wheel.y += wheel.y;
  }

  fn push_key(&mut self, key: Key, mods: u32, down: bool) {
    let mut state = self.lock();
    if down {
      state.keys_down.insert(key);
      state.mods |= mods;
    } else {
      state.keys_down.remove(&key);
      state.mods &= !mods;
    }
    state.key_events.push(KeyEvent { key, down, simulated: false });
  }

  fn push_mods(&mut self, mods: u32, down: bool) {
    let mut state = self.lock();
    if down {
      state.mods |= mods;
    } else {
      state.mods &= !mods;
    }
  }

  fn push_char(&mut self, ch: char) {
    self.lock().char_events.push(CharEvent { ch, simulated: false });
  }

  fn mark_pushed_events_simulated(&mut self) {
    let mut state = self.lock();
    for e in &mut state.key_events {
      e.simulated = true;
    }
    for e in &mut state.char_events {
      e.simulated = true;
    }
  }

  fn hit_test(&self, pos: Vec2) -> Option<WindowId> {
    let state = self.lock();
    for id in state.window_order.iter().rev() {
      if let Some(win) = state.windows.get(id) {
        if !win.input_transparent && win.rect.contains(pos) {
          return Some(*id);
        }
      }
    }
    None
  }

  fn set_hovered_window(&mut self, win: Option<WindowId>) {
    self.lock().hovered_window = win;
  }

  fn abort_key_down(&self) -> bool {
    self.lock().abort_key
  }

  fn snapshot_io_style(&mut self) {
    let mut state = self.lock();
    state.io_snapshot =
      Some(IoStyleSnapshot { pointer_visible: state.pointer_visible, nav_enabled: state.nav_enabled });
  }

  fn restore_io_style(&mut self) {
    let mut state = self.lock();
    if let Some(snap) = state.io_snapshot.take() {
      state.pointer_visible = snap.pointer_visible;
      state.nav_enabled = snap.nav_enabled;
    }
    state.buttons = 0;
    state.keys_down.clear();
    state.mods = 0;
  }

  fn set_clipboard_backend(&mut self, buf: Option<ClipboardBuffer>) {
    self.lock().clipboard_redirect = buf;
  }

  fn recover_unterminated_blocks(&mut self) -> Vec<String> {
    std::mem::take(&mut self.lock().unterminated)
  }
}

/// Per-frame input snapshot the builder works against, taken after the
/// engine merged simulated input.
struct FrameInput {
  pointer: Vec2,
  buttons: u32,
  prev_buttons: u32,
  hovered_window: Option<WindowId>,
  chars: Vec<char>,
  keys: Vec<(Key, bool)>,
  focused: Option<ElemId>,
}

const ITEM_HEIGHT: f32 = 20.0;
const ITEM_SPACING: f32 = 2.0;
const WINDOW_PADDING: f32 = 8.0;
const TITLE_HEIGHT: f32 = 24.0;

/// One frame's UI builder. Gui routines receive it through
/// [`crate::context::GuiCtx::ui`] and submit windows and items; each
/// submission feeds the engine's element hooks.
pub struct Ui {
  host: HeadlessHost,
  engine: Engine,
  hooking: bool,
  id_stack: Vec<ElemId>,
  window_stack: Vec<WindowId>,
  clip_stack: Vec<Rect>,
  cursor_stack: Vec<Vec2>,
  window_parents: BTreeMap<WindowId, WindowId>,
  open_blocks: Vec<String>,
  input: FrameInput,
}

impl Ui {
  fn new(host: HeadlessHost, engine: Engine) -> Self {
    let input = {
      let mut state = host.lock();
      FrameInput {
        pointer: state.pointer,
        buttons: state.buttons,
        prev_buttons: state.prev_buttons,
        hovered_window: state.hovered_window,
        chars: state.char_events.drain(..).map(|e| e.ch).collect(),
        keys: state.key_events.iter().map(|e| (e.key, e.down)).collect(),
        focused: state.focused,
      }
    };
    let hooking = engine.hooking_wanted();
    Self {
      host,
      engine,
      hooking,
      id_stack: Vec::new(),
      window_stack: Vec::new(),
      clip_stack: Vec::new(),
      cursor_stack: Vec::new(),
      window_parents: BTreeMap::new(),
      open_blocks: Vec::new(),
      input,
    }
  }

  fn current_window_id(&self) -> WindowId {
    self.window_stack.last().copied().unwrap_or_default()
  }

  fn left_click_edge(&self) -> bool {
    self.input.buttons & mouse_buttons::LEFT != 0 && self.input.prev_buttons & mouse_buttons::LEFT == 0
  }

  fn next_item_rect(&mut self, width: f32) -> Rect {
    let cursor = self.cursor_stack.last().copied().unwrap_or_default();
    let rect = Rect::from_xywh(cursor.x, cursor.y, width, ITEM_HEIGHT);
    if let Some(cursor) = self.cursor_stack.last_mut() {
      cursor.y += ITEM_HEIGHT + ITEM_SPACING;
    }
    rect
  }

  /// Resolve one element: interaction flags from the merged input, then the
  /// two engine hooks. Returns (clicked, status).
  fn register_element(&mut self, id: ElemId, rect: Rect, label: &str, extra_flags: u32) -> (bool, u32) {
    let clip = self.clip_stack.last().copied().unwrap_or(rect);
    let clipped = rect.clipped_to(&clip);
    let in_hovered_window = self.input.hovered_window == Some(self.current_window_id());
    let hovered = in_hovered_window && clipped.contains(self.input.pointer);
    let clicked = hovered && self.left_click_edge();
    let active = hovered && self.input.buttons & mouse_buttons::LEFT != 0;

    let mut status = extra_flags;
    if clipped.width() > 0.0 && clipped.height() > 0.0 {
      status |= item_status::VISIBLE;
    }
    if hovered {
      status |= item_status::HOVERED;
    }
    if active {
      status |= item_status::ACTIVE;
    }
    if self.input.focused == Some(id) {
      status |= item_status::FOCUSED;
    }

    if self.hooking {
      let engine = self.engine.clone();
      engine.on_element_registered(self, id, rect);
      engine.on_element_status(self, id, label, status);
    }
    (clicked, status)
  }

  /// Open a window. The window registers itself as an element whose id sits
  /// on top of the id stack, so a gather rooted at it starts one level up.
  pub fn window(&mut self, title: &str, rect: Rect, body: impl FnOnce(&mut Ui)) {
    let win_elem = hash_segment(title, ElemId::NONE);
    let window = WindowId(win_elem.0);
    let parent = self.window_stack.last().copied();
    self.host.upsert_window(window, rect, parent);
    if let Some(parent) = parent {
      self.window_parents.insert(window, parent);
    }

    self.window_stack.push(window);
    self.id_stack.push(win_elem);
    self.clip_stack.push(rect);
    self.cursor_stack.push(Vec2::new(rect.min.x + WINDOW_PADDING, rect.min.y + TITLE_HEIGHT));
    self.begin_block(title);

    self.register_element(win_elem, rect, title, 0);
    body(self);

    self.end_block();
    self.cursor_stack.pop();
    self.clip_stack.pop();
    self.id_stack.pop();
    self.window_stack.pop();
  }

  /// Embedded child region with its own window identity and clip rect.
  pub fn child_window(&mut self, title: &str, height: f32, body: impl FnOnce(&mut Ui)) {
    let parent_seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    let child_elem = hash_segment(title, parent_seed);
    let window = WindowId(child_elem.0);
    let cursor = self.cursor_stack.last().copied().unwrap_or_default();
    let clip = self.clip_stack.last().copied().unwrap_or_default();
    let rect = Rect::from_xywh(cursor.x, cursor.y, (clip.max.x - cursor.x).max(0.0), height);
    if let Some(cursor) = self.cursor_stack.last_mut() {
      cursor.y += height + ITEM_SPACING;
    }

    let parent = self.current_window_id();
    self.host.upsert_window(window, rect, Some(parent));
    self.window_parents.insert(window, parent);

    self.window_stack.push(window);
    self.id_stack.push(child_elem);
    self.clip_stack.push(rect.clipped_to(&clip));
    self.cursor_stack.push(Vec2::new(rect.min.x + WINDOW_PADDING, rect.min.y + WINDOW_PADDING));
    self.begin_block(title);

    self.register_element(child_elem, rect, title, 0);
    body(self);

    self.end_block();
    self.cursor_stack.pop();
    self.clip_stack.pop();
    self.id_stack.pop();
    self.window_stack.pop();
  }

  /// Push an id scope without geometry, like a named group.
  pub fn push_id(&mut self, label: &str, body: impl FnOnce(&mut Ui)) {
    let seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    self.id_stack.push(hash_segment(label, seed));
    body(self);
    self.id_stack.pop();
  }

  pub fn text(&mut self, label: &str) {
    let seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    let id = hash_segment(label, seed);
    let rect = self.next_item_rect(8.0 * label.len() as f32);
    self.register_element(id, rect, label, 0);
  }

  pub fn button(&mut self, label: &str) -> bool {
    let seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    let id = hash_segment(label, seed);
    let rect = self.next_item_rect(120.0);
    let (clicked, _) = self.register_element(id, rect, label, 0);
    if clicked {
      self.host.set_focus(Some(id));
      self.input.focused = Some(id);
    }
    clicked
  }

  pub fn checkbox(&mut self, label: &str, checked: &mut bool) -> bool {
    let seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    let id = hash_segment(label, seed);
    let rect = self.next_item_rect(120.0);

    // Toggle before the status hook so the reported CHECKED flag reflects
    // this frame's click.
    let clip = self.clip_stack.last().copied().unwrap_or(rect);
    let clipped = rect.clipped_to(&clip);
    let hovered =
      self.input.hovered_window == Some(self.current_window_id()) && clipped.contains(self.input.pointer);
    let clicked = hovered && self.left_click_edge();
    if clicked {
      *checked = !*checked;
    }

    let mut flags = item_status::CHECKABLE;
    if *checked {
      flags |= item_status::CHECKED;
    }
    self.register_element(id, rect, label, flags);
    clicked
  }

  /// Single-line text field; consumes simulated characters while focused.
  pub fn text_input(&mut self, label: &str, buf: &mut String) -> bool {
    let seed = self.id_stack.last().copied().unwrap_or(ElemId::NONE);
    let id = hash_segment(label, seed);
    let rect = self.next_item_rect(200.0);

    let clip = self.clip_stack.last().copied().unwrap_or(rect);
    let clipped = rect.clipped_to(&clip);
    let hovered =
      self.input.hovered_window == Some(self.current_window_id()) && clipped.contains(self.input.pointer);
    if hovered && self.left_click_edge() {
      self.host.set_focus(Some(id));
      self.input.focused = Some(id);
    }

    let mut changed = false;
    if self.input.focused == Some(id) {
      for ch in self.input.chars.drain(..) {
        if !ch.is_control() {
          buf.push(ch);
          changed = true;
        }
      }
      for (key, down) in &self.input.keys {
        if *down && *key == Key::Backspace && buf.pop().is_some() {
          changed = true;
        }
      }
    }

    self.register_element(id, rect, label, 0);
    changed
  }

  /// Explicit block markers for structural recovery; `window` pairs them
  /// automatically, a gui routine can open one and "forget" the end.
  pub fn begin_block(&mut self, label: &str) {
    self.open_blocks.push(label.to_string());
  }

  pub fn end_block(&mut self) {
    self.open_blocks.pop();
  }
}

impl Drop for Ui {
  fn drop(&mut self) {
    let leftovers = std::mem::take(&mut self.open_blocks);
    if !leftovers.is_empty() {
      self.host.store_unterminated(leftovers);
    }
  }
}

impl HostIntrospect for Ui {
  fn current_window(&self) -> WindowId {
    self.current_window_id()
  }

  fn clip_rect(&self) -> Rect {
    self.clip_stack.last().copied().unwrap_or(Rect::from_xywh(f32::MIN / 2.0, f32::MIN / 2.0, f32::MAX, f32::MAX))
  }

  fn id_stack(&self) -> &[ElemId] {
    &self.id_stack
  }

  fn nav_layer(&self) -> NavLayer {
    NavLayer::Main
  }

  fn window_parent(&self, win: WindowId) -> Option<WindowId> {
    self.window_parents.get(&win).copied().or_else(|| self.host.window_parent_of(win))
  }
}
