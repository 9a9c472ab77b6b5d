pub mod headless;

use std::sync::{Arc, Mutex};

/// Screen-space position in pixels.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Vec2 {
  pub x: f32,
  pub y: f32,
}

impl Vec2 {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Rect {
  pub min: Vec2,
  pub max: Vec2,
}

impl Rect {
  pub fn new(min: Vec2, max: Vec2) -> Self {
    Self { min, max }
  }

  pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
    Self { min: Vec2::new(x, y), max: Vec2::new(x + w, y + h) }
  }

  pub fn contains(&self, p: Vec2) -> bool {
    p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
  }

  pub fn center(&self) -> Vec2 {
    Vec2::new((self.min.x + self.max.x) * 0.5, (self.min.y + self.max.y) * 0.5)
  }

  pub fn width(&self) -> f32 {
    self.max.x - self.min.x
  }

  pub fn height(&self) -> f32 {
    self.max.y - self.min.y
  }

  /// Clip to `other` while never growing beyond `self`.
  pub fn clipped_to(&self, other: &Rect) -> Rect {
    let mut r = *self;
    r.min.x = r.min.x.max(other.min.x).min(self.max.x);
    r.min.y = r.min.y.max(other.min.y).min(self.max.y);
    r.max.x = r.max.x.min(other.max.x).max(r.min.x);
    r.max.y = r.max.y.min(other.max.y).max(r.min.y);
    r
  }
}

/// Stable hashed-path identifier of one submitted element.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElemId(pub u32);

impl ElemId {
  pub const NONE: ElemId = ElemId(0);

  pub fn is_none(&self) -> bool {
    self.0 == 0
  }
}

impl std::fmt::Display for ElemId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "0x{:08X}", self.0)
  }
}

/// A window's identifier is the hash of its root path segment, so a window id
/// and the first entry of its id stack coincide.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl WindowId {
  pub fn root_id(&self) -> ElemId {
    ElemId(self.0)
  }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum NavLayer {
  #[default]
  Main,
  Menu,
}

/// Item status flags, resolved by the host once per element per frame.
pub mod item_status {
  pub const NONE: u32 = 0;
  pub const HOVERED: u32 = 1 << 0;
  pub const ACTIVE: u32 = 1 << 1;
  pub const VISIBLE: u32 = 1 << 2;
  pub const OPENED: u32 = 1 << 3;
  pub const CHECKABLE: u32 = 1 << 4;
  pub const CHECKED: u32 = 1 << 5;
  pub const DEACTIVATED: u32 = 1 << 6;
  pub const FOCUSED: u32 = 1 << 7;
}

pub mod key_mods {
  pub const NONE: u32 = 0;
  pub const CTRL: u32 = 1 << 0;
  pub const SHIFT: u32 = 1 << 1;
  pub const ALT: u32 = 1 << 2;
  pub const SUPER: u32 = 1 << 3;
}

pub mod mouse_buttons {
  pub const LEFT: u32 = 1 << 0;
  pub const RIGHT: u32 = 1 << 1;
  pub const MIDDLE: u32 = 1 << 2;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Key {
  Escape,
  Enter,
  Tab,
  Space,
  Backspace,
  Delete,
  Left,
  Right,
  Up,
  Down,
  Home,
  End,
  PageUp,
  PageDown,
  Other(u32),
}

/// Clipboard storage shared between a running test context and the host
/// binding while the context-backed clipboard is installed.
pub type ClipboardBuffer = Arc<Mutex<String>>;

/// Hash one path segment into an id, seeded by the parent scope.
/// FNV-1a, matching what the headless host uses for element ids. Hosts that
/// bring their own id scheme must route test paths through the same hash.
pub fn hash_segment(segment: &str, seed: ElemId) -> ElemId {
  let mut h: u32 = if seed.0 != 0 { seed.0 } else { 0x811C_9DC5 };
  for b in segment.as_bytes() {
    h ^= u32::from(*b);
    h = h.wrapping_mul(0x0100_0193);
  }
  ElemId(h)
}

/// Hash a `a/b/c` path. A leading `//` re-seeds at the root, everything else
/// hashes relative to `seed`.
pub fn hash_path(path: &str, seed: ElemId) -> ElemId {
  let (mut id, path) = if let Some(rest) = path.strip_prefix("//") { (ElemId::NONE, rest) } else { (seed, path) };
  for segment in path.split('/') {
    if segment.is_empty() {
      continue;
    }
    id = hash_segment(segment, id);
  }
  id
}

/// Everything the engine needs to do *to* the host: input injection, io
/// snapshots, clipboard redirection and structural recovery. The host calls
/// the engine's frame hooks and hands itself in through this trait.
pub trait UiHost {
  /// Host frame counter at the time of the call.
  fn frame_count(&self) -> i64;
  fn delta_time(&self) -> f32;
  /// Replace the delta time the host will report for the upcoming frame.
  fn override_delta_time(&mut self, dt: f32);

  fn force_pointer_visible(&mut self, on: bool);
  /// Advertise virtual navigation-input capability while simulating.
  fn enable_virtual_nav(&mut self, on: bool);

  /// Drop events queued by the real input backend this frame, keeping
  /// previously injected simulated ones.
  fn strip_foreign_events(&mut self);
  fn push_pointer_state(&mut self, pos: Vec2, buttons: u32);
  fn push_wheel(&mut self, wheel: Vec2);
  fn push_key(&mut self, key: Key, mods: u32, down: bool);
  fn push_mods(&mut self, mods: u32, down: bool);
  fn push_char(&mut self, ch: char);
  /// Tag every event appended since the merge began as simulation-sourced.
  fn mark_pushed_events_simulated(&mut self);

  /// Geometric hover resolution, skipping input-transparent surfaces.
  fn hit_test(&self, pos: Vec2) -> Option<WindowId>;
  fn set_hovered_window(&mut self, win: Option<WindowId>);

  /// Whether the (real) abort key is held right now.
  fn abort_key_down(&self) -> bool;

  fn snapshot_io_style(&mut self);
  fn restore_io_style(&mut self);

  fn set_clipboard_backend(&mut self, buf: Option<ClipboardBuffer>);

  /// Close any structural blocks the gui routine left unterminated and
  /// return their labels for the warning log.
  fn recover_unterminated_blocks(&mut self) -> Vec<String>;

  fn debugger_attached(&self) -> bool {
    false
  }
}

/// Narrow read-only view of host internals, valid during an element hook
/// call. Geometry, id stack and window links only; no raw struct access.
pub trait HostIntrospect {
  fn current_window(&self) -> WindowId;
  fn clip_rect(&self) -> Rect;
  fn id_stack(&self) -> &[ElemId];
  fn nav_layer(&self) -> NavLayer;
  /// Immediate parent chain for cross-window label lookups.
  fn window_parent(&self, win: WindowId) -> Option<WindowId>;
}
