use crate::host::{key_mods, Key, UiHost, Vec2, WindowId};

/// Hold-to-abort threshold for the real abort key, in seconds.
pub const ABORT_HOLD_SECS: f32 = 0.30;

/// One discrete simulated event, queued by test code and drained into the
/// host during the per-frame merge.
#[derive(Debug, Clone, PartialEq)]
pub enum SimInput {
  Key { key: Key, mods: u32, down: bool },
  /// Modifier-only entry; becomes a modifier key event on merge.
  Mods { mods: u32, down: bool },
  Char(char),
}

/// Single-frame simulated input state. Higher-level action pacing lives
/// elsewhere; this layer only guarantees the per-frame primitives are stable
/// and idempotent within one frame.
#[derive(Debug, Clone)]
pub struct SimulatedInputs {
  pub pos: Vec2,
  pub buttons: u32,
  pub wheel: Vec2,
  pub queue: Vec<SimInput>,
  /// Modifier mask accumulated from drained events.
  pub key_mods: u32,
  /// Explicit hovered-surface override; geometric hit-test otherwise.
  pub hovered_override: Option<WindowId>,
  /// Seconds the abort key has been held; -1 when released.
  pub abort_hold: f32,
}

impl Default for SimulatedInputs {
  fn default() -> Self {
    Self {
      pos: Vec2::default(),
      buttons: 0,
      wheel: Vec2::default(),
      queue: Vec::new(),
      key_mods: key_mods::NONE,
      hovered_override: None,
      abort_hold: -1.0,
    }
  }
}

impl SimulatedInputs {
  /// Reset everything between tests. The abort-hold timer belongs to the
  /// real keyboard and survives.
  pub fn clear(&mut self) {
    let abort_hold = self.abort_hold;
    *self = Self::default();
    self.abort_hold = abort_hold;
  }
}

/// Per-frame merge of simulated state into the host's live input stream.
/// `active` is false while no test runs or the test opted into raw input or
/// gui-only mode; real input passes through untouched then.
pub fn apply_to_host(inputs: &mut SimulatedInputs, host: &mut dyn UiHost, active: bool, swap_wheel_with_shift: bool) {
  if !active {
    inputs.queue.clear();
    return;
  }

  host.force_pointer_visible(true);
  host.enable_virtual_nav(true);
  host.strip_foreign_events();

  for input in inputs.queue.drain(..) {
    match input {
      SimInput::Key { key, mods, down } => {
        if down {
          inputs.key_mods |= mods;
        } else {
          inputs.key_mods &= !mods;
        }
        host.push_key(key, mods, down);
      },
      SimInput::Mods { mods, down } => {
        if down {
          inputs.key_mods |= mods;
        } else {
          inputs.key_mods &= !mods;
        }
        host.push_mods(mods, down);
      },
      SimInput::Char(ch) => host.push_char(ch),
    }
  }

  host.push_pointer_state(inputs.pos, inputs.buttons);

  let hovered = inputs.hovered_override.or_else(|| host.hit_test(inputs.pos));
  host.set_hovered_window(hovered);

  // One frame of wheel, axis-swapped under shift when configured, then
  // zeroed so a repeated merge is a no-op.
  let mut wheel = inputs.wheel;
  if swap_wheel_with_shift && inputs.key_mods & key_mods::SHIFT != 0 {
    std::mem::swap(&mut wheel.x, &mut wheel.y);
  }
  host.push_wheel(wheel);
  inputs.wheel = Vec2::default();

  host.mark_pushed_events_simulated();
}
