use std::collections::BTreeMap;

use derive_deref::{Deref, DerefMut};

use crate::host::{ElemId, HostIntrospect, NavLayer, Rect, WindowId};

/// Frames of non-renewal after which an unreferenced info task is collected.
pub const ITEM_TASK_ELAPSE_FRAMES: i64 = 20;

const DEBUG_LABEL_MAX: usize = 32;

/// Result of a point query: the last observed state of exactly one element.
/// Structural fields and status fields carry independent timestamps because
/// the host resolves them through two separate hooks.
#[derive(Debug, Clone)]
pub struct ItemInfo {
  pub id: ElemId,
  pub parent_id: ElemId,
  pub window: Option<WindowId>,
  pub rect_full: Rect,
  pub rect_clipped: Rect,
  pub status_flags: u32,
  pub nav_layer: NavLayer,
  /// Depth from a gather task's requested parent; 0 == immediate child.
  pub depth: i32,
  pub timestamp_main: i64,
  pub timestamp_status: i64,
  pub debug_label: String,
}

impl Default for ItemInfo {
  fn default() -> Self {
    Self {
      id: ElemId::NONE,
      parent_id: ElemId::NONE,
      window: None,
      rect_full: Rect::default(),
      rect_clipped: Rect::default(),
      status_flags: 0,
      nav_layer: NavLayer::Main,
      depth: 0,
      timestamp_main: -1,
      timestamp_status: -1,
      debug_label: String::new(),
    }
  }
}

impl ItemInfo {
  pub fn has_status(&self, flag: u32) -> bool {
    self.status_flags & flag != 0
  }
}

/// Pending point query keyed by id. Renewed on every poll; collected after
/// [`ITEM_TASK_ELAPSE_FRAMES`] frames without renewal once unreferenced.
#[derive(Debug, Default)]
pub struct InfoTask {
  pub id: ElemId,
  pub debug_name: String,
  /// Last frame the task was requested or renewed.
  pub frame_count: i64,
  /// External holds preventing collection.
  pub ref_count: u32,
  pub result: ItemInfo,
}

impl InfoTask {
  pub fn new(id: ElemId, debug_name: &str, frame_count: i64) -> Self {
    Self { id, debug_name: trim_label(debug_name), frame_count, ref_count: 0, result: ItemInfo::default() }
  }
}

/// Output of a subtree gather, unique by id.
#[derive(Debug, Default, Deref, DerefMut)]
pub struct ItemList(pub BTreeMap<ElemId, ItemInfo>);

impl ItemList {
  pub fn by_label(&self, label: &str) -> Option<&ItemInfo> {
    self.0.values().find(|i| i.debug_label == label)
  }
}

/// The single, globally exclusive subtree query.
#[derive(Debug)]
pub struct GatherTask {
  pub parent_id: ElemId,
  /// Maximum depth below `parent_id`; 0 gathers direct children only.
  pub depth: i32,
  pub out: ItemList,
  /// Most recent match, so the status hook can attach flags without
  /// re-searching.
  pub last_item: Option<ElemId>,
}

impl GatherTask {
  pub fn new(parent_id: ElemId, depth: i32) -> Self {
    Self { parent_id, depth, out: ItemList::default(), last_item: None }
  }
}

/// Wildcard label lookup: resolves `**/a/b` to a concrete element id.
#[derive(Debug)]
pub struct FindByLabelTask {
  /// Id that must appear somewhere in the candidate's id stack (or in its
  /// window's immediate parent chain).
  pub prefix_id: ElemId,
  /// The wildcard-spanned suffix, e.g. `a/b`.
  pub suffix: String,
  /// Number of suffix segments.
  pub suffix_depth: i32,
  /// Hash of the suffix's final segment label.
  pub suffix_last_hash: u64,
  /// Optional status-flag filter candidates must carry.
  pub filter_status: u32,
  pub out_id: Option<ElemId>,
}

impl FindByLabelTask {
  pub fn new(prefix_id: ElemId, suffix: &str, filter_status: u32) -> Self {
    let last = suffix.rsplit('/').next().unwrap_or(suffix);
    let depth = suffix.split('/').filter(|s| !s.is_empty()).count() as i32;
    Self {
      prefix_id,
      suffix: suffix.to_string(),
      suffix_depth: depth,
      suffix_last_hash: hash_label(last),
      filter_status,
      out_id: None,
    }
  }
}

/// Bounded copy of a display label for diagnostics.
pub fn trim_label(label: &str) -> String {
  let mut label = label.to_string();
  if label.len() > DEBUG_LABEL_MAX {
    let mut cut = DEBUG_LABEL_MAX;
    while !label.is_char_boundary(cut) {
      cut -= 1;
    }
    label.truncate(cut);
  }
  label
}

/// Label hash used only to cheaply compare the final path segment against
/// resolved labels; independent from the id path hash.
pub fn hash_label(label: &str) -> u64 {
  let mut h: u64 = 0xCBF2_9CE4_8422_2325;
  for b in label.as_bytes() {
    h ^= u64::from(*b);
    h = h.wrapping_mul(0x0000_0100_0000_01B3);
  }
  h
}

/// Gather-depth rule: distance from the stack top to `parent_id`, within the
/// task's depth limit. Returns None when the element is outside the subtree.
pub fn gather_depth(task_depth: i32, parent_id: ElemId, id: ElemId, id_stack: &[ElemId]) -> Option<i32> {
  let stack_top = *id_stack.last()?;
  if parent_id == stack_top {
    return Some(0);
  }
  // An element whose own id sits on the stack top gets one extra level.
  let extra = i32::from(id == stack_top);
  let max_depth = (id_stack.len() as i32).min(task_depth + 1 + extra);
  for n_depth in 1..max_depth {
    if id_stack[id_stack.len() - 1 - n_depth as usize] == parent_id {
      return Some(n_depth);
    }
  }
  None
}

/// Label-task matching for one status-resolved element. Validates the prefix
/// against the active id stack (walking the immediate window parent chain as
/// a fallback), then re-derives the full suffix hash from the wildcard base
/// and requires exact equality.
pub fn match_label_task(
  task: &FindByLabelTask,
  host: &dyn HostIntrospect,
  id: ElemId,
  label: &str,
  status_flags: u32,
) -> bool {
  if hash_label(label) != task.suffix_last_hash {
    return false;
  }
  if task.filter_status != 0 && task.filter_status & status_flags == 0 {
    return false;
  }

  let stack = host.id_stack();
  let mut matched = stack.iter().rev().any(|sid| *sid == task.prefix_id);
  if !matched {
    // Not in this window's stack; the prefix may be a parent window.
    let mut win = host.window_parent(host.current_window());
    while let Some(w) = win {
      if w.root_id() == task.prefix_id {
        matched = true;
        break;
      }
      win = host.window_parent(w);
    }
  }
  if !matched {
    return false;
  }

  // We matched the "b" of "**/a/b"; re-derive the whole suffix from the
  // wildcard base and demand exact equality. The candidate's own id is not
  // on the stack, so a depth-1 suffix bases off the stack top.
  let suffix_depth = task.suffix_depth as usize;
  if suffix_depth == 0 || suffix_depth > stack.len() {
    return false;
  }
  let base_id = stack[stack.len() - suffix_depth];
  crate::host::hash_path(&task.suffix, base_id) == id
}
