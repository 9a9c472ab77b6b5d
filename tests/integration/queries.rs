use std::sync::{Arc, Mutex};

use uiprobe::host::headless::Ui;
use uiprobe::host::{hash_segment, item_status, ElemId, Rect, WindowId};
use uiprobe::query::{ItemInfo, ITEM_TASK_ELAPSE_FRAMES};
use uiprobe::{check_noret, located_test};
use uiprobe::test::{run_flags, TestStatus};

use crate::test_utils::EngineHarness;

fn info_window(ui: &mut Ui) {
  ui.window("Info Window", Rect::from_xywh(0.0, 0.0, 300.0, 200.0), |ui| {
    ui.text("Row");
    ui.button("Go");
  });
}

#[test]
fn item_info_reports_geometry_and_window() {
  let mut h = EngineHarness::new();
  let found: Arc<Mutex<Option<ItemInfo>>> = Arc::default();
  let out = Arc::clone(&found);
  let id = h.engine.register(
    located_test!("widgets", "info")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          info_window(ui);
        }
      })
      .test(move |ctx| {
        ctx.set_ref("//Info Window");
        *out.lock().unwrap() = ctx.item_info("Go");
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  let info = found.lock().unwrap().clone().expect("element resolved");
  let window = hash_segment("Info Window", ElemId::NONE);
  assert_eq!(info.id, hash_segment("Go", window));
  assert_eq!(info.parent_id, window);
  assert_eq!(info.window, Some(WindowId(window.0)));
  assert_eq!(info.debug_label, "Go");
  assert!(info.has_status(item_status::VISIBLE));
  // Laid out below the "Row" text, inside the window body.
  assert!(info.rect_full.min.y > 24.0);
  assert!(info.timestamp_status >= 0);
}

#[test]
fn missing_item_resolves_to_none_without_failing() {
  let mut h = EngineHarness::new();
  let found: Arc<Mutex<Option<ItemInfo>>> = Arc::default();
  let out = Arc::clone(&found);
  let id = h.engine.register(
    located_test!("widgets", "missing")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          info_window(ui);
        }
      })
      .test(move |ctx| {
        ctx.set_ref("//Info Window");
        *out.lock().unwrap() = ctx.item_info_opt("No Such Item");
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());

  assert!(found.lock().unwrap().is_none());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  h.engine.with_tests(|tests| {
    assert!(!tests[id.0].log.lines.iter().any(|l| l.text.starts_with("Unable to locate")));
  });
}

#[test]
fn retained_item_task_outlives_the_collection_window() {
  let mut h = EngineHarness::new();
  let engine = h.engine.clone();
  let id = h.engine.register(
    located_test!("widgets", "retain")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          info_window(ui);
        }
      })
      .test(move |ctx| {
        ctx.set_ref("//Info Window");
        let Some(info) = ctx.item_info("Go") else { return };

        // Pinned: never renewed, yet it holds well past the elapse window.
        engine.item_retain(info.id);
        ctx.yield_frames(ITEM_TASK_ELAPSE_FRAMES as u32 + 10);
        check_noret!(ctx, engine.hooking_wanted());
        engine.item_release(info.id);
        ctx.yield_frames(1);
        check_noret!(ctx, !engine.hooking_wanted());

        // Unpinned: a mid-life renewal restarts the age, then the task ages
        // out once the full window passes without another poll.
        let _ = ctx.item_info_by_id(info.id);
        ctx.yield_frames(10);
        let _ = ctx.item_info_by_id(info.id);
        ctx.yield_frames(ITEM_TASK_ELAPSE_FRAMES as u32 - 1);
        check_noret!(ctx, engine.hooking_wanted());
        ctx.yield_frames(1);
        check_noret!(ctx, !engine.hooking_wanted());
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  assert!(!h.engine.hooking_wanted());
}

#[derive(Debug, Default, Clone, PartialEq)]
struct GatherSummary {
  direct_len: usize,
  direct_has_d: bool,
  deep_len: usize,
  deep_d_depth: Option<i32>,
  deep_a_depth: Option<i32>,
}

#[test]
fn gather_collects_children_to_requested_depth() {
  let mut h = EngineHarness::new();
  let summary: Arc<Mutex<GatherSummary>> = Arc::default();
  let out = Arc::clone(&summary);
  let id = h.engine.register(
    located_test!("widgets", "gather")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Gather Window", Rect::from_xywh(0.0, 0.0, 400.0, 300.0), |ui| {
            ui.text("A");
            ui.text("B");
            ui.push_id("Group", |ui| {
              ui.text("D");
              ui.text("E");
            });
          });
        }
      })
      .test(move |ctx| {
        let direct = ctx.gather_items("//Gather Window", 0);
        let deep = ctx.gather_items("//Gather Window", 1);
        *out.lock().unwrap() = GatherSummary {
          direct_len: direct.len(),
          direct_has_d: direct.by_label("D").is_some(),
          deep_len: deep.len(),
          deep_d_depth: deep.by_label("D").map(|i| i.depth),
          deep_a_depth: deep.by_label("A").map(|i| i.depth),
        };
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  let summary = summary.lock().unwrap().clone();
  // Depth 0: the window element plus A and B; the grouped items are deeper.
  assert_eq!(summary.direct_len, 3);
  assert!(!summary.direct_has_d);
  assert_eq!(summary.deep_len, 5);
  assert_eq!(summary.deep_d_depth, Some(1));
  assert_eq!(summary.deep_a_depth, Some(0));
}

#[test]
fn wildcard_resolves_nested_and_child_window_labels() {
  let mut h = EngineHarness::new();
  let resolved: Arc<Mutex<(Option<ElemId>, Option<ElemId>)>> = Arc::default();
  let out = Arc::clone(&resolved);
  let id = h.engine.register(
    located_test!("widgets", "wildcard")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Wild Window", Rect::from_xywh(0.0, 0.0, 400.0, 300.0), |ui| {
            ui.push_id("Inner", |ui| ui.text("Target"));
            ui.child_window("Pane", 80.0, |ui| ui.text("Nested"));
          });
        }
      })
      .test(move |ctx| {
        ctx.set_ref("//Wild Window");
        let target = ctx.item_info("**/Target").map(|i| i.id);
        let nested = ctx.item_info("**/Nested").map(|i| i.id);
        *out.lock().unwrap() = (target, nested);
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  let window = hash_segment("Wild Window", ElemId::NONE);
  let target = hash_segment("Target", hash_segment("Inner", window));
  let nested = hash_segment("Nested", hash_segment("Pane", window));
  let (got_target, got_nested) = *resolved.lock().unwrap();
  assert_eq!(got_target, Some(target));
  assert_eq!(got_nested, Some(nested));
}
