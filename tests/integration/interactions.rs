use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uiprobe::host::headless::Ui;
use uiprobe::host::{item_status, Key, Rect};
use uiprobe::located_test;
use uiprobe::query::ItemInfo;
use uiprobe::test::{run_flags, TestStatus};

use crate::test_utils::EngineHarness;

#[test]
fn click_toggles_a_checkbox() {
  let mut h = EngineHarness::new();
  let checked = Arc::new(AtomicBool::new(false));
  let state = Arc::clone(&checked);
  let seen: Arc<Mutex<Option<ItemInfo>>> = Arc::default();
  let out = Arc::clone(&seen);
  let id = h.engine.register(
    located_test!("widgets", "checkbox")
      .gui(move |ctx| {
        let mut value = state.load(Ordering::SeqCst);
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Form", Rect::from_xywh(0.0, 0.0, 320.0, 240.0), |ui| {
            ui.checkbox("Enable", &mut value);
          });
        }
        state.store(value, Ordering::SeqCst);
      })
      .test(move |ctx| {
        ctx.set_ref("//Form");
        ctx.item_click("Enable");
        *out.lock().unwrap() = ctx.item_info("Enable");
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  assert!(checked.load(Ordering::SeqCst));
  let info = seen.lock().unwrap().clone().expect("checkbox resolved");
  assert!(info.has_status(item_status::CHECKABLE));
  assert!(info.has_status(item_status::CHECKED));
}

#[test]
fn typing_reaches_the_focused_field() {
  let mut h = EngineHarness::new();
  let text = Arc::new(Mutex::new(String::new()));
  let field = Arc::clone(&text);
  let id = h.engine.register(
    located_test!("widgets", "typing")
      .gui(move |ctx| {
        let mut value = field.lock().unwrap().clone();
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Form", Rect::from_xywh(0.0, 0.0, 320.0, 240.0), |ui| {
            ui.text_input("Name", &mut value);
          });
        }
        *field.lock().unwrap() = value;
      })
      .test(move |ctx| {
        ctx.set_ref("//Form");
        ctx.item_click("Name");
        ctx.type_text("hi!");
        ctx.key_press(Key::Backspace);
        ctx.yield_frames(2);
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  assert_eq!(*text.lock().unwrap(), "hi");
}

#[test]
fn test_clipboard_is_redirected_then_restored() {
  let mut h = EngineHarness::new();
  h.host.set_native_clipboard("native");
  let during = Arc::new(Mutex::new(String::new()));
  let out = Arc::clone(&during);
  let id = h.engine.register(located_test!("widgets", "clipboard").test(move |ctx| {
    ctx.set_clipboard_text("copied");
    ctx.yield_frames(1);
    *out.lock().unwrap() = ctx.clipboard_text();
  }));

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  // One settle frame so the end-of-run host ops (clipboard restore) land.
  h.pump(1);
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  assert_eq!(*during.lock().unwrap(), "copied");
  // The redirect is uninstalled at run end; the native buffer was never
  // touched.
  assert_eq!(h.host.clipboard_text(), "native");
}

#[test]
fn holding_the_abort_key_cancels_the_run() {
  let mut h = EngineHarness::new();
  let id = h.engine.register(located_test!("widgets", "stuck").test(|ctx| {
    while !ctx.is_aborted() {
      ctx.yield_now();
    }
  }));

  h.engine.queue_test(id, run_flags::NONE);
  h.pump(2);
  h.host.press_abort_key(true);
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(id), TestStatus::Unknown);
  h.engine.with_tests(|tests| {
    assert!(tests[id.0].log.lines.iter().any(|l| l.text == "Aborted."));
  });
}

#[test]
fn short_abort_taps_do_not_cancel_the_run() {
  let mut h = EngineHarness::new();
  let id = h.engine.register(located_test!("widgets", "tapped").test(|ctx| {
    ctx.yield_frames(40);
  }));

  h.engine.queue_test(id, run_flags::NONE);
  h.pump(3);
  // Two taps of ~0.2s each. The hold timer restarts on release, so the taps
  // must not add up to the 0.3s threshold.
  h.host.press_abort_key(true);
  h.pump(12);
  h.host.press_abort_key(false);
  h.pump(2);
  h.host.press_abort_key(true);
  h.pump(12);
  h.host.press_abort_key(false);
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  h.engine.with_tests(|tests| {
    assert!(!tests[id.0].log.lines.iter().any(|l| l.text == "Aborted."));
  });
}

#[test]
fn simulated_input_strips_real_events() {
  let mut h = EngineHarness::new();
  let text = Arc::new(Mutex::new(String::new()));
  let field = Arc::clone(&text);
  let host = h.host.clone();
  let id = h.engine.register(
    located_test!("widgets", "foreign_input")
      .gui(move |ctx| {
        let mut value = field.lock().unwrap().clone();
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Form", Rect::from_xywh(0.0, 0.0, 320.0, 240.0), |ui| {
            ui.text_input("Name", &mut value);
          });
        }
        *field.lock().unwrap() = value;
      })
      .test(move |ctx| {
        ctx.set_ref("//Form");
        ctx.item_click("Name");
        // A real key press racing the simulation must not leak into the
        // field.
        host.inject_real_char('Z');
        ctx.type_text("ok");
        ctx.yield_frames(2);
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());
  assert_eq!(h.engine.test_status(id), TestStatus::Success);

  assert_eq!(*text.lock().unwrap(), "ok");
}
