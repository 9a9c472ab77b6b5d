use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use uiprobe::host::headless::Ui;
use uiprobe::host::Rect;
use uiprobe::located_test;
use uiprobe::test::{run_flags, test_flags, TestStatus};

use crate::test_utils::EngineHarness;

#[test]
fn queued_test_runs_to_success() {
  let mut h = EngineHarness::new();
  let ran = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&ran);
  let id = h.engine.register(located_test!("widgets", "smoke").test(move |ctx| {
    ctx.yield_frames(3);
    ctx.log_info("body done");
    flag.store(true, Ordering::SeqCst);
  }));

  h.engine.queue_test(id, run_flags::NONE);
  assert_eq!(h.engine.test_status(id), TestStatus::Queued);
  assert!(h.run_until_idle());

  assert!(ran.load(Ordering::SeqCst));
  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  h.engine.with_tests(|tests| {
    let test = &tests[id.0];
    assert!(test.log.lines.iter().any(|l| l.text == "Success."));
    assert!(test.end_time >= test.start_time);
  });
  assert!(!h.engine.is_running_tests());
}

#[test]
fn queue_runs_in_fifo_order() {
  let mut h = EngineHarness::new();
  let order = Arc::new(Mutex::new(Vec::new()));
  let first = Arc::clone(&order);
  let second = Arc::clone(&order);
  let a = h
    .engine
    .register(located_test!("widgets", "first").test(move |_| first.lock().unwrap().push("first")));
  let b = h
    .engine
    .register(located_test!("widgets", "second").test(move |_| second.lock().unwrap().push("second")));

  h.engine.queue_test(a, run_flags::NONE);
  h.engine.queue_test(b, run_flags::NONE);
  assert!(h.run_until_idle());

  assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
  assert_eq!(h.engine.test_status(a), TestStatus::Success);
  assert_eq!(h.engine.test_status(b), TestStatus::Success);
}

#[test]
fn warm_up_frames_run_the_gui_before_the_test() {
  let mut h = EngineHarness::new();
  let gui_frames = Arc::new(AtomicU32::new(0));
  let first_frame = Arc::new(AtomicI64::new(i64::MIN));
  let gui_counter = Arc::clone(&gui_frames);
  let frame_out = Arc::clone(&first_frame);
  let id = h.engine.register(
    located_test!("widgets", "warmup")
      .gui(move |_| {
        gui_counter.fetch_add(1, Ordering::SeqCst);
      })
      .test(move |ctx| {
        frame_out.store(ctx.frame_count(), Ordering::SeqCst);
      }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());

  // The warm-up frames count negative, so the test routine starts at 0.
  assert_eq!(first_frame.load(Ordering::SeqCst), 0);
  assert!(gui_frames.load(Ordering::SeqCst) >= 2);
  assert_eq!(h.engine.test_status(id), TestStatus::Success);
}

#[test]
fn gui_driven_test_finishes_itself() {
  let mut h = EngineHarness::new();
  let frames = Arc::new(AtomicU32::new(0));
  let counter = Arc::clone(&frames);
  let id = h.engine.register(
    located_test!("widgets", "gui_driven").flags(test_flags::NO_AUTO_FINISH).gui(move |ctx| {
      if counter.fetch_add(1, Ordering::SeqCst) >= 5 {
        ctx.finish();
      }
    }),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  assert!(frames.load(Ordering::SeqCst) >= 5);
}

#[test]
fn engine_abort_drains_the_queue() {
  let mut h = EngineHarness::new();
  let a = h.engine.register(located_test!("widgets", "endless").test(|ctx| {
    while !ctx.is_aborted() {
      ctx.yield_now();
    }
  }));
  let b = h.engine.register(located_test!("widgets", "never_runs").test(|_| {}));

  h.engine.queue_test(a, run_flags::NONE);
  h.engine.queue_test(b, run_flags::NONE);
  h.pump(5);
  h.engine.try_abort_engine();
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(a), TestStatus::Unknown);
  assert_eq!(h.engine.test_status(b), TestStatus::Unknown);
  h.engine.with_tests(|tests| {
    assert!(tests[a.0].log.lines.iter().any(|l| l.text == "Aborted."));
    assert!(tests[b.0].log.lines.is_empty());
  });
}

#[derive(Default)]
struct Counter {
  value: i32,
}

#[test]
fn user_vars_reset_between_runs() {
  let mut h = EngineHarness::new();
  let observed = Arc::new(Mutex::new(Vec::new()));
  let out = Arc::clone(&observed);
  let id = h.engine.register(located_test!("widgets", "vars").vars::<Counter>().test(move |ctx| {
    let start = ctx
      .with_vars(|v: &mut Counter| {
        let s = v.value;
        v.value += 1;
        s
      })
      .unwrap();
    out.lock().unwrap().push(start);
  }));

  for _ in 0..2 {
    h.engine.queue_test(id, run_flags::NONE);
    assert!(h.run_until_idle());
  }

  assert_eq!(*observed.lock().unwrap(), vec![0, 0]);
  assert_eq!(h.engine.test_status(id), TestStatus::Success);
}

#[test]
fn unterminated_block_is_recovered_with_warning() {
  let mut h = EngineHarness::new();
  let id = h.engine.register(
    located_test!("widgets", "leaky")
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Leaky", Rect::from_xywh(0.0, 0.0, 100.0, 100.0), |_| {});
          ui.begin_block("Orphan");
        }
      })
      .test(|ctx| ctx.yield_frames(3)),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  h.engine.with_tests(|tests| {
    assert!(tests[id.0].log.lines.iter().any(|l| l.text == "Recovered from missing end of 'Orphan'"));
  });
}

#[test]
fn recovery_warnings_can_be_silenced_per_test() {
  let mut h = EngineHarness::new();
  let id = h.engine.register(
    located_test!("widgets", "leaky_on_purpose")
      .flags(test_flags::NO_RECOVER_WARNINGS)
      .gui(|ctx| {
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.begin_block("Scratch");
        }
      })
      .test(|ctx| ctx.yield_frames(3)),
  );

  h.engine.queue_test(id, run_flags::NONE);
  assert!(h.run_until_idle());

  assert_eq!(h.engine.test_status(id), TestStatus::Success);
  h.engine.with_tests(|tests| {
    assert!(!tests[id.0].log.lines.iter().any(|l| l.text.starts_with("Recovered")));
  });
}
