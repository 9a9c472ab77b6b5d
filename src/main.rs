use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;

use uiprobe::check;
use uiprobe::cli::Cli;
use uiprobe::filter::TestFilter;
use uiprobe::host::headless::Ui;
use uiprobe::host::{item_status, Rect};
use uiprobe::located_test;
use uiprobe::test::run_flags;
use uiprobe::utils::{initialize_logging, initialize_panic_handler};
use uiprobe::{Engine, EngineIo, HeadlessHost};

#[derive(Default)]
struct CheckboxVars {
  checked: bool,
}

#[derive(Default)]
struct InputVars {
  text: String,
}

/// Built-in self-exercising tests against the headless host.
fn register_demo_tests(engine: &Engine) {
  engine.register(
    located_test!("widgets", "checkbox_toggle")
      .vars::<CheckboxVars>()
      .gui(|ctx| {
        let mut checked = ctx.with_vars(|v: &mut CheckboxVars| v.checked).unwrap_or(false);
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Demo Window", Rect::from_xywh(0.0, 0.0, 320.0, 240.0), |ui| {
            ui.text("Toggle below");
            ui.checkbox("Check", &mut checked);
          });
        }
        ctx.with_vars(|v: &mut CheckboxVars| v.checked = checked);
      })
      .test(|ctx| {
        ctx.set_ref("//Demo Window");
        ctx.item_click("Check");
        let info = ctx.item_info("Check");
        check!(ctx, info.is_some_and(|i| i.has_status(item_status::CHECKED)));
        let after = ctx.with_vars(|v: &mut CheckboxVars| v.checked).unwrap_or(false);
        check!(ctx, after);
      }),
  );

  engine.register(
    located_test!("widgets", "text_input_typing")
      .vars::<InputVars>()
      .gui(|ctx| {
        let mut text = ctx.with_vars(|v: &mut InputVars| v.text.clone()).unwrap_or_default();
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Demo Window", Rect::from_xywh(0.0, 0.0, 320.0, 240.0), |ui| {
            ui.text_input("Name", &mut text);
          });
        }
        ctx.with_vars(|v: &mut InputVars| v.text = text);
      })
      .test(|ctx| {
        ctx.set_ref("//Demo Window");
        ctx.item_click("Name");
        ctx.type_text("hello");
        let typed = ctx.with_vars(|v: &mut InputVars| v.text.clone()).unwrap_or_default();
        check!(ctx, typed == "hello");
      }),
  );

  engine.register(
    located_test!("perf", "text_stress")
      .gui(|ctx| {
        let amount = ctx.engine().with_io(|io| io.perf_stress_amount).max(1);
        if let Some(ui) = ctx.ui::<Ui>() {
          ui.window("Perf Window", Rect::from_xywh(0.0, 0.0, 640.0, 480.0), |ui| {
            for i in 0..amount * 50 {
              ui.text(&format!("Row {i}"));
            }
          });
        }
      })
      .test(|ctx| {
        ctx.yield_frames(30);
        ctx.log_info("stress pass complete");
      }),
  );
}

fn run() -> Result<()> {
  initialize_logging()?;
  initialize_panic_handler()?;

  let args = Cli::parse();
  let mut io = EngineIo::load(args.config.as_deref())?;
  args.apply(&mut io);
  let run_fast = io.run_fast;

  let engine = Engine::new(io);
  engine.install_crash_handler();
  register_demo_tests(&engine);

  let filter = TestFilter::parse(&args.filters);
  if args.list {
    engine.with_tests(|tests| {
      for test in tests {
        if filter.matches(test.group, &test.category, &test.name) {
          println!("{}/{}", test.category, test.name);
        }
      }
    });
    return Ok(());
  }

  let interrupted = Arc::new(AtomicBool::new(false));
  signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;

  engine.start();
  let queued = engine.queue_tests(&filter, run_flags::COMMAND_LINE);
  tracing::info!("Queued {queued} tests");

  let mut host = HeadlessHost::new();
  while engine.is_running_tests() {
    if interrupted.swap(false, Ordering::Relaxed) {
      tracing::warn!("Interrupted, aborting queued tests");
      engine.try_abort_engine();
    }
    host.frame(&engine, 1.0 / 60.0);
    if !run_fast {
      std::thread::sleep(std::time::Duration::from_millis(16));
    }
  }

  engine.print_result_summary();
  engine.export_results()?;
  engine.stop();

  let summary = engine.result_summary();
  if summary.count_success != summary.count_tested {
    std::process::exit(1);
  }
  Ok(())
}

fn main() -> Result<()> {
  if let Err(e) = run() {
    eprintln!("{} error: Something went wrong", env!("CARGO_PKG_NAME"));
    Err(e)
  } else {
    Ok(())
  }
}
