use pretty_assertions::assert_eq;
use uiprobe::settings::PersistedSettings;
use uiprobe::{Engine, EngineIo};

#[test]
fn engine_settings_round_trip_through_a_host_ini() {
  let engine = Engine::new(EngineIo::default());
  engine.with_io(|io| io.capture_on_error = true);
  engine.set_persisted_settings(PersistedSettings {
    filter_tests: "nav".into(),
    filter_perfs: "stress".into(),
  });

  let mut blob = String::new();
  engine.settings_write(&mut blob);
  assert!(blob.starts_with("[UiProbe][Data]\n"));

  let restored = Engine::new(EngineIo::default());
  for line in blob.lines().skip(1) {
    restored.settings_read_line(line);
  }
  assert_eq!(restored.persisted_settings().filter_tests, "nav");
  assert_eq!(restored.persisted_settings().filter_perfs, "stress");
  assert!(restored.with_io(|io| io.capture_on_error));
}
