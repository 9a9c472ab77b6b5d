use quick_xml::events::Event;
use quick_xml::Reader;
use uiprobe::export::write_junit_xml;
use uiprobe::test::{Test, TestStatus, VerboseLevel};
use uiprobe::EngineIo;

fn passing(name: &str) -> Test {
  let mut t = Test::new("widgets", name);
  t.status = TestStatus::Success;
  t.start_time = 0;
  t.end_time = 250_000;
  t
}

fn failing(name: &str) -> Test {
  let mut t = Test::new("widgets", name);
  t.status = TestStatus::Error;
  t.log.append(VerboseLevel::Info, format!("Test: 'widgets' '{name}'.."));
  t.log.append(VerboseLevel::Error, "KO demo.rs:42 'count == 3'".into());
  t.log.append(VerboseLevel::Error, format!("'{name}' test failed."));
  t
}

#[derive(Default)]
struct Parsed {
  testsuites: usize,
  testsuite: usize,
  testcase: usize,
  failures: usize,
  root_failures: String,
  failure_message: String,
  text: String,
}

fn parse(xml: &str) -> Parsed {
  let mut reader = Reader::from_str(xml);
  let mut parsed = Parsed::default();
  loop {
    match reader.read_event().expect("well-formed xml") {
      Event::Eof => break,
      Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
        b"testsuites" => {
          parsed.testsuites += 1;
          if let Some(attr) = e.try_get_attribute("failures").expect("attributes parse") {
            parsed.root_failures = attr.unescape_value().expect("attribute value").into_owned();
          }
        },
        b"testsuite" => parsed.testsuite += 1,
        b"testcase" => parsed.testcase += 1,
        b"failure" => {
          parsed.failures += 1;
          if let Some(attr) = e.try_get_attribute("message").expect("attributes parse") {
            parsed.failure_message = attr.unescape_value().expect("attribute value").into_owned();
          }
        },
        _ => {},
      },
      Event::Text(e) => parsed.text.push_str(&e.unescape().expect("text unescapes")),
      _ => {},
    }
  }
  parsed
}

#[test]
fn document_counts_cases_per_group() {
  let tests = vec![passing("ok_one"), passing("ok_two"), failing("broken")];
  let mut buf = Vec::new();
  write_junit_xml(&tests, &EngineIo::default(), 0, 2_000_000, &mut buf).unwrap();
  let xml = String::from_utf8(buf).unwrap();

  let parsed = parse(&xml);
  assert_eq!(parsed.testsuites, 1);
  // One suite per group, even when the perf group is empty.
  assert_eq!(parsed.testsuite, 2);
  assert_eq!(parsed.testcase, 3);
  assert_eq!(parsed.failures, 1);
  assert_eq!(parsed.root_failures, "1");
  assert!(xml.contains("status=\"success\""));
  assert!(xml.contains("status=\"error\""));
}

#[test]
fn failure_element_carries_the_substantive_error() {
  let tests = vec![failing("broken")];
  let mut buf = Vec::new();
  write_junit_xml(&tests, &EngineIo::default(), 0, 1_000_000, &mut buf).unwrap();
  let xml = String::from_utf8(buf).unwrap();

  let parsed = parse(&xml);
  assert_eq!(parsed.failure_message, "KO demo.rs:42 'count == 3'");
  // The body dumps the log at the on-error verbosity, header included.
  assert!(parsed.text.contains("Test: 'widgets' 'broken'.."));
}

#[test]
fn skipped_tests_count_as_disabled() {
  let mut skipped = Test::new("widgets", "never_ran");
  skipped.status = TestStatus::Unknown;
  let tests = vec![skipped, passing("ok")];
  let mut buf = Vec::new();
  write_junit_xml(&tests, &EngineIo::default(), 0, 1_000_000, &mut buf).unwrap();
  let xml = String::from_utf8(buf).unwrap();

  assert!(xml.contains("disabled=\"1\""));
  assert!(xml.contains("status=\"skipped\""));
}
