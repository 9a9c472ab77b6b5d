//! JUnit-style XML result export, consuming the final test registry.

use std::io::Write;

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::config::EngineIo;
use crate::test::{Test, TestGroup, TestStatus};

#[derive(Debug, Default)]
struct SuiteStats {
  tests: usize,
  failures: usize,
  disabled: usize,
}

fn micros_to_secs(start: i64, end: i64) -> f64 {
  ((end - start).max(0) as f64) / 1_000_000.0
}

fn iso8601(micros: i64) -> String {
  DateTime::<Utc>::from_timestamp_micros(micros)
    .unwrap_or_default()
    .format("%Y-%m-%dT%H:%M:%S")
    .to_string()
}

/// The last substantive error line; the final "<name> test failed." line is
/// generic and skipped when an earlier one exists.
fn failure_message(test: &Test) -> String {
  let errors: Vec<&str> = test.log.error_lines().map(|l| l.text.as_str()).collect();
  match errors.len() {
    0 => String::new(),
    1 => errors[0].to_string(),
    n => errors[n - 2].to_string(),
  }
}

pub fn write_junit_xml(tests: &[Test], io: &EngineIo, start_micros: i64, end_micros: i64, out: impl Write) -> Result<()> {
  let mut stats = [SuiteStats::default(), SuiteStats::default()];
  for test in tests {
    let s = &mut stats[test.group as usize];
    s.tests += 1;
    match test.status {
      TestStatus::Error => s.failures += 1,
      TestStatus::Unknown => s.disabled += 1,
      _ => {},
    }
  }
  let total_time = micros_to_secs(start_micros, end_micros);
  let timestamp = iso8601(start_micros);

  let mut w = Writer::new_with_indent(out, b' ', 2);
  w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

  let mut root = BytesStart::new("testsuites");
  root.push_attribute(("disabled", (stats[0].disabled + stats[1].disabled).to_string().as_str()));
  root.push_attribute(("errors", "0"));
  root.push_attribute(("failures", (stats[0].failures + stats[1].failures).to_string().as_str()));
  root.push_attribute(("name", "uiprobe"));
  root.push_attribute(("tests", (stats[0].tests + stats[1].tests).to_string().as_str()));
  root.push_attribute(("time", format!("{total_time:.3}").as_str()));
  w.write_event(Event::Start(root))?;

  for group in [TestGroup::Tests, TestGroup::Perfs] {
    let s = &stats[group as usize];
    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", group.to_string().as_str()));
    suite.push_attribute(("tests", s.tests.to_string().as_str()));
    suite.push_attribute(("disabled", s.disabled.to_string().as_str()));
    suite.push_attribute(("errors", "0"));
    suite.push_attribute(("failures", s.failures.to_string().as_str()));
    suite.push_attribute(("hostname", ""));
    suite.push_attribute(("id", (group as usize).to_string().as_str()));
    suite.push_attribute(("package", ""));
    suite.push_attribute(("skipped", "0"));
    suite.push_attribute(("time", format!("{total_time:.3}").as_str()));
    suite.push_attribute(("timestamp", timestamp.as_str()));
    w.write_event(Event::Start(suite))?;

    for test in tests.iter().filter(|t| t.group == group) {
      let case_time = micros_to_secs(test.start_time, test.end_time);
      let mut case = BytesStart::new("testcase");
      case.push_attribute(("name", test.name.as_str()));
      case.push_attribute(("assertions", "0"));
      case.push_attribute(("classname", test.category.as_str()));
      case.push_attribute(("status", test.status.export_name()));
      case.push_attribute(("time", format!("{case_time:.3}").as_str()));

      if test.status == TestStatus::Error {
        w.write_event(Event::Start(case))?;
        let mut failure = BytesStart::new("failure");
        failure.push_attribute(("message", failure_message(test).as_str()));
        failure.push_attribute(("type", "error"));
        w.write_event(Event::Start(failure))?;
        let body: Vec<String> =
          test.log.lines_at(io.verbose_level_on_error).map(|l| l.text.clone()).collect();
        w.write_event(Event::Text(BytesText::new(&body.join("\n"))))?;
        w.write_event(Event::End(BytesEnd::new("failure")))?;
        w.write_event(Event::End(BytesEnd::new("testcase")))?;
      } else {
        w.write_event(Event::Empty(case))?;
      }
    }

    w.write_event(Event::Empty(BytesStart::new("system-out")))?;
    w.write_event(Event::Empty(BytesStart::new("system-err")))?;
    w.write_event(Event::End(BytesEnd::new("testsuite")))?;
  }

  w.write_event(Event::End(BytesEnd::new("testsuites")))?;
  Ok(())
}
