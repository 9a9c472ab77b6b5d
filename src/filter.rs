use crate::test::TestGroup;

/// Queue-selection filter built from CLI tokens: `name` substring include,
/// `-name` exclude, `^name` prefix anchor, and the group tokens `all`,
/// `tests`, `perf`.
#[derive(Debug, Default, Clone)]
pub struct TestFilter {
  includes: Vec<String>,
  excludes: Vec<String>,
  prefixes: Vec<String>,
  groups: Vec<TestGroup>,
  all: bool,
}

impl TestFilter {
  pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
    let mut filter = Self::default();
    for token in tokens {
      let token = token.as_ref();
      match token {
        "" => {},
        "all" => filter.all = true,
        "tests" => filter.groups.push(TestGroup::Tests),
        "perf" | "perfs" => filter.groups.push(TestGroup::Perfs),
        _ => {
          if let Some(rest) = token.strip_prefix('-') {
            filter.excludes.push(rest.to_string());
          } else if let Some(rest) = token.strip_prefix('^') {
            filter.prefixes.push(rest.to_string());
          } else {
            filter.includes.push(token.to_string());
          }
        },
      }
    }
    filter
  }

  /// Groups selected by tokens; defaults to functional tests only, like an
  /// empty command line.
  pub fn groups(&self) -> Vec<TestGroup> {
    if self.all {
      return vec![TestGroup::Tests, TestGroup::Perfs];
    }
    if self.groups.is_empty() {
      vec![TestGroup::Tests]
    } else {
      self.groups.clone()
    }
  }

  pub fn matches(&self, group: TestGroup, category: &str, name: &str) -> bool {
    if !self.groups().contains(&group) {
      return false;
    }
    if self.excludes.iter().any(|t| name.contains(t.as_str()) || category.contains(t.as_str())) {
      return false;
    }
    if !self.prefixes.is_empty() && self.prefixes.iter().any(|t| name.starts_with(t.as_str())) {
      return true;
    }
    if self.includes.is_empty() {
      return self.prefixes.is_empty();
    }
    self.includes.iter().any(|t| name.contains(t.as_str()) || category.contains(t.as_str()))
  }
}
