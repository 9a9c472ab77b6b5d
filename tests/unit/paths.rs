use pretty_assertions::assert_eq;
use rstest::rstest;
use uiprobe::host::{hash_path, hash_segment, ElemId};

#[rstest]
#[case("Window/Button")]
#[case("Window//Button")]
#[case("/Window/Button/")]
fn equivalent_spellings_hash_alike(#[case] path: &str) {
  let expected = hash_segment("Button", hash_segment("Window", ElemId::NONE));
  assert_eq!(hash_path(path, ElemId::NONE), expected);
}

#[test]
fn leading_double_slash_ignores_the_seed() {
  let anchored = hash_path("//Window/Button", ElemId(0xDEAD));
  assert_eq!(anchored, hash_path("Window/Button", ElemId::NONE));
}

#[test]
fn relative_paths_compose_with_a_ref_scope() {
  let window = hash_path("//Settings", ElemId::NONE);
  let direct = hash_path("//Settings/Audio/Volume", ElemId::NONE);
  assert_eq!(hash_path("Audio/Volume", window), direct);
  assert_ne!(hash_path("Audio/Volume", ElemId::NONE), direct);
}
