//! Tests for [`Extension`] equality, hashing and wire format.

use std::collections::HashMap;

use proptest::prelude::*;
use rstest::rstest;
use wsbridge::{ConfigError, Extension, ExtensionParseError};

fn deflate(params: &[(&str, &str)]) -> Extension {
    Extension::with_parameters("permessage-deflate", params.iter().copied()).expect("valid extension")
}

#[test]
fn parameter_order_does_not_affect_equality() {
    let a = deflate(&[("client_max_window_bits", "10"), ("server_no_context_takeover", "")]);
    let b = deflate(&[("server_no_context_takeover", ""), ("client_max_window_bits", "10")]);
    assert_eq!(a, b);
    assert_ne!(a.to_wire_format(), b.to_wire_format());
}

#[test]
fn equal_extensions_are_interchangeable_map_keys() {
    let mut negotiated = HashMap::new();
    negotiated.insert(deflate(&[("a", "1"), ("b", "2")]), "first");
    negotiated.insert(deflate(&[("b", "2"), ("a", "1")]), "second");
    assert_eq!(negotiated.len(), 1);
    assert_eq!(negotiated.get(&deflate(&[("a", "1"), ("b", "2")])), Some(&"second"));
}

#[rstest]
#[case(&[("a", "1")], &[("a", "2")])]
#[case(&[("a", "1")], &[("a", "1"), ("b", "1")])]
#[case(&[("a", "1")], &[("b", "1")])]
fn differing_parameters_are_unequal(#[case] left: &[(&str, &str)], #[case] right: &[(&str, &str)]) {
    assert_ne!(deflate(left), deflate(right));
}

#[test]
fn names_are_compared() {
    let a = Extension::new("x-one").expect("valid");
    let b = Extension::new("x-two").expect("valid");
    assert_ne!(a, b);
}

#[test]
fn repeated_key_replaces_value_in_place() {
    let ext = deflate(&[("a", "1"), ("b", "2"), ("a", "3")]);
    assert_eq!(ext.to_wire_format(), "permessage-deflate;a=3;b=2");
    assert_eq!(ext.parameter("a"), Some("3"));
}

#[rstest]
#[case("")]
#[case("   ")]
fn blank_name_is_rejected(#[case] name: &str) {
    assert_eq!(Extension::new(name), Err(ConfigError::BlankExtensionName));
}

#[rstest]
#[case("a;b")]
#[case("a=b")]
#[case("x, y")]
#[case("trailing ")]
fn names_with_separators_are_rejected(#[case] name: &str) {
    assert_eq!(
        Extension::new(name),
        Err(ConfigError::InvalidExtensionToken(name.to_owned()))
    );
}

#[rstest]
#[case("k;j", "1")]
#[case("k", "a b")]
#[case("k", "1,2")]
#[case("k", "\"q\"")]
fn parameters_must_be_tokens(#[case] key: &str, #[case] value: &str) {
    assert!(matches!(
        Extension::with_parameters("x-custom", [(key, value)]),
        Err(ConfigError::InvalidExtensionToken(_))
    ));
}

#[test]
fn quoted_values_must_hold_a_token() {
    let err = "x-custom;k=\"a b\"".parse::<Extension>().expect_err("space inside quotes");
    assert_eq!(
        err,
        ExtensionParseError::Config(ConfigError::InvalidExtensionToken("a b".into()))
    );
}

#[test]
fn header_lists_parse_in_order() {
    let parsed = Extension::parse_header("permessage-deflate; client_max_window_bits=\"10\", x-webkit")
        .expect("valid header");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].parameter("client_max_window_bits"), Some("10"));
    assert_eq!(parsed[1].name(), "x-webkit");
    assert!(parsed[1].parameters().is_empty());
}

#[test]
fn blank_parameter_key_is_reported() {
    let err = "permessage-deflate;=1".parse::<Extension>().expect_err("blank key");
    assert_eq!(
        err,
        ExtensionParseError::BlankParameterKey {
            extension: "permessage-deflate".into()
        }
    );
}

#[test]
fn transport_view_mirrors_descriptor() {
    let ext = deflate(&[("a", "1"), ("b", "2")]);
    let view = ext.as_transport();
    assert_eq!(view.name(), "permessage-deflate");
    assert_eq!(view.parameters().collect::<Vec<_>>(), [("a", "1"), ("b", "2")]);
    assert_eq!(view.header_value(), ext.to_wire_format());
}

const TOKEN: &str = "[A-Za-z0-9!#$%&'*+.^_`|~-]";

fn extension_strategy() -> impl Strategy<Value = Extension> {
    (
        proptest::string::string_regex(&format!("{TOKEN}{{1,12}}")).expect("valid regex"),
        prop::collection::vec((proptest::string::string_regex(&format!("{TOKEN}{{1,8}}")).expect("valid regex"), proptest::string::string_regex(&format!("{TOKEN}{{0,6}}")).expect("valid regex")), 0..5),
    )
        .prop_map(|(name, params)| Extension::with_parameters(name, params).expect("token name"))
}

proptest! {
    #[test]
    fn wire_format_parses_back(ext in extension_strategy()) {
        let parsed: Extension = ext.to_wire_format().parse().expect("canonical form parses");
        prop_assert_eq!(parsed.parameters(), ext.parameters());
        prop_assert_eq!(parsed, ext);
    }
}

proptest! {
    #[test]
    fn separators_never_reach_the_wire(
        name in "[a-z]{1,4}[;=, \"][a-z]{0,4}",
    ) {
        prop_assert!(Extension::new(name).is_err());
    }
}
