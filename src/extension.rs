//! WebSocket extension descriptors.
//!
//! [`Extension`] is an immutable name plus an ordered parameter mapping. Its
//! canonical string form (`name;k1=v1;k2=v2`) matches the
//! `Sec-WebSocket-Extensions` header syntax, and [`TransportExtension`] is the
//! read-only view handed to transport providers.

use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::error::{ConfigError, ExtensionParseError};

/// A negotiated or offered WebSocket extension.
///
/// Parameter keys are unique; inserting an existing key replaces its value in
/// place. Equality and hashing consider the parameter *set*, so two
/// descriptors listing the same pairs in a different order are equal and
/// interchangeable as map keys.
///
/// ```
/// use wsbridge::Extension;
///
/// let ext = Extension::with_parameters(
///     "permessage-deflate",
///     [("client_max_window_bits", "10")],
/// )
/// .expect("valid extension");
/// assert_eq!(
///     ext.to_wire_format(),
///     "permessage-deflate;client_max_window_bits=10"
/// );
/// ```
#[derive(Clone, Debug)]
pub struct Extension {
    name: String,
    parameters: Vec<(String, String)>,
}

impl Extension {
    /// Create an extension without parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BlankExtensionName`] if `name` is empty or
    /// whitespace, and [`ConfigError::InvalidExtensionToken`] if it is not an
    /// HTTP token.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_parameters(name, std::iter::empty::<(String, String)>())
    }

    /// Create an extension with the given parameters in insertion order.
    ///
    /// Names and keys must be HTTP tokens; values must be tokens or empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BlankExtensionName`] if `name` is empty or
    /// whitespace, and [`ConfigError::InvalidExtensionToken`] for any other
    /// name, key or value that cannot be written to the header unescaped.
    pub fn with_parameters<I, K, V>(name: impl Into<String>, parameters: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::BlankExtensionName);
        }
        let mut extension = Self {
            name: token(name)?,
            parameters: Vec::new(),
        };
        for (key, value) in parameters {
            extension.add(key.into(), value.into())?;
        }
        Ok(extension)
    }

    fn add(&mut self, key: String, value: String) -> Result<(), ConfigError> {
        let value = if value.is_empty() { value } else { token(value)? };
        self.insert(token(key)?, value);
        Ok(())
    }

    fn insert(&mut self, key: String, value: String) {
        if let Some(slot) = self.parameters.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.parameters.push((key, value));
        }
    }

    /// Extension token, e.g. `permessage-deflate`.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Parameters in insertion order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] { &self.parameters }

    /// Value of a single parameter, if present.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the canonical `name;k1=v1;k2=v2` form.
    #[must_use]
    pub fn to_wire_format(&self) -> String { self.to_string() }

    /// Borrow a read-only view suitable for transport providers.
    #[must_use]
    pub fn as_transport(&self) -> TransportExtension<'_> { TransportExtension { inner: self } }

    /// Parse a comma-separated `Sec-WebSocket-Extensions` header value.
    ///
    /// Quoted parameter values containing commas are not supported.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionParseError`] if any listed extension is malformed.
    pub fn parse_header(value: &str) -> Result<Vec<Self>, ExtensionParseError> {
        value
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    fn parameter_set_hash(&self) -> u64 {
        self.parameters
            .iter()
            .map(|pair| {
                let mut hasher = DefaultHasher::new();
                pair.hash(&mut hasher);
                hasher.finish()
            })
            .fold(0u64, u64::wrapping_add)
    }
}

/// `tchar` from RFC 7230, which RFC 6455 uses for extension tokens.
fn is_tchar(c: char) -> bool { c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c) }

fn token(candidate: String) -> Result<String, ConfigError> {
    if !candidate.is_empty() && candidate.chars().all(is_tchar) {
        Ok(candidate)
    } else {
        Err(ConfigError::InvalidExtensionToken(candidate))
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .all(|(k, v)| other.parameter(k) == Some(v.as_str()))
    }
}

impl Eq for Extension {}

impl Hash for Extension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.parameters.len().hash(state);
        state.write_u64(self.parameter_set_hash());
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.parameters {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Extension {
    type Err = ExtensionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split(';');
        let name = segments.next().unwrap_or_default().trim();
        let mut extension = Self::new(name)?;
        for segment in segments.map(str::trim).filter(|seg| !seg.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .map_or((segment, ""), |(k, v)| (k.trim(), v.trim()));
            if key.is_empty() {
                return Err(ExtensionParseError::BlankParameterKey {
                    extension: name.to_owned(),
                });
            }
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            extension.add(key.to_owned(), value.to_owned())?;
        }
        Ok(extension)
    }
}

/// Read-only extension view consumed by transport providers.
#[derive(Clone, Copy, Debug)]
pub struct TransportExtension<'a> {
    inner: &'a Extension,
}

impl<'a> TransportExtension<'a> {
    /// Extension token.
    #[must_use]
    pub fn name(&self) -> &'a str { &self.inner.name }

    /// Parameters as borrowed name/value pairs, in insertion order.
    pub fn parameters(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.inner
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Header form of the extension offer.
    #[must_use]
    pub fn header_value(&self) -> String { self.inner.to_wire_format() }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_names_are_rejected(#[case] name: &str) {
        assert_eq!(Extension::new(name), Err(ConfigError::BlankExtensionName));
    }

    #[rstest]
    #[case("a;b")]
    #[case("a=b")]
    #[case("a,b")]
    #[case(" padded")]
    #[case("quo\"te")]
    fn separators_in_names_are_rejected(#[case] name: &str) {
        assert_eq!(
            Extension::new(name),
            Err(ConfigError::InvalidExtensionToken(name.to_owned()))
        );
    }

    #[test]
    fn canonical_form_follows_insertion_order() {
        let ext = Extension::with_parameters("x-custom", [("b", "2"), ("a", "1")])
            .expect("valid extension");
        assert_eq!(ext.to_wire_format(), "x-custom;b=2;a=1");
        assert_eq!(Extension::new("bare").expect("valid").to_wire_format(), "bare");
    }

    #[test]
    fn duplicate_keys_replace_in_place() {
        let ext = Extension::with_parameters("x", [("a", "1"), ("b", "2"), ("a", "3")])
            .expect("valid extension");
        assert_eq!(ext.to_wire_format(), "x;a=3;b=2");
        assert_eq!(ext.parameter("a"), Some("3"));
    }

    #[test]
    fn equality_ignores_parameter_order() {
        let left = Extension::with_parameters("x", [("a", "1"), ("b", "2")]).expect("valid");
        let right = Extension::with_parameters("x", [("b", "2"), ("a", "1")]).expect("valid");
        assert_eq!(left, right);

        let mut map = HashMap::new();
        map.insert(left, "first");
        assert_eq!(map.get(&right), Some(&"first"));
    }

    #[test]
    fn differing_values_are_not_equal() {
        let left = Extension::with_parameters("x", [("a", "1")]).expect("valid");
        let right = Extension::with_parameters("x", [("a", "2")]).expect("valid");
        assert_ne!(left, right);
    }

    #[test]
    fn parses_header_with_whitespace_and_valueless_params() {
        let parsed = Extension::parse_header(
            "permessage-deflate; client_max_window_bits, x-foo;level=\"3\"",
        )
        .expect("header parses");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name(), "permessage-deflate");
        assert_eq!(parsed[0].parameter("client_max_window_bits"), Some(""));
        assert_eq!(parsed[1].parameter("level"), Some("3"));
    }

    #[test]
    fn blank_parameter_key_is_rejected() {
        let err = "x;=1".parse::<Extension>().expect_err("blank key must fail");
        assert_eq!(
            err,
            ExtensionParseError::BlankParameterKey {
                extension: "x".into()
            }
        );
    }

    #[test]
    fn transport_view_exposes_state() {
        let ext = Extension::with_parameters("x", [("a", "1")]).expect("valid");
        let view = ext.as_transport();
        assert_eq!(view.name(), "x");
        assert_eq!(view.parameters().collect::<Vec<_>>(), vec![("a", "1")]);
        assert_eq!(view.header_value(), "x;a=1");
    }
}
