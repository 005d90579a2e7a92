//! Opening-handshake data shared with handshake hooks.
//!
//! Providers translate their native HTTP types into these small structures
//! before calling a registration's handshake modifier or a client's
//! negotiation hook, then copy any changes back.

use crate::{extension::Extension, properties::UserProperties};

/// `Origin` request header.
pub const ORIGIN: &str = "Origin";
/// `Sec-WebSocket-Protocol` header.
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
/// `Sec-WebSocket-Extensions` header.
pub const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";

/// Ordered HTTP header list with case-insensitive names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty header list.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// First value for `name`.
    #[must_use]
    pub fn get<'a>(&'a self, name: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Comma-separated tokens across every value for `name`.
    #[must_use]
    pub fn tokens(&self, name: &str) -> Vec<String> {
        self.get_all(name)
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Replace every value for `name` with `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Add a value for `name`, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every value for `name`, returning whether any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// Iterate over name/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether there are no header lines.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Upgrade request as seen by handshake hooks.
#[derive(Clone, Debug, Default)]
pub struct HandshakeRequest {
    path: String,
    query: Option<String>,
    headers: Headers,
}

impl HandshakeRequest {
    /// Request for `path` with the given headers.
    pub fn new(path: impl Into<String>, headers: Headers) -> Self {
        Self {
            path: path.into(),
            query: None,
            headers,
        }
    }

    /// Attach the raw query string (without `?`).
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Mutable request headers (client side, before sending).
    pub fn headers_mut(&mut self) -> &mut Headers { &mut self.headers }

    /// `Origin` header, if present.
    #[must_use]
    pub fn origin(&self) -> Option<&str> { self.headers.get(ORIGIN) }

    /// Subprotocols offered by the client, in preference order.
    #[must_use]
    pub fn requested_subprotocols(&self) -> Vec<String> { self.headers.tokens(SEC_WEBSOCKET_PROTOCOL) }

    /// Extensions offered by the client; malformed offers are skipped.
    #[must_use]
    pub fn requested_extensions(&self) -> Vec<Extension> {
        self.headers
            .get_all(SEC_WEBSOCKET_EXTENSIONS)
            .filter_map(|value| Extension::parse_header(value).ok())
            .flatten()
            .collect()
    }
}

/// Upgrade response as seen by handshake hooks.
///
/// On the server side, `properties` starts as a copy of the registration's
/// user properties and becomes the accepted session's property map.
#[derive(Clone, Debug, Default)]
pub struct HandshakeResponse {
    headers: Headers,
    properties: UserProperties,
}

impl HandshakeResponse {
    /// Response carrying `headers` and the initial session properties.
    #[must_use]
    pub fn new(headers: Headers, properties: UserProperties) -> Self { Self { headers, properties } }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut Headers { &mut self.headers }

    /// Properties bound to the session once accepted.
    #[must_use]
    pub fn properties(&self) -> &UserProperties { &self.properties }

    /// Mutable session properties.
    pub fn properties_mut(&mut self) -> &mut UserProperties { &mut self.properties }

    /// Consume the response, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (Headers, UserProperties) { (self.headers, self.properties) }
}

/// Standard subprotocol selection: the first requested protocol the endpoint
/// supports, or `None`.
#[must_use]
pub fn negotiate_subprotocol(supported: &[String], requested: &[String]) -> Option<String> {
    requested
        .iter()
        .find(|candidate| supported.contains(candidate))
        .cloned()
}

/// Standard extension selection: requested extensions whose name is
/// installed, in request order.
#[must_use]
pub fn negotiate_extensions(installed: &[Extension], requested: &[Extension]) -> Vec<Extension> {
    requested
        .iter()
        .filter(|offer| installed.iter().any(|ext| ext.name() == offer.name()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> { items.iter().map(|s| (*s).to_owned()).collect() }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers: Headers = [("origin", "https://example.test")].into_iter().collect();
        assert_eq!(headers.get("Origin"), Some("https://example.test"));
        headers.insert("ORIGIN", "https://other.test");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("origin"), Some("https://other.test"));
    }

    #[test]
    fn looked_up_value_outlives_the_name() {
        let headers: Headers = [("X-Trace", "abc")].into_iter().collect();
        let value = {
            let name = String::from("x-trace");
            headers.get(&name)
        };
        assert_eq!(value, Some("abc"));
    }

    #[test]
    fn subprotocol_tokens_span_header_lines() {
        let headers: Headers = [
            (SEC_WEBSOCKET_PROTOCOL, "chat, superchat"),
            (SEC_WEBSOCKET_PROTOCOL, "v2"),
        ]
        .into_iter()
        .collect();
        let request = HandshakeRequest::new("/chat", headers);
        assert_eq!(request.requested_subprotocols(), strings(&["chat", "superchat", "v2"]));
    }

    #[test]
    fn first_supported_request_wins() {
        let supported = strings(&["v2", "v1"]);
        assert_eq!(
            negotiate_subprotocol(&supported, &strings(&["v3", "v1", "v2"])),
            Some("v1".to_owned())
        );
        assert_eq!(negotiate_subprotocol(&supported, &strings(&["v9"])), None);
    }

    #[test]
    fn extensions_filtered_by_installed_name() {
        let installed = vec![Extension::new("permessage-deflate").expect("valid")];
        let requested = Extension::parse_header("x-unknown, permessage-deflate;server_no_context_takeover")
            .expect("parses");
        let negotiated = negotiate_extensions(&installed, &requested);
        assert_eq!(negotiated.len(), 1);
        assert_eq!(
            negotiated[0].to_wire_format(),
            "permessage-deflate;server_no_context_takeover="
        );
    }
}
