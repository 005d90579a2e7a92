//! Per-connection client endpoint configuration.

use std::{fmt, sync::Arc};

use crate::{
    codec::CodecRef,
    extension::Extension,
    handshake::{HandshakeResponse, Headers, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL},
};

/// Hook customising the client side of the opening handshake.
pub trait ClientNegotiator: Send + Sync {
    /// Adjust the upgrade request headers before they are sent.
    fn before_request(&self, _headers: &mut Headers) {}

    /// Inspect the server's upgrade response.
    fn after_response(&self, _response: &HandshakeResponse) {}
}

/// Settings a [`crate::ClientContainer`] applies when opening a connection.
#[derive(Clone, Default)]
pub struct ClientEndpointConfig {
    pub(super) preferred_subprotocols: Vec<String>,
    pub(super) extensions: Vec<Extension>,
    pub(super) encoders: Vec<CodecRef>,
    pub(super) decoders: Vec<CodecRef>,
    pub(super) negotiator: Option<Arc<dyn ClientNegotiator>>,
}

impl ClientEndpointConfig {
    /// Subprotocols offered to the server, in preference order.
    #[must_use]
    pub fn preferred_subprotocols(&self) -> &[String] { &self.preferred_subprotocols }

    /// Extensions offered to the server.
    #[must_use]
    pub fn extensions(&self) -> &[Extension] { &self.extensions }

    /// Message encoders.
    #[must_use]
    pub fn encoders(&self) -> &[CodecRef] { &self.encoders }

    /// Message decoders.
    #[must_use]
    pub fn decoders(&self) -> &[CodecRef] { &self.decoders }

    /// Headers for the upgrade request: the subprotocol and extension offers,
    /// then whatever the negotiation hook adds.
    #[must_use]
    pub fn request_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if !self.preferred_subprotocols.is_empty() {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, self.preferred_subprotocols.join(", "));
        }
        if !self.extensions.is_empty() {
            let offers: Vec<String> = self
                .extensions
                .iter()
                .map(|ext| ext.as_transport().header_value())
                .collect();
            headers.insert(SEC_WEBSOCKET_EXTENSIONS, offers.join(", "));
        }
        if let Some(negotiator) = &self.negotiator {
            negotiator.before_request(&mut headers);
        }
        headers
    }

    /// Pass the server's response to the negotiation hook, if any.
    pub fn after_response(&self, response: &HandshakeResponse) {
        if let Some(negotiator) = &self.negotiator {
            negotiator.after_response(response);
        }
    }
}

impl fmt::Debug for ClientEndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEndpointConfig")
            .field("preferred_subprotocols", &self.preferred_subprotocols)
            .field("extensions", &self.extensions)
            .field("encoders", &self.encoders)
            .field("decoders", &self.decoders)
            .field("negotiator", &self.negotiator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddToken;

    impl ClientNegotiator for AddToken {
        fn before_request(&self, headers: &mut Headers) { headers.insert("Authorization", "Bearer t"); }
    }

    #[test]
    fn request_headers_carry_offers_and_hook_changes() {
        let config = ClientEndpointConfig {
            preferred_subprotocols: vec!["v2".into(), "v1".into()],
            extensions: vec![Extension::with_parameters("x-a", [("k", "1")]).expect("valid")],
            negotiator: Some(Arc::new(AddToken)),
            ..ClientEndpointConfig::default()
        };
        let headers = config.request_headers();
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL), Some("v2, v1"));
        assert_eq!(headers.get(SEC_WEBSOCKET_EXTENSIONS), Some("x-a;k=1"));
        assert_eq!(headers.get("authorization"), Some("Bearer t"));
    }

    #[test]
    fn empty_config_sends_no_offers() {
        assert!(ClientEndpointConfig::default().request_headers().is_empty());
    }
}
