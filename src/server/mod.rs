//! Server-side endpoint registrations.
//!
//! An [`EndpointRegistration`] aggregates everything a transport container
//! needs to serve one path: the handler resolver, subprotocols, codecs,
//! extensions, an optional [`HandshakeModifier`] and the user properties
//! copied into every accepted session. Registrations are built once, frozen
//! when handed to the container, and read-only afterwards.

mod builder;

use std::{fmt, sync::Arc};

pub use builder::EndpointRegistrationBuilder;

use crate::{
    codec::CodecRef,
    dispatch::{self, Endpoint, EndpointFactory},
    error::{ConfigError, ResolveError},
    extension::Extension,
    handler::{HandlerResolver, SocketHandler},
    handshake::{self, HandshakeRequest, HandshakeResponse},
    properties::UserProperties,
};

/// Hook customising the opening handshake of an endpoint.
///
/// Every method has a default implementing standard behaviour, so
/// implementors override only what they need.
///
/// ```
/// use wsbridge::{HandshakeModifier, HandshakeRequest, HandshakeResponse};
///
/// struct CopyUserAgent;
///
/// impl HandshakeModifier for CopyUserAgent {
///     fn modify_handshake(&self, request: &HandshakeRequest, response: &mut HandshakeResponse) {
///         if let Some(agent) = request.headers().get("User-Agent") {
///             response.properties_mut().insert("user-agent", agent.to_owned());
///         }
///     }
/// }
/// ```
pub trait HandshakeModifier: Send + Sync {
    /// Adjust the response or session properties before the upgrade completes.
    fn modify_handshake(&self, _request: &HandshakeRequest, _response: &mut HandshakeResponse) {}

    /// Whether a request carrying `origin` may connect. Accepts any origin.
    fn check_origin(&self, _origin: Option<&str>) -> bool { true }

    /// Pick the subprotocol for the session.
    ///
    /// Defaults to the first requested protocol the endpoint supports.
    fn negotiated_subprotocol(&self, supported: &[String], requested: &[String]) -> Option<String> {
        handshake::negotiate_subprotocol(supported, requested)
    }

    /// Pick the extensions for the session.
    ///
    /// Defaults to the requested extensions whose name is installed.
    fn negotiated_extensions(&self, installed: &[Extension], requested: &[Extension]) -> Vec<Extension> {
        handshake::negotiate_extensions(installed, requested)
    }
}

/// Capability set describing an endpoint, as produced by metadata discovery.
#[derive(Clone, Default)]
pub struct EndpointSpec {
    /// Absolute request path served by the endpoint.
    pub path: String,
    /// Supported subprotocols in preference order.
    pub subprotocols: Vec<String>,
    /// Message encoders.
    pub encoders: Vec<CodecRef>,
    /// Message decoders.
    pub decoders: Vec<CodecRef>,
    /// Installed extensions.
    pub extensions: Vec<Extension>,
    /// Optional handshake hook.
    pub handshake_modifier: Option<Arc<dyn HandshakeModifier>>,
}

impl EndpointSpec {
    /// Spec for `path` with no optional capabilities.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("path", &self.path)
            .field("subprotocols", &self.subprotocols)
            .field("encoders", &self.encoders)
            .field("decoders", &self.decoders)
            .field("extensions", &self.extensions)
            .field("handshake_modifier", &self.handshake_modifier.is_some())
            .finish()
    }
}

/// Registration of one server endpoint.
pub struct EndpointRegistration {
    path: String,
    handler_type: &'static str,
    subprotocols: Vec<String>,
    encoders: Vec<CodecRef>,
    decoders: Vec<CodecRef>,
    extensions: Vec<Extension>,
    modifier: Option<Arc<dyn HandshakeModifier>>,
    user_properties: UserProperties,
    factory: EndpointFactory,
    frozen: bool,
}

impl EndpointRegistration {
    /// Start building a registration for `path`.
    ///
    /// ```
    /// use wsbridge::{EndpointRegistration, handler};
    /// # use wsbridge::{CloseReason, HandlerResult, SessionHandle, SocketError, SocketHandler};
    /// # struct Chat;
    /// # impl SocketHandler for Chat {
    /// #     fn on_open(&self, _: &SessionHandle) -> HandlerResult { Ok(()) }
    /// #     fn on_close(&self, _: &SessionHandle, _: &CloseReason) -> HandlerResult { Ok(()) }
    /// #     fn on_text(&self, _: &SessionHandle, _: &str, _: bool) {}
    /// #     fn on_binary(&self, _: &SessionHandle, _: &[u8], _: bool) {}
    /// #     fn on_error(&self, _: &SessionHandle, _: &SocketError) -> HandlerResult { Ok(()) }
    /// # }
    ///
    /// let registration = EndpointRegistration::builder("/chat")
    ///     .subprotocol("chat.v1")
    ///     .user_property("room", String::from("lobby"))
    ///     .handler(handler::shared(Chat))
    ///     .expect("valid registration");
    /// assert_eq!(registration.path(), "/chat");
    /// ```
    pub fn builder(path: impl Into<String>) -> EndpointRegistrationBuilder {
        EndpointRegistrationBuilder::new(path.into())
    }

    /// Build a registration from a capability set and a handler resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BlankPath`] or [`ConfigError::RelativePath`]
    /// if the spec's path is unusable.
    pub fn from_spec<H, R>(spec: EndpointSpec, resolver: R) -> Result<Self, ConfigError>
    where
        H: SocketHandler,
        R: HandlerResolver<H>,
    {
        Self::assemble(spec, UserProperties::default(), resolver)
    }

    fn assemble<H, R>(spec: EndpointSpec, user_properties: UserProperties, resolver: R) -> Result<Self, ConfigError>
    where
        H: SocketHandler,
        R: HandlerResolver<H>,
    {
        let EndpointSpec {
            path,
            subprotocols,
            encoders,
            decoders,
            extensions,
            handshake_modifier,
        } = spec;
        let path = validate_path(path)?;
        Ok(Self {
            path,
            handler_type: std::any::type_name::<H>(),
            subprotocols,
            encoders,
            decoders,
            extensions,
            modifier: handshake_modifier,
            user_properties,
            factory: dispatch::endpoint_factory(resolver),
            frozen: false,
        })
    }

    /// Request path served by this endpoint.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Type name of the handler.
    #[must_use]
    pub fn handler_type(&self) -> &'static str { self.handler_type }

    /// Supported subprotocols in preference order.
    #[must_use]
    pub fn subprotocols(&self) -> &[String] { &self.subprotocols }

    /// Message encoders.
    #[must_use]
    pub fn encoders(&self) -> &[CodecRef] { &self.encoders }

    /// Message decoders.
    #[must_use]
    pub fn decoders(&self) -> &[CodecRef] { &self.decoders }

    /// Installed extensions.
    #[must_use]
    pub fn extensions(&self) -> &[Extension] { &self.extensions }

    /// Properties copied into every accepted session.
    #[must_use]
    pub fn user_properties(&self) -> &UserProperties { &self.user_properties }

    /// Whether a handshake modifier is configured.
    #[must_use]
    pub fn has_handshake_modifier(&self) -> bool { self.modifier.is_some() }

    /// Whether the registration has been handed to a container.
    #[must_use]
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Prevent further changes to extensions and user properties.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Replace the installed extensions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Frozen`] once the registration is frozen.
    pub fn set_extensions(&mut self, extensions: Vec<Extension>) -> Result<(), ConfigError> {
        self.ensure_mutable()?;
        self.extensions = extensions;
        Ok(())
    }

    /// Replace the user properties.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Frozen`] once the registration is frozen.
    pub fn set_user_properties(&mut self, properties: UserProperties) -> Result<(), ConfigError> {
        self.ensure_mutable()?;
        self.user_properties = properties;
        Ok(())
    }

    /// Insert one user property.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Frozen`] once the registration is frozen.
    pub fn insert_user_property<T>(&mut self, key: impl Into<String>, value: T) -> Result<(), ConfigError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_mutable()?;
        self.user_properties.insert(key, value);
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), ConfigError> {
        if self.frozen {
            return Err(ConfigError::Frozen {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Resolve a handler and wrap it for a new connection.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's [`ResolveError`].
    pub fn endpoint_instance(&self) -> Result<Arc<dyn Endpoint>, ResolveError> { (self.factory)() }

    /// Response template for a new handshake, seeded with this endpoint's
    /// user properties.
    #[must_use]
    pub fn handshake_response(&self) -> HandshakeResponse {
        HandshakeResponse::new(handshake::Headers::new(), self.user_properties.clone())
    }

    /// Run the handshake modifier, if any.
    pub fn modify_handshake(&self, request: &HandshakeRequest, response: &mut HandshakeResponse) {
        if let Some(modifier) = &self.modifier {
            modifier.modify_handshake(request, response);
        }
    }

    /// Whether `origin` may connect.
    #[must_use]
    pub fn check_origin(&self, origin: Option<&str>) -> bool {
        self.modifier
            .as_ref()
            .is_none_or(|modifier| modifier.check_origin(origin))
    }

    /// Subprotocol selected for a client offering `requested`.
    #[must_use]
    pub fn negotiated_subprotocol(&self, requested: &[String]) -> Option<String> {
        match &self.modifier {
            Some(modifier) => modifier.negotiated_subprotocol(&self.subprotocols, requested),
            None => handshake::negotiate_subprotocol(&self.subprotocols, requested),
        }
    }

    /// Extensions selected for a client offering `requested`.
    #[must_use]
    pub fn negotiated_extensions(&self, requested: &[Extension]) -> Vec<Extension> {
        match &self.modifier {
            Some(modifier) => modifier.negotiated_extensions(&self.extensions, requested),
            None => handshake::negotiate_extensions(&self.extensions, requested),
        }
    }
}

impl fmt::Debug for EndpointRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistration")
            .field("path", &self.path)
            .field("handler_type", &self.handler_type)
            .field("subprotocols", &self.subprotocols)
            .field("encoders", &self.encoders)
            .field("decoders", &self.decoders)
            .field("extensions", &self.extensions)
            .field("handshake_modifier", &self.modifier.is_some())
            .field("user_properties", &self.user_properties)
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

fn validate_path(path: String) -> Result<String, ConfigError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::BlankPath);
    }
    if !trimmed.starts_with('/') {
        return Err(ConfigError::RelativePath(path));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        error::{HandlerResult, SocketError},
        handler,
        session::{CloseReason, SessionHandle},
    };

    struct Silent;

    impl SocketHandler for Silent {
        fn on_open(&self, _session: &SessionHandle) -> HandlerResult { Ok(()) }
        fn on_close(&self, _session: &SessionHandle, _reason: &CloseReason) -> HandlerResult { Ok(()) }
        fn on_text(&self, _session: &SessionHandle, _text: &str, _is_last: bool) {}
        fn on_binary(&self, _session: &SessionHandle, _data: &[u8], _is_last: bool) {}
        fn on_error(&self, _session: &SessionHandle, _error: &SocketError) -> HandlerResult { Ok(()) }
    }

    struct RejectAll;

    impl HandshakeModifier for RejectAll {
        fn check_origin(&self, _origin: Option<&str>) -> bool { false }
        fn negotiated_subprotocol(&self, _supported: &[String], _requested: &[String]) -> Option<String> {
            None
        }
    }

    #[fixture]
    fn registration() -> EndpointRegistration {
        EndpointRegistration::builder("/chat")
            .subprotocols(["v2", "v1"])
            .extension(Extension::new("permessage-deflate").expect("valid"))
            .handler(handler::shared(Silent))
            .expect("valid registration")
    }

    #[rstest]
    #[case("", ConfigError::BlankPath)]
    #[case("  ", ConfigError::BlankPath)]
    #[case("chat", ConfigError::RelativePath("chat".into()))]
    fn unusable_paths_are_rejected(#[case] path: &str, #[case] expected: ConfigError) {
        let err = EndpointRegistration::builder(path)
            .handler(handler::shared(Silent))
            .expect_err("path must be rejected");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn frozen_registration_rejects_mutation(mut registration: EndpointRegistration) {
        registration
            .insert_user_property("k", 1_u8)
            .expect("mutable before freeze");
        registration.freeze();
        assert_eq!(
            registration.set_extensions(Vec::new()),
            Err(ConfigError::Frozen { path: "/chat".into() })
        );
        assert!(registration.insert_user_property("k", 2_u8).is_err());
        assert_eq!(registration.user_properties().get::<u8>("k").as_deref(), Some(&1));
    }

    #[rstest]
    fn defaults_negotiate_without_modifier(registration: EndpointRegistration) {
        assert!(registration.check_origin(Some("https://anywhere.test")));
        assert_eq!(
            registration.negotiated_subprotocol(&["v1".into(), "v2".into()]),
            Some("v1".into())
        );
        let requested = Extension::parse_header("x-other, permessage-deflate").expect("parses");
        assert_eq!(registration.negotiated_extensions(&requested).len(), 1);
    }

    #[test]
    fn modifier_overrides_defaults() {
        let spec = EndpointSpec {
            subprotocols: vec!["v1".into()],
            handshake_modifier: Some(Arc::new(RejectAll)),
            ..EndpointSpec::new("/locked")
        };
        let registration =
            EndpointRegistration::from_spec(spec, handler::shared(Silent)).expect("valid registration");
        assert!(!registration.check_origin(None));
        assert_eq!(registration.negotiated_subprotocol(&["v1".into()]), None);
    }

    #[rstest]
    fn endpoint_instance_wraps_resolved_handler(registration: EndpointRegistration) {
        let endpoint = registration.endpoint_instance().expect("resolves");
        assert_eq!(endpoint.handler_type(), registration.handler_type());
        assert!(registration.handler_type().ends_with("Silent"));
    }
}
