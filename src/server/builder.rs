//! Builder for [`EndpointRegistration`].

use std::sync::Arc;

use super::{EndpointRegistration, EndpointSpec, HandshakeModifier};
use crate::{
    codec::CodecRef,
    error::ConfigError,
    extension::Extension,
    handler::{HandlerResolver, SocketHandler},
    properties::UserProperties,
};

/// Collects endpoint metadata; finished by [`handler`](Self::handler).
#[must_use]
pub struct EndpointRegistrationBuilder {
    spec: EndpointSpec,
    user_properties: UserProperties,
}

impl EndpointRegistrationBuilder {
    pub(super) fn new(path: String) -> Self {
        Self {
            spec: EndpointSpec::new(path),
            user_properties: UserProperties::default(),
        }
    }

    /// Add a supported subprotocol.
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.spec.subprotocols.push(protocol.into());
        self
    }

    /// Add several supported subprotocols, in preference order.
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .subprotocols
            .extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Register encoder type `T`.
    pub fn encoder<T: ?Sized + 'static>(mut self) -> Self {
        self.spec.encoders.push(CodecRef::of::<T>());
        self
    }

    /// Register decoder type `T`.
    pub fn decoder<T: ?Sized + 'static>(mut self) -> Self {
        self.spec.decoders.push(CodecRef::of::<T>());
        self
    }

    /// Install an extension.
    pub fn extension(mut self, extension: Extension) -> Self {
        self.spec.extensions.push(extension);
        self
    }

    /// Customise the opening handshake.
    pub fn handshake_modifier<M>(mut self, modifier: M) -> Self
    where
        M: HandshakeModifier + 'static,
    {
        self.spec.handshake_modifier = Some(Arc::new(modifier));
        self
    }

    /// Property copied into every accepted session.
    pub fn user_property<T>(mut self, key: impl Into<String>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.user_properties.insert(key, value);
        self
    }

    /// Attach the handler resolver and build the registration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BlankPath`] or [`ConfigError::RelativePath`]
    /// if the path is unusable.
    pub fn handler<H, R>(self, resolver: R) -> Result<EndpointRegistration, ConfigError>
    where
        H: SocketHandler,
        R: HandlerResolver<H>,
    {
        EndpointRegistration::assemble(self.spec, self.user_properties, resolver)
    }
}
