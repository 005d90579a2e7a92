//! Encoder and decoder references carried by registrations.
//!
//! Encoding and decoding happen inside the transport provider; this crate
//! only records which codec types an endpoint declared so the provider can
//! look them up.

use std::any::{TypeId, type_name};

/// Opaque reference to an encoder or decoder type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodecRef {
    id: TypeId,
    name: &'static str,
}

impl CodecRef {
    /// Reference the codec type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// `TypeId` of the referenced codec.
    #[must_use]
    pub fn type_id(&self) -> TypeId { self.id }

    /// Fully qualified type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str { self.name }

    /// Whether this reference names `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool { self.id == TypeId::of::<T>() }
}

#[cfg(test)]
mod tests {
    use super::CodecRef;

    struct JsonEncoder;
    struct JsonDecoder;

    #[test]
    fn references_compare_by_type() {
        assert_eq!(CodecRef::of::<JsonEncoder>(), CodecRef::of::<JsonEncoder>());
        assert_ne!(CodecRef::of::<JsonEncoder>(), CodecRef::of::<JsonDecoder>());
        assert!(CodecRef::of::<JsonDecoder>().is::<JsonDecoder>());
        assert!(CodecRef::of::<JsonDecoder>().type_name().ends_with("JsonDecoder"));
    }
}
