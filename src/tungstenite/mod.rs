//! Transport provider built on `tokio-tungstenite`.
//!
//! [`TungsteniteServer`] implements [`crate::ServerContainer`] and routes
//! upgrades by request path; [`TungsteniteClient`] implements
//! [`crate::ClientContainer`]. Both drive the endpoint's dispatcher from a
//! per-connection task.
//!
//! Tungstenite assembles fragmented messages before handing them over, so
//! handlers see whole messages with `is_last` set in either delivery mode.
//! Extensions are negotiated for handshake hooks but never applied on the
//! wire.

mod client;
mod driver;
mod limits;
mod server;
mod session;

pub use client::TungsteniteClient;
pub use server::TungsteniteServer;
