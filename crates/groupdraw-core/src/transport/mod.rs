//! Group-session transport abstraction.
//!
//! A [`SessionProvider`] offers sessions; each offered [`SessionHandle`]
//! carries one reliable, in-order message channel and a live roster.
//! Payloads are opaque bytes here: encoding belongs to
//! [`crate::message`].

mod local;
mod relay;

pub use local::{LocalGroup, LocalHandle, LocalProvider, SessionId};
pub use relay::{ClientMessage, RelayHandle, RelayProvider, ServerMessage};

use crate::participant::{ParticipantId, ParticipantSet};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Failure to hand a payload to the transport.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Session has ended")]
    Closed,
    #[error("Not joined to the session")]
    NotJoined,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure to establish or join a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Session has ended")]
    Closed,
    #[error("Transport error: {0}")]
    Other(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A payload delivered by the transport, paired with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Sender identity. Accepted but not used for conflict resolution.
    pub from: ParticipantId,
    pub payload: Vec<u8>,
}

/// The stream of payloads a session delivers until it ends.
pub type InboundStream = mpsc::UnboundedReceiver<Inbound>;

/// One offered group session.
///
/// The inbound stream closes when the session ends, whether by [`end`] or
/// by the transport.
///
/// [`end`]: SessionHandle::end
pub trait SessionHandle: Send + 'static {
    /// Transport-assigned session identifier.
    fn id(&self) -> &str;

    /// Become an active member of the session.
    fn join(&self) -> TransportResult<()>;

    /// Queue a payload for every other member. Does not wait for delivery.
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError>;

    /// Take the inbound stream. Returns `None` after the first call.
    fn take_messages(&mut self) -> Option<InboundStream>;

    /// Observe the roster of active participants.
    fn roster(&self) -> watch::Receiver<ParticipantSet>;

    /// How the local participant appears in the roster, once known.
    fn local_participant(&self) -> Option<ParticipantId>;

    /// Leave the session and release its channel.
    fn end(&self);
}

/// Source of session offers.
pub trait SessionProvider: Send + 'static {
    type Handle: SessionHandle;

    /// Open a new subscription to session offers.
    ///
    /// Each call is independent, so discovery can be restarted after a
    /// session ends. The stream finishes when no further offers can arrive.
    fn sessions(&self) -> mpsc::UnboundedReceiver<Self::Handle>;
}
