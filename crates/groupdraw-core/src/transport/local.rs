//! In-process group sessions.
//!
//! [`LocalGroup`] plays the part of a group-session service for peers
//! living in one process: sessions are opened, offered to subscribed
//! participants, and fan payloads out to every joined member except the
//! sender.

use super::{
    Inbound, InboundStream, SendError, SessionHandle, SessionProvider, TransportError,
    TransportResult,
};
use crate::participant::{ParticipantId, ParticipantSet};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

/// Identifier of a session opened on a [`LocalGroup`].
pub type SessionId = String;

struct SessionState {
    roster: watch::Sender<ParticipantSet>,
    /// Offered but not yet joined.
    invited: HashMap<ParticipantId, mpsc::UnboundedSender<Inbound>>,
    /// Joined members and their inbound channels.
    members: HashMap<ParticipantId, mpsc::UnboundedSender<Inbound>>,
}

impl SessionState {
    fn new() -> Self {
        let (roster, _) = watch::channel(ParticipantSet::new());
        Self {
            roster,
            invited: HashMap::new(),
            members: HashMap::new(),
        }
    }

    fn publish_roster(&self) {
        let roster: ParticipantSet = self.members.keys().cloned().collect();
        self.roster.send_replace(roster);
    }
}

#[derive(Default)]
struct GroupState {
    subscribers: HashMap<ParticipantId, Vec<mpsc::UnboundedSender<LocalHandle>>>,
    sessions: HashMap<SessionId, SessionState>,
    next_session: u64,
}

/// A process-local group-session service.
#[derive(Clone, Default)]
pub struct LocalGroup {
    state: Arc<Mutex<GroupState>>,
}

impl LocalGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session provider for one participant.
    pub fn provider(&self, participant: impl Into<ParticipantId>) -> LocalProvider {
        LocalProvider {
            group: self.clone(),
            participant: participant.into(),
        }
    }

    /// Open a new, empty session.
    pub fn open_session(&self) -> SessionId {
        let mut state = self.lock();
        state.next_session += 1;
        let id = format!("session-{}", state.next_session);
        state.sessions.insert(id.clone(), SessionState::new());
        log::debug!("Opened local session {}", id);
        id
    }

    /// Offer a session to a participant's latest live subscription.
    ///
    /// Returns `false` if the session is gone or the participant is not
    /// discovering.
    pub fn invite(&self, session: &str, participant: &ParticipantId) -> bool {
        let mut state = self.lock();
        let GroupState {
            subscribers,
            sessions,
            ..
        } = &mut *state;

        let Some(session_state) = sessions.get_mut(session) else {
            return false;
        };
        let Some(subscriptions) = subscribers.get_mut(participant) else {
            return false;
        };
        subscriptions.retain(|tx| !tx.is_closed());
        let Some(subscription) = subscriptions.last() else {
            return false;
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let handle = LocalHandle {
            group: self.clone(),
            session: session.to_string(),
            participant: participant.clone(),
            inbound: Some(inbound_rx),
            roster: session_state.roster.subscribe(),
        };
        if subscription.send(handle).is_err() {
            return false;
        }
        session_state.invited.insert(participant.clone(), inbound_tx);
        true
    }

    /// Offer a session to every participant currently discovering.
    /// Returns how many were invited.
    pub fn invite_all(&self, session: &str) -> usize {
        let participants: Vec<ParticipantId> = self.lock().subscribers.keys().cloned().collect();
        participants
            .iter()
            .filter(|participant| self.invite(session, participant))
            .count()
    }

    /// Terminate a session for everyone.
    pub fn close_session(&self, session: &str) -> bool {
        let removed = self.lock().sessions.remove(session);
        if removed.is_some() {
            log::debug!("Closed local session {}", session);
        }
        removed.is_some()
    }

    /// Current roster of a session.
    pub fn roster(&self, session: &str) -> Option<ParticipantSet> {
        self.lock()
            .sessions
            .get(session)
            .map(|s| s.roster.borrow().clone())
    }

    fn join(&self, session: &str, participant: &ParticipantId) -> TransportResult<()> {
        let mut state = self.lock();
        let session_state = state.sessions.get_mut(session).ok_or(TransportError::Closed)?;
        if session_state.members.contains_key(participant) {
            return Ok(());
        }
        let inbound = session_state
            .invited
            .remove(participant)
            .ok_or_else(|| TransportError::Other(format!("{} was not invited", participant)))?;
        session_state.members.insert(participant.clone(), inbound);
        session_state.publish_roster();
        Ok(())
    }

    fn send(&self, session: &str, from: &ParticipantId, payload: Vec<u8>) -> Result<(), SendError> {
        let state = self.lock();
        let session_state = state.sessions.get(session).ok_or(SendError::Closed)?;
        if !session_state.members.contains_key(from) {
            return Err(SendError::NotJoined);
        }
        for (member, tx) in &session_state.members {
            if member == from {
                continue;
            }
            // A member whose stream is gone is leaving; skip it.
            let _ = tx.send(Inbound {
                from: from.clone(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn leave(&self, session: &str, participant: &ParticipantId) {
        let mut state = self.lock();
        if let Some(session_state) = state.sessions.get_mut(session) {
            session_state.invited.remove(participant);
            if session_state.members.remove(participant).is_some() {
                session_state.publish_roster();
            }
        }
    }
}

/// Session offers for one participant of a [`LocalGroup`].
#[derive(Clone)]
pub struct LocalProvider {
    group: LocalGroup,
    participant: ParticipantId,
}

impl LocalProvider {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }
}

impl SessionProvider for LocalProvider {
    type Handle = LocalHandle;

    fn sessions(&self) -> mpsc::UnboundedReceiver<LocalHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.group
            .lock()
            .subscribers
            .entry(self.participant.clone())
            .or_default()
            .push(tx);
        rx
    }
}

/// One participant's view of a [`LocalGroup`] session.
pub struct LocalHandle {
    group: LocalGroup,
    session: SessionId,
    participant: ParticipantId,
    inbound: Option<InboundStream>,
    roster: watch::Receiver<ParticipantSet>,
}

impl LocalHandle {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }
}

impl SessionHandle for LocalHandle {
    fn id(&self) -> &str {
        &self.session
    }

    fn join(&self) -> TransportResult<()> {
        self.group.join(&self.session, &self.participant)
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.group.send(&self.session, &self.participant, payload)
    }

    fn take_messages(&mut self) -> Option<InboundStream> {
        self.inbound.take()
    }

    fn roster(&self) -> watch::Receiver<ParticipantSet> {
        self.roster.clone()
    }

    fn local_participant(&self) -> Option<ParticipantId> {
        Some(self.participant.clone())
    }

    fn end(&self) {
        self.group.leave(&self.session, &self.participant);
    }
}
