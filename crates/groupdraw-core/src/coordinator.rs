//! Session lifecycle and the bridge between transport, history and canvas.
//!
//! The coordinator is a single task that owns the [`HistoryManager`] and the
//! canvas bridge, so every mutation of the drawing is serialized. It reacts
//! to three queues:
//! - session events from its listener tasks (offers, roster, inbound);
//! - canvas notifications (one per completed user stroke);
//! - commands from [`CoordinatorHandle`]s.
//!
//! ```text
//! Idle --discover--> Discovering --offer--> Active --end/closed--> Ending --> Idle
//! ```
//!
//! While a session is active two listener tasks run: one forwards roster
//! changes, the other decodes inbound payloads. Both are aborted when the
//! session ends. Once a participant is listed in the roster, every later
//! roster change re-broadcasts its whole drawing as `Join`, which is how
//! late joiners catch up. A joiner never announces its own drawing.

use crate::canvas::{CanvasBridge, CanvasEvent, CanvasEvents};
use crate::config::CoordinatorConfig;
use crate::drawing::Drawing;
use crate::history::HistoryManager;
use crate::message::GroupDrawMessage;
use crate::participant::{ParticipantId, ParticipantSet};
use crate::stroke::Stroke;
use crate::transport::{Inbound, InboundStream, SessionHandle, SessionProvider};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Errors returned by [`CoordinatorHandle`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Coordinator has stopped")]
    Stopped,
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Discovering,
    Active { session: String, participants: usize },
    Ending,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active { .. })
    }
}

/// Copy of the history state at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub drawing: Drawing,
    pub can_undo: bool,
    pub can_redo: bool,
}

enum Command {
    Discover,
    EndSession,
    Undo,
    Redo,
    Clear,
    Snapshot(oneshot::Sender<HistorySnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Events produced by discovery and session listener tasks.
///
/// Each carries the id of the discovery or session that produced it so
/// leftovers from an ended session are recognised and dropped.
enum SessionEvent<H> {
    Offered { discovery: u64, handle: H },
    DiscoveryEnded { discovery: u64 },
    RosterChanged { generation: u64, roster: ParticipantSet },
    Received { generation: u64, from: ParticipantId, message: GroupDrawMessage },
    Closed { generation: u64 },
}

type EventSender<H> = mpsc::UnboundedSender<SessionEvent<H>>;

struct Discovery {
    id: u64,
    task: JoinHandle<()>,
}

struct ActiveSession<H: SessionHandle> {
    handle: H,
    generation: u64,
    roster: ParticipantSet,
    /// Set once the roster lists the local participant. Roster changes
    /// before that are our own arrival and are not re-broadcast.
    established: bool,
    roster_task: JoinHandle<()>,
    receive_task: JoinHandle<()>,
}

impl<H: SessionHandle> ActiveSession<H> {
    fn teardown(self) {
        self.roster_task.abort();
        self.receive_task.abort();
        self.handle.end();
    }
}

enum Phase<H: SessionHandle> {
    Idle,
    Discovering {
        discovery: Discovery,
    },
    Active {
        discovery: Discovery,
        session: ActiveSession<H>,
    },
}

/// Owner of one canvas's history and its (at most one) session.
pub struct SessionCoordinator<P: SessionProvider, C: CanvasBridge> {
    provider: P,
    canvas: C,
    history: HistoryManager,
    config: CoordinatorConfig,
    phase: Phase<P::Handle>,
    next_id: u64,
    events_tx: EventSender<P::Handle>,
    status: watch::Sender<SessionStatus>,
}

impl<P: SessionProvider, C: CanvasBridge> SessionCoordinator<P, C> {
    /// Start the coordinator task. Must be called within a Tokio runtime.
    ///
    /// `canvas_events` is the canvas's single notification subscription.
    /// The history starts from whatever the canvas already shows.
    pub fn spawn(
        provider: P,
        canvas: C,
        canvas_events: CanvasEvents,
        config: CoordinatorConfig,
    ) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);

        let history = HistoryManager::with_drawing(canvas.current_drawing());
        let coordinator = Self {
            provider,
            canvas,
            history,
            config,
            phase: Phase::Idle,
            next_id: 0,
            events_tx,
            status: status_tx,
        };
        tokio::spawn(coordinator.run(command_rx, events_rx, canvas_events));

        CoordinatorHandle {
            commands: command_tx,
            status: status_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent<P::Handle>>,
        mut canvas_events: CanvasEvents,
    ) {
        log::info!("Session coordinator started");
        let mut canvas_open = true;

        let ack = loop {
            tokio::select! {
                // Peer traffic already queued applies before newer local input.
                biased;

                Some(event) = events.recv() => self.handle_session_event(event),
                event = canvas_events.recv(), if canvas_open => match event {
                    Some(CanvasEvent::StrokeCompleted(stroke)) => self.handle_local_stroke(stroke),
                    None => {
                        log::debug!("Canvas notifications closed");
                        canvas_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    Some(command) => self.handle_command(command),
                    None => break None,
                },
            }
        };

        self.end_session();
        drop(commands);
        log::info!("Session coordinator stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }

    fn discovery_id(&self) -> Option<u64> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Discovering { discovery } | Phase::Active { discovery, .. } => Some(discovery.id),
        }
    }

    fn current_generation(&self) -> Option<u64> {
        match &self.phase {
            Phase::Active { session, .. } => Some(session.generation),
            _ => None,
        }
    }

    // --- Commands ---

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Discover => self.start_discovery(),
            Command::EndSession => self.end_session(),
            Command::Undo => match self.history.undo_local() {
                Some(message) => {
                    self.sync_canvas();
                    self.broadcast(message);
                }
                None => log::debug!("Nothing to undo"),
            },
            Command::Redo => match self.history.redo_local() {
                Some(message) => {
                    if let Some(stroke) = self.history.drawing().last() {
                        self.canvas.append_stroke(stroke.clone());
                    }
                    self.broadcast(message);
                }
                None => log::debug!("Nothing to redo"),
            },
            Command::Clear => {
                let message = self.history.clear_local();
                self.canvas.set_drawing(Drawing::new());
                self.broadcast(message);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(HistorySnapshot {
                    drawing: self.history.drawing().clone(),
                    can_undo: self.history.can_undo(),
                    can_redo: self.history.can_redo(),
                });
            }
            Command::Shutdown(_) => unreachable!("handled by the run loop"),
        }
    }

    fn handle_local_stroke(&mut self, stroke: Stroke) {
        let message = self.history.append_local(stroke);
        // Remote changes may have landed on the canvas while the user drew.
        if self.canvas.current_drawing() != *self.history.drawing() {
            self.sync_canvas();
        }
        self.broadcast(message);
    }

    fn sync_canvas(&mut self) {
        self.canvas.set_drawing(self.history.drawing().clone());
    }

    // --- Lifecycle ---

    fn start_discovery(&mut self) {
        if !matches!(self.phase, Phase::Idle) {
            log::debug!("Discovery already running");
            return;
        }

        let id = self.next_id();
        let mut offers = self.provider.sessions();
        let events = self.events_tx.clone();
        let task = tokio::spawn(async move {
            while let Some(handle) = offers.recv().await {
                if events.send(SessionEvent::Offered { discovery: id, handle }).is_err() {
                    return;
                }
            }
            let _ = events.send(SessionEvent::DiscoveryEnded { discovery: id });
        });

        self.phase = Phase::Discovering {
            discovery: Discovery { id, task },
        };
        self.set_status(SessionStatus::Discovering);
        log::info!("Discovering sessions");
    }

    fn handle_offer(&mut self, discovery_id: u64, handle: P::Handle) {
        let discovery = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Discovering { discovery } if discovery.id == discovery_id => discovery,
            Phase::Active { discovery, session } if discovery.id == discovery_id => {
                log::info!(
                    "Session {} offered while {} is active; ending the current one",
                    handle.id(),
                    session.handle.id()
                );
                self.set_status(SessionStatus::Ending);
                session.teardown();
                discovery
            }
            other => {
                self.phase = other;
                log::debug!("Ignoring stale offer for session {}", handle.id());
                return;
            }
        };

        match self.activate(handle) {
            Some(session) => {
                self.set_status(SessionStatus::Active {
                    session: session.handle.id().to_string(),
                    participants: session.roster.len(),
                });
                self.phase = Phase::Active { discovery, session };
            }
            None => {
                self.phase = Phase::Discovering { discovery };
                self.set_status(SessionStatus::Discovering);
            }
        }
    }

    fn activate(&mut self, mut handle: P::Handle) -> Option<ActiveSession<P::Handle>> {
        let Some(messages) = handle.take_messages() else {
            log::warn!("Session {} offered without a message stream", handle.id());
            handle.end();
            return None;
        };

        if let Err(e) = handle.join() {
            log::warn!("Failed to join session {}: {}", handle.id(), e);
            handle.end();
            return None;
        }

        let roster = handle.roster().borrow().clone();
        let established = includes_self(&roster, handle.local_participant().as_ref());

        // Listeners start after joining so the first roster they report is
        // never older than the seeded one.
        let generation = self.next_id();
        let receive_task = tokio::spawn(receive_loop(generation, messages, self.events_tx.clone()));
        let roster_task = tokio::spawn(roster_loop(
            generation,
            handle.roster(),
            self.events_tx.clone(),
            self.config.report_initial_roster,
        ));

        log::info!("Joined session {} ({} participants)", handle.id(), roster.len());
        Some(ActiveSession {
            handle,
            generation,
            roster,
            established,
            roster_task,
            receive_task,
        })
    }

    /// Leave the current session (if any) and stop discovering.
    fn end_session(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => return,
            Phase::Discovering { discovery } => {
                discovery.task.abort();
                log::info!("Discovery cancelled");
            }
            Phase::Active { discovery, session } => {
                self.set_status(SessionStatus::Ending);
                log::info!("Ending session {}", session.handle.id());
                discovery.task.abort();
                session.teardown();
            }
        }
        self.set_status(SessionStatus::Idle);
    }

    // --- Session events ---

    fn handle_session_event(&mut self, event: SessionEvent<P::Handle>) {
        match event {
            SessionEvent::Offered { discovery, handle } => self.handle_offer(discovery, handle),
            SessionEvent::DiscoveryEnded { discovery } => {
                if self.discovery_id() != Some(discovery) {
                    return;
                }
                if self.current_generation().is_some() {
                    log::debug!("Session stream ended; no further offers");
                } else {
                    log::info!("Session stream ended before any offer");
                    self.phase = Phase::Idle;
                    self.set_status(SessionStatus::Idle);
                }
            }
            SessionEvent::RosterChanged { generation, roster } => {
                self.handle_roster(generation, roster)
            }
            SessionEvent::Received {
                generation,
                from,
                message,
            } => {
                if self.current_generation() == Some(generation) {
                    self.apply_remote(&from, message);
                } else {
                    log::debug!("Dropping {} from {} for an ended session", message.kind(), from);
                }
            }
            SessionEvent::Closed { generation } => {
                if self.current_generation() == Some(generation) {
                    log::info!("Session ended by transport");
                    self.end_session();
                }
            }
        }
    }

    fn handle_roster(&mut self, generation: u64, roster: ParticipantSet) {
        let Phase::Active { session, .. } = &mut self.phase else {
            return;
        };
        if session.generation != generation {
            return;
        }

        for participant in roster.joined_since(&session.roster) {
            log::info!("{} joined session {}", participant, session.handle.id());
        }
        for participant in roster.left_since(&session.roster) {
            log::info!("{} left session {}", participant, session.handle.id());
        }

        let rebroadcast = session.established && roster != session.roster;
        if !session.established
            && includes_self(&roster, session.handle.local_participant().as_ref())
        {
            session.established = true;
            log::debug!("Listed in session {}", session.handle.id());
        }

        let status = SessionStatus::Active {
            session: session.handle.id().to_string(),
            participants: roster.len(),
        };
        session.roster = roster;
        self.set_status(status);

        // Catch-up: members already in the session re-send their view to
        // whoever arrived or left. A newcomer waits for theirs.
        if rebroadcast {
            self.broadcast(GroupDrawMessage::Join {
                drawing: self.history.drawing().clone(),
            });
        }
    }

    fn apply_remote(&mut self, from: &ParticipantId, message: GroupDrawMessage) {
        log::debug!("Received {} from {}", message.kind(), from);
        match message {
            GroupDrawMessage::Draw { drawing } => {
                if self.history.apply_remote_draw(drawing) {
                    if let Some(stroke) = self.history.drawing().last() {
                        self.canvas.append_stroke(stroke.clone());
                    }
                }
            }
            other => {
                if self.history.apply_remote(other) {
                    self.sync_canvas();
                }
            }
        }
    }

    /// Hand a message to the active session. Failures are logged; local
    /// state has already changed and stays changed.
    fn broadcast(&self, message: GroupDrawMessage) {
        let Phase::Active { session, .. } = &self.phase else {
            log::debug!("No active session; {} stays local", message.kind());
            return;
        };

        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to encode {}: {}", message.kind(), e);
                return;
            }
        };
        match session.handle.send(payload) {
            Ok(()) => log::debug!("Sent {} to session {}", message.kind(), session.handle.id()),
            Err(e) => log::warn!(
                "Failed to send {} to session {}: {}",
                message.kind(),
                session.handle.id(),
                e
            ),
        }
    }
}

/// Whether `roster` lists the local participant. When the transport has
/// not told us who we are, any non-empty roster counts.
fn includes_self(roster: &ParticipantSet, me: Option<&ParticipantId>) -> bool {
    match me {
        Some(me) => roster.contains(me),
        None => !roster.is_empty(),
    }
}

/// Decode inbound payloads and forward them until the stream ends.
async fn receive_loop<H>(generation: u64, mut messages: InboundStream, events: EventSender<H>) {
    while let Some(Inbound { from, payload }) = messages.recv().await {
        let message = match GroupDrawMessage::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping message from {}: {}", from, e);
                continue;
            }
        };
        if events
            .send(SessionEvent::Received {
                generation,
                from,
                message,
            })
            .is_err()
        {
            return;
        }
    }
    let _ = events.send(SessionEvent::Closed { generation });
}

/// Forward every roster change until the roster's sender goes away.
async fn roster_loop<H>(
    generation: u64,
    mut roster: watch::Receiver<ParticipantSet>,
    events: EventSender<H>,
    report_initial: bool,
) {
    let initial = roster.borrow_and_update().clone();
    if report_initial
        && events
            .send(SessionEvent::RosterChanged {
                generation,
                roster: initial,
            })
            .is_err()
    {
        return;
    }

    while roster.changed().await.is_ok() {
        let current = roster.borrow_and_update().clone();
        if events
            .send(SessionEvent::RosterChanged {
                generation,
                roster: current,
            })
            .is_err()
        {
            return;
        }
    }
}

/// Cloneable control surface of a running [`SessionCoordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl CoordinatorHandle {
    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// Start waiting for a session to be offered.
    pub async fn discover(&self) -> Result<(), CoordinatorError> {
        self.send(Command::Discover).await
    }

    /// Leave the active session, or stop discovering.
    pub async fn end_session(&self) -> Result<(), CoordinatorError> {
        self.send(Command::EndSession).await
    }

    pub async fn undo(&self) -> Result<(), CoordinatorError> {
        self.send(Command::Undo).await
    }

    pub async fn redo(&self) -> Result<(), CoordinatorError> {
        self.send(Command::Redo).await
    }

    pub async fn clear(&self) -> Result<(), CoordinatorError> {
        self.send(Command::Clear).await
    }

    /// Current drawing and undo/redo availability.
    pub async fn snapshot(&self) -> Result<HistorySnapshot, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to lifecycle changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`.
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, CoordinatorError> {
        let mut status = self.status.clone();
        let result = status.wait_for(predicate).await;
        result
            .map(|s| s.clone())
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// End any session and stop the coordinator task.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::stroke::StrokeStyle;
    use crate::transport::{LocalGroup, LocalHandle};
    use kurbo::Point;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(2);

    struct Peer {
        handle: CoordinatorHandle,
        canvas: MemoryCanvas,
    }

    impl Peer {
        fn spawn(group: &LocalGroup, name: &str) -> Self {
            Self::spawn_with(group, name, CoordinatorConfig::default())
        }

        fn spawn_with(group: &LocalGroup, name: &str, config: CoordinatorConfig) -> Self {
            let (canvas, events) = MemoryCanvas::new();
            let handle =
                SessionCoordinator::spawn(group.provider(name), canvas.clone(), events, config);
            Self { handle, canvas }
        }

        async fn discover(&self) {
            self.handle.discover().await.unwrap();
            self.wait_status(|s| *s == SessionStatus::Discovering).await;
        }

        async fn wait_status(&self, predicate: impl FnMut(&SessionStatus) -> bool) -> SessionStatus {
            timeout(WAIT, self.handle.wait_for_status(predicate))
                .await
                .expect("status timeout")
                .unwrap()
        }

        async fn wait_participants(&self, count: usize) {
            self.wait_status(|s| {
                matches!(s, SessionStatus::Active { participants, .. } if *participants == count)
            })
            .await;
        }

        fn drawing(&self) -> Drawing {
            self.canvas.current_drawing()
        }
    }

    fn stroke(n: u8) -> Stroke {
        let x = f64::from(n) * 10.0;
        Stroke::new(vec![Point::new(x, 0.0), Point::new(x, 10.0)], StrokeStyle::default())
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        let result = timeout(WAIT, async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "condition not reached in time");
    }

    /// A test-driven member speaking the wire protocol directly.
    async fn raw_member(group: &LocalGroup, session: &str, name: &str) -> (LocalHandle, InboundStream) {
        let mut offers = group.provider(name).sessions();
        assert!(group.invite(session, &ParticipantId::from(name)));
        let mut handle = offers.recv().await.unwrap();
        let inbox = handle.take_messages().unwrap();
        handle.join().unwrap();
        (handle, inbox)
    }

    async fn next_message(inbox: &mut InboundStream) -> GroupDrawMessage {
        let inbound = timeout(WAIT, inbox.recv()).await.expect("message timeout").unwrap();
        GroupDrawMessage::decode(&inbound.payload).unwrap()
    }

    async fn start_session(group: &LocalGroup, peers: &[&Peer]) -> String {
        for peer in peers {
            peer.discover().await;
        }
        let session = group.open_session();
        assert_eq!(group.invite_all(&session), peers.len());
        for peer in peers {
            peer.wait_participants(peers.len()).await;
        }
        // Let the roster-triggered Join exchange settle.
        sleep(Duration::from_millis(100)).await;
        session
    }

    #[tokio::test]
    async fn test_local_edits_without_session() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        let (a, b) = (stroke(1), stroke(2));

        p.canvas.user_draw(a.clone());
        p.canvas.user_draw(b.clone());
        p.handle.undo().await.unwrap();

        let snapshot = p.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.drawing.strokes(), &[a.clone()]);
        assert!(snapshot.can_redo);
        assert_eq!(p.drawing().strokes(), &[a.clone()]);

        p.handle.redo().await.unwrap();
        p.handle.snapshot().await.unwrap();
        assert_eq!(p.drawing().strokes(), &[a, b]);
        assert_eq!(p.handle.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_draw_undo_and_late_join_scenario() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        let q = Peer::spawn(&group, "q");
        let session = start_session(&group, &[&p, &q]).await;

        let s1 = stroke(1);
        p.canvas.user_draw(s1.clone());
        eventually(|| q.drawing().strokes() == [s1.clone()]).await;
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.strokes(), &[s1.clone()]);

        p.handle.undo().await.unwrap();
        eventually(|| q.drawing().is_empty()).await;
        assert!(p.handle.snapshot().await.unwrap().can_redo);
        let q_snapshot = q.handle.snapshot().await.unwrap();
        assert!(q_snapshot.drawing.is_empty());
        assert!(!q_snapshot.can_redo);

        let r = Peer::spawn(&group, "r");
        r.discover().await;
        assert!(group.invite(&session, &ParticipantId::from("r")));
        p.wait_participants(3).await;
        r.wait_participants(3).await;

        sleep(Duration::from_millis(50)).await;
        assert!(r.drawing().is_empty());
        assert!(p.drawing().is_empty());
        assert!(q.drawing().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_joiner_adopts_existing_drawing() {
        for _ in 0..10 {
            let group = LocalGroup::new();
            let p = Peer::spawn(&group, "p");
            let q = Peer::spawn(&group, "q");
            let session = start_session(&group, &[&p, &q]).await;

            let s1 = stroke(1);
            p.canvas.user_draw(s1.clone());
            eventually(|| q.drawing().strokes() == [s1.clone()]).await;

            let r = Peer::spawn(&group, "r");
            r.discover().await;
            assert!(group.invite(&session, &ParticipantId::from("r")));
            p.wait_participants(3).await;
            q.wait_participants(3).await;
            r.wait_participants(3).await;
            eventually(|| r.drawing().strokes() == [s1.clone()]).await;

            // Give any stray Join time to land before checking nobody lost S1.
            sleep(Duration::from_millis(100)).await;
            for peer in [&p, &q, &r] {
                assert_eq!(peer.drawing().strokes(), &[s1.clone()]);
                let snapshot = peer.handle.snapshot().await.unwrap();
                assert_eq!(snapshot.drawing.strokes(), &[s1.clone()]);
            }
        }
    }

    #[tokio::test]
    async fn test_newcomer_does_not_announce_its_drawing() {
        let group = LocalGroup::new();
        let session = group.open_session();
        let (_z, mut z_inbox) = raw_member(&group, &session, "z").await;

        let p = Peer::spawn(&group, "p");
        let a = stroke(1);
        p.canvas.user_draw(a.clone());
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 1);

        p.discover().await;
        assert!(group.invite(&session, &ParticipantId::from("p")));
        p.wait_participants(2).await;
        assert!(
            timeout(Duration::from_millis(200), z_inbox.recv()).await.is_err(),
            "newcomer must not broadcast its drawing"
        );

        // Once listed, p catches up the next arrival.
        let (_y, _y_inbox) = raw_member(&group, &session, "y").await;
        let message = next_message(&mut z_inbox).await;
        assert_eq!(message, GroupDrawMessage::Join { drawing: vec![a].into() });
    }

    #[tokio::test]
    async fn test_activation_reports_current_roster() {
        let group = LocalGroup::new();
        let session = group.open_session();
        let (_z, _z_inbox) = raw_member(&group, &session, "z").await;

        let config = CoordinatorConfig {
            report_initial_roster: false,
            ..CoordinatorConfig::default()
        };
        let p = Peer::spawn_with(&group, "p", config);
        p.discover().await;
        assert!(group.invite(&session, &ParticipantId::from("p")));

        let status = p.wait_status(|s| s.is_active()).await;
        assert_eq!(
            status,
            SessionStatus::Active {
                session: session.clone(),
                participants: 2
            }
        );
    }

    #[tokio::test]
    async fn test_redo_and_clear_propagate() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        let q = Peer::spawn(&group, "q");
        start_session(&group, &[&p, &q]).await;

        let (a, b) = (stroke(1), stroke(2));
        p.canvas.user_draw(a.clone());
        p.canvas.user_draw(b.clone());
        eventually(|| q.drawing().len() == 2).await;

        p.handle.undo().await.unwrap();
        eventually(|| q.drawing().strokes() == [a.clone()]).await;

        p.handle.redo().await.unwrap();
        eventually(|| q.drawing().strokes() == [a.clone(), b.clone()]).await;

        q.handle.clear().await.unwrap();
        eventually(|| p.drawing().is_empty()).await;
        assert!(!p.handle.snapshot().await.unwrap().can_redo);
    }

    #[tokio::test]
    async fn test_roster_change_broadcasts_full_drawing() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let session = group.open_session();
        group.invite_all(&session);
        p.wait_participants(1).await;

        let (a, b) = (stroke(1), stroke(2));
        p.canvas.user_draw(a.clone());
        p.canvas.user_draw(b.clone());
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 2);

        let (_raw, mut inbox) = raw_member(&group, &session, "z").await;
        let message = next_message(&mut inbox).await;
        assert_eq!(
            message,
            GroupDrawMessage::Join {
                drawing: vec![a, b].into()
            }
        );
    }

    #[tokio::test]
    async fn test_remote_join_replaces_history() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let session = group.open_session();
        group.invite_all(&session);
        p.wait_participants(1).await;

        p.canvas.user_draw(stroke(9));
        p.handle.undo().await.unwrap();
        assert!(p.handle.snapshot().await.unwrap().can_redo);

        let (raw, _inbox) = raw_member(&group, &session, "z").await;
        p.wait_participants(2).await;
        sleep(Duration::from_millis(50)).await;

        let joined: Drawing = vec![stroke(1), stroke(2), stroke(3)].into();
        let join = GroupDrawMessage::Join {
            drawing: joined.clone(),
        };
        raw.send(join.encode().unwrap()).unwrap();
        eventually(|| p.drawing() == joined).await;

        let snapshot = p.handle.snapshot().await.unwrap();
        assert!(!snapshot.can_redo);
        p.handle.undo().await.unwrap();
        p.handle.undo().await.unwrap();
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 1);
        assert_eq!(p.drawing().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let session = group.open_session();
        group.invite_all(&session);
        p.wait_participants(1).await;

        let (raw, _inbox) = raw_member(&group, &session, "z").await;
        p.wait_participants(2).await;
        sleep(Duration::from_millis(50)).await;

        raw.send(vec![0xde, 0xad, 0xbe, 0xef]).unwrap();
        raw.send(br#"{"type":"erase"}"#.to_vec()).unwrap();
        let s = stroke(4);
        raw.send(GroupDrawMessage::draw(s.clone()).encode().unwrap()).unwrap();

        eventually(|| p.drawing().strokes() == [s.clone()]).await;
        assert!(p.handle.status().is_active());
    }

    #[tokio::test]
    async fn test_remote_undo_not_redoable() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let session = group.open_session();
        group.invite_all(&session);
        p.wait_participants(1).await;

        let (raw, _inbox) = raw_member(&group, &session, "z").await;
        p.wait_participants(2).await;
        sleep(Duration::from_millis(50)).await;

        let (a, b) = (stroke(1), stroke(2));
        p.canvas.user_draw(a.clone());
        p.canvas.user_draw(b);
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 2);

        raw.send(GroupDrawMessage::Undo.encode().unwrap()).unwrap();
        eventually(|| p.drawing().strokes() == [a.clone()]).await;

        let snapshot = p.handle.snapshot().await.unwrap();
        assert!(!snapshot.can_redo);
        p.handle.redo().await.unwrap();
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.strokes(), &[a]);
    }

    #[tokio::test]
    async fn test_transport_close_returns_to_idle() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let session = group.open_session();
        group.invite_all(&session);
        p.wait_participants(1).await;

        p.canvas.user_draw(stroke(1));
        group.close_session(&session);
        p.wait_status(|s| *s == SessionStatus::Idle).await;

        // Local state survives the session.
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 1);

        // Discovery can be restarted.
        p.discover().await;
        let next = group.open_session();
        assert!(group.invite(&next, &ParticipantId::from("p")));
        p.wait_participants(1).await;
    }

    #[tokio::test]
    async fn test_new_offer_ends_previous_session() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        let first = group.open_session();
        group.invite_all(&first);
        p.wait_participants(1).await;

        let second = group.open_session();
        assert!(group.invite(&second, &ParticipantId::from("p")));
        let status = p
            .wait_status(|s| matches!(s, SessionStatus::Active { session, .. } if *session == second))
            .await;
        assert!(status.is_active());
        assert!(group.roster(&first).unwrap().is_empty());
        assert!(group.roster(&second).unwrap().contains(&ParticipantId::from("p")));
    }

    #[tokio::test]
    async fn test_end_session_leaves_roster() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        let q = Peer::spawn(&group, "q");
        let session = start_session(&group, &[&p, &q]).await;

        p.handle.end_session().await.unwrap();
        p.wait_status(|s| *s == SessionStatus::Idle).await;
        q.wait_participants(1).await;
        assert!(!group.roster(&session).unwrap().contains(&ParticipantId::from("p")));

        // Edits after leaving stay local.
        p.canvas.user_draw(stroke(5));
        assert_eq!(p.handle.snapshot().await.unwrap().drawing.len(), 1);
        sleep(Duration::from_millis(50)).await;
        assert!(q.drawing().is_empty());
    }

    #[tokio::test]
    async fn test_end_while_discovering() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.discover().await;
        p.handle.end_session().await.unwrap();
        p.wait_status(|s| *s == SessionStatus::Idle).await;
        // Abort lands on the discovery task's next poll.
        sleep(Duration::from_millis(50)).await;

        let session = group.open_session();
        assert!(!group.invite(&session, &ParticipantId::from("p")));
    }

    #[tokio::test]
    async fn test_shutdown_stops_handle() {
        let group = LocalGroup::new();
        let p = Peer::spawn(&group, "p");
        p.handle.shutdown().await.unwrap();
        assert!(matches!(p.handle.undo().await, Err(CoordinatorError::Stopped)));
    }
}
