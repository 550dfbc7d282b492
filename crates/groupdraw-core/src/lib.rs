//! GroupDraw Core Library
//!
//! Session synchronization for shared freehand canvases: the stroke model,
//! the wire protocol, per-peer undo/redo history and the coordinator that
//! ties a canvas to a group session.

pub mod canvas;
pub mod config;
pub mod coordinator;
pub mod drawing;
pub mod history;
pub mod message;
pub mod participant;
pub mod stroke;
pub mod transport;

pub use canvas::{CanvasBridge, CanvasEvent, CanvasEvents, CanvasNotifier, MemoryCanvas};
pub use config::{ConfigError, CoordinatorConfig, RelayConfig};
pub use coordinator::{CoordinatorError, CoordinatorHandle, HistorySnapshot, SessionCoordinator, SessionStatus};
pub use drawing::Drawing;
pub use history::HistoryManager;
pub use message::{GroupDrawMessage, ProtocolError};
pub use participant::{ParticipantId, ParticipantSet};
pub use stroke::{SerializableColor, Stroke, StrokeBuilder, StrokeId, StrokeStyle};
pub use transport::{
    Inbound, InboundStream, LocalGroup, RelayHandle, RelayProvider, SendError, SessionHandle,
    SessionProvider, TransportError,
};
