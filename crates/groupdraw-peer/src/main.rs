//! GroupDraw terminal peer.
//!
//! Joins a relay room and draws from stdin. Configure with
//! `GROUPDRAW_RELAY_URL` and `GROUPDRAW_ROOM`.

mod canvas;
mod commands;

use canvas::TextCanvas;
use commands::{ParseError, PeerCommand};
use groupdraw_core::{
    ConfigError, CoordinatorConfig, CoordinatorError, CoordinatorHandle, RelayConfig,
    RelayProvider, SessionCoordinator, SessionStatus, StrokeStyle,
};
use thiserror::Error;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const REJOIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum PeerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), PeerError> {
    env_logger::init();

    let config = RelayConfig::from_env()?;
    println!("Relay {} room {}", config.url, config.room);

    let (canvas, events) = TextCanvas::new(StrokeStyle::default());
    let coordinator = SessionCoordinator::spawn(
        RelayProvider::new(config),
        canvas.clone(),
        events,
        CoordinatorConfig::default(),
    );
    coordinator.discover().await?;
    println!("{}", commands::HELP);

    let mut sharing = true;
    let mut status = coordinator.watch_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Ok(PeerCommand::Quit) => break,
                    Ok(command) => {
                        sharing = wants_session(&command, sharing);
                        run(command, &coordinator, &canvas).await?;
                    }
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("{}", e),
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if sharing && current == SessionStatus::Idle {
                    // The relay dropped us; a fresh join brings the drawing back in sync.
                    log::warn!("Session lost, rejoining in {:?}", REJOIN_DELAY);
                    tokio::time::sleep(REJOIN_DELAY).await;
                    coordinator.discover().await?;
                }
            }
        }
    }

    coordinator.shutdown().await?;
    Ok(())
}

/// Whether the user still wants to be in a session after `command`.
fn wants_session(command: &PeerCommand, sharing: bool) -> bool {
    match command {
        PeerCommand::Share => true,
        PeerCommand::Leave => false,
        _ => sharing,
    }
}

async fn run(
    command: PeerCommand,
    coordinator: &CoordinatorHandle,
    canvas: &TextCanvas,
) -> Result<(), CoordinatorError> {
    match command {
        PeerCommand::Draw(points) => {
            if canvas.draw(&points).is_none() {
                println!("nothing to draw");
            }
        }
        PeerCommand::Undo => coordinator.undo().await?,
        PeerCommand::Redo => coordinator.redo().await?,
        PeerCommand::Clear => coordinator.clear().await?,
        PeerCommand::Show => {
            let snapshot = coordinator.snapshot().await?;
            println!("{}", canvas.render());
            println!(
                "undo: {}  redo: {}  status: {}",
                snapshot.can_undo,
                snapshot.can_redo,
                describe(&coordinator.status())
            );
        }
        PeerCommand::Share => coordinator.discover().await?,
        PeerCommand::Leave => coordinator.end_session().await?,
        PeerCommand::Help => println!("{}", commands::HELP),
        PeerCommand::Quit => {}
    }
    Ok(())
}

fn describe(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Idle => "offline".to_string(),
        SessionStatus::Discovering => "looking for a session".to_string(),
        SessionStatus::Active {
            session,
            participants,
        } => format!("in {} with {} participants", session, participants),
        SessionStatus::Ending => "leaving".to_string(),
    }
}
