use crate::conn::{ConnHandle, ConnId};
use crate::room::{MatchRoom, SeatCommand};
use eightball_shared::protocol::MatchId;
use std::time::Duration;
use tokio::sync::mpsc;

/// Commands from the lobby to one match's game loop
#[derive(Debug)]
pub enum RoomCommand {
    Attach { token: String, conn: ConnHandle },
    Detach { token: String, conn_id: ConnId },
    Seat { token: String, cmd: SeatCommand },
    Leave { token: String },
}

/// Lobby-side handle to a running match.
///
/// Gameplay commands share a bounded queue and may be shed under load.
/// Seat lifecycle commands (attach, detach, leave) use their own queue and
/// are never dropped while the room is running.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub match_id: MatchId,
    pub tx: mpsc::Sender<RoomCommand>,
    pub control_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Forward a command without blocking the caller. Returns false if it was
    /// not delivered: the room is gone, or a gameplay command hit a full queue.
    pub fn send(&self, cmd: RoomCommand) -> bool {
        if let RoomCommand::Seat { .. } = cmd {
            return match self.tx.try_send(cmd) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(match_id = %self.match_id, "Room command not delivered: {}", e);
                    false
                }
            };
        }
        match self.control_tx.send(cmd) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(match_id = %self.match_id, "Room already closed");
                false
            }
        }
    }

    /// The room's loop has exited.
    pub fn is_closed(&self) -> bool {
        self.control_tx.is_closed()
    }
}

/// Start a match's game loop on its own task.
pub fn spawn_room(room: MatchRoom, tick_interval: Duration, capacity: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        match_id: room.id().to_string(),
        tx,
        control_tx,
    };
    tokio::spawn(run_game_loop(room, control_rx, rx, tick_interval));
    handle
}

/// Run one match until it ends. Owns the room.
pub async fn run_game_loop(
    mut room: MatchRoom,
    mut control_rx: mpsc::UnboundedReceiver<RoomCommand>,
    mut cmd_rx: mpsc::Receiver<RoomCommand>,
    tick_duration: Duration,
) {
    let mut tick_interval = tokio::time::interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(match_id = %room.id(), "Game loop started");

    loop {
        tokio::select! {
            biased;

            Some(cmd) = control_rx.recv() => apply(&mut room, cmd),

            _ = tick_interval.tick() => {
                room.tick(tokio::time::Instant::now().into_std());
            }

            Some(cmd) = cmd_rx.recv() => apply(&mut room, cmd),

            else => break,
        }

        if room.is_ended() {
            break;
        }
    }

    tracing::info!(match_id = %room.id(), "Game loop ended");
}

fn apply(room: &mut MatchRoom, cmd: RoomCommand) {
    match cmd {
        RoomCommand::Attach { token, conn } => {
            room.attach(&token, conn);
        }
        RoomCommand::Detach { token, conn_id } => {
            room.detach(&token, conn_id, tokio::time::Instant::now().into_std());
        }
        RoomCommand::Seat { token, cmd } => {
            room.handle_command(&token, cmd);
        }
        RoomCommand::Leave { token } => {
            room.leave(&token);
        }
    }
}
