//! Session registry, matchmaking queue, and routing of client messages to
//! their match. One task owns all of it; sockets talk to it over a channel.

use crate::config::ServerConfig;
use crate::conn::{ConnHandle, ConnId};
use crate::game_loop::{spawn_room, RoomCommand, RoomHandle};
use crate::matchmaker::Matchmaker;
use crate::room::{unix_millis, MatchOutcome, MatchRoom, SeatCommand};
use eightball_shared::protocol::{
    ClientMsg, ErrorMsg, HelloMsg, MatchFoundMsg, MatchId, PongMsg, QueueStatusMsg, ServerMsg,
    PROTOCOL_VERSION,
};
use eightball_shared::state::Seat;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Commands from sockets (and finished rooms) to the lobby task
#[derive(Debug)]
pub enum LobbyCommand {
    /// New socket. Replies with the player token bound to it.
    Connect {
        token: Option<String>,
        conn: ConnHandle,
        response: oneshot::Sender<String>,
    },
    Disconnect {
        token: String,
        conn_id: ConnId,
    },
    Client {
        token: String,
        conn: ConnHandle,
        msg: ClientMsg,
    },
    MatchEnded(MatchOutcome),
}

#[derive(Debug, Clone)]
struct Seating {
    match_id: MatchId,
    seat: Seat,
}

pub struct Lobby {
    config: ServerConfig,
    matchmaker: Matchmaker,
    rooms: HashMap<MatchId, RoomHandle>,
    seated: HashMap<String, Seating>,
    /// Handed to rooms so they can report back when they end
    self_tx: mpsc::Sender<LobbyCommand>,
}

impl Lobby {
    pub fn new(config: ServerConfig, self_tx: mpsc::Sender<LobbyCommand>) -> Self {
        Self {
            config,
            matchmaker: Matchmaker::new(),
            rooms: HashMap::new(),
            seated: HashMap::new(),
            self_tx,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.matchmaker.len()
    }

    pub fn active_matches(&self) -> usize {
        self.rooms.len()
    }

    pub fn handle(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::Connect {
                token,
                conn,
                response,
            } => {
                let token = self.connect(token, conn);
                let _ = response.send(token);
            }
            LobbyCommand::Disconnect { token, conn_id } => self.disconnect(&token, conn_id),
            LobbyCommand::Client { token, conn, msg } => self.client_msg(&token, conn, msg),
            LobbyCommand::MatchEnded(outcome) => self.match_ended(&outcome),
        }
    }

    fn connect(&mut self, token: Option<String>, conn: ConnHandle) -> String {
        let token = token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        conn.send(ServerMsg::Hello(HelloMsg {
            protocol_version: PROTOCOL_VERSION,
            session_id: conn.id.to_string(),
            player_token: token.clone(),
        }));
        tracing::info!(conn = %conn.id, "Session connected");

        if self.reattach(&token, conn.clone()) {
            return token;
        }
        if self.matchmaker.position(&token).is_some() {
            self.join_queue(&token, conn, None);
        }
        token
    }

    fn disconnect(&mut self, token: &str, conn_id: ConnId) {
        if self.matchmaker.on_disconnect(token, conn_id) {
            tracing::info!(conn = %conn_id, "Queued player disconnected");
        }
        if let Some(room) = self.room_of(token) {
            room.send(RoomCommand::Detach {
                token: token.to_string(),
                conn_id,
            });
        }
    }

    fn client_msg(&mut self, token: &str, conn: ConnHandle, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinQueue(m) => {
                if !self.reattach(token, conn.clone()) {
                    self.join_queue(token, conn, m.display_name);
                    self.start_matches();
                }
            }
            ClientMsg::LeaveQueue => {
                self.matchmaker.leave(token);
                conn.send(ServerMsg::QueueStatus(QueueStatusMsg {
                    in_queue: false,
                    position: None,
                }));
            }
            ClientMsg::LeaveMatch(m) => {
                if let Some(room) = self.room_for(token, &m.match_id) {
                    room.send(RoomCommand::Leave {
                        token: token.to_string(),
                    });
                }
            }
            ClientMsg::Rematch(_) => {
                conn.send(ServerMsg::Error(ErrorMsg::not_implemented("Rematch")));
            }
            ClientMsg::Ping(p) => {
                conn.send(ServerMsg::Pong(PongMsg {
                    client_time_ms: p.client_time_ms,
                    server_time_ms: unix_millis(),
                }));
            }
            ClientMsg::Aim(m) => self.forward(token, SeatCommand::Aim(m)),
            ClientMsg::PlaceCue(m) => self.forward(token, SeatCommand::PlaceCue(m)),
            ClientMsg::Shoot(m) => self.forward(token, SeatCommand::Shoot(m)),
        }
    }

    fn forward(&self, token: &str, cmd: SeatCommand) {
        let match_id = cmd.match_id();
        match self.room_for(token, match_id) {
            Some(room) => {
                room.send(RoomCommand::Seat {
                    token: token.to_string(),
                    cmd,
                });
            }
            None => tracing::debug!(match_id, "Dropped command for a match the sender is not in"),
        }
    }

    fn room_of(&self, token: &str) -> Option<&RoomHandle> {
        let seating = self.seated.get(token)?;
        self.rooms.get(&seating.match_id)
    }

    fn room_for(&self, token: &str, match_id: &str) -> Option<&RoomHandle> {
        self.room_of(token).filter(|room| room.match_id == match_id)
    }

    /// Seat held by `token` in a room that is still running. A room whose
    /// loop already exited is released here, ahead of its end report.
    fn live_seating(&mut self, token: &str) -> Option<Seating> {
        let seating = self.seated.get(token)?.clone();
        let running = self
            .rooms
            .get(&seating.match_id)
            .is_some_and(|room| !room.is_closed());
        if !running {
            self.release(&seating.match_id);
            return None;
        }
        Some(seating)
    }

    /// Put a returning player back in their seat. Returns false if they have none.
    fn reattach(&mut self, token: &str, conn: ConnHandle) -> bool {
        let Some(seating) = self.live_seating(token) else {
            return false;
        };
        conn.send(ServerMsg::MatchFound(MatchFoundMsg {
            match_id: seating.match_id.clone(),
            seat: seating.seat,
        }));
        let attached = self.rooms.get(&seating.match_id).is_some_and(|room| {
            room.send(RoomCommand::Attach {
                token: token.to_string(),
                conn,
            })
        });
        if !attached {
            self.release(&seating.match_id);
        }
        attached
    }

    fn join_queue(&mut self, token: &str, conn: ConnHandle, display_name: Option<String>) {
        let position = self.matchmaker.join(token, conn.clone(), display_name);
        conn.send(ServerMsg::QueueStatus(QueueStatusMsg {
            in_queue: true,
            position: Some(position),
        }));
    }

    fn start_matches(&mut self) {
        while let Some(players) = self.matchmaker.try_pop_match() {
            let match_id = Uuid::new_v4().to_string();
            let names = players
                .each_ref()
                .map(|p| p.display_name.clone().unwrap_or_else(|| "anonymous".to_string()));
            let waited_ms = players
                .each_ref()
                .map(|p| p.joined_at.elapsed().as_millis() as u64);
            let tokens = [players[0].token.clone(), players[1].token.clone()];

            let lobby_tx = self.self_tx.clone();
            let room = MatchRoom::new(match_id.clone(), tokens, self.config.match_config.clone())
                .on_end(move |outcome| {
                    let outcome = outcome.clone();
                    tokio::spawn(async move {
                        let _ = lobby_tx.send(LobbyCommand::MatchEnded(outcome)).await;
                    });
                });
            let handle = spawn_room(
                room,
                self.config.match_config.tick_interval,
                self.config.room_channel_capacity,
            );

            for (seat, player) in Seat::BOTH.into_iter().zip(players) {
                self.seated.insert(
                    player.token.clone(),
                    Seating {
                        match_id: match_id.clone(),
                        seat,
                    },
                );
                player.conn.send(ServerMsg::MatchFound(MatchFoundMsg {
                    match_id: match_id.clone(),
                    seat,
                }));
                handle.send(RoomCommand::Attach {
                    token: player.token,
                    conn: player.conn,
                });
            }

            tracing::info!(%match_id, ?names, ?waited_ms, "Match started");
            self.rooms.insert(match_id, handle);
        }
    }

    fn match_ended(&mut self, outcome: &MatchOutcome) {
        self.release(&outcome.match_id);
    }

    /// Forget a finished room and its seats. Safe to call more than once.
    fn release(&mut self, match_id: &str) {
        if self.rooms.remove(match_id).is_none() {
            return;
        }
        self.seated.retain(|_, seating| seating.match_id != match_id);
        tracing::info!(match_id, active = self.rooms.len(), "Match released");
    }
}

/// Run the lobby until every sender is gone.
pub async fn run_lobby(
    mut cmd_rx: mpsc::Receiver<LobbyCommand>,
    self_tx: mpsc::Sender<LobbyCommand>,
    config: ServerConfig,
) {
    let mut lobby = Lobby::new(config, self_tx);
    while let Some(cmd) = cmd_rx.recv().await {
        lobby.handle(cmd);
    }
    tracing::info!("Lobby ended");
}
