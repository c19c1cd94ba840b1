//! Player and viewer variants backed by a websocket connection. The socket
//! itself is driven by the server; these only see its two channel ends.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::collaborators::{ActionReply, ActionRequest, Player, TickInfo, Viewer};
use crate::engine::GameState;
use crate::error::CollaboratorError;
use crate::player_state::PlayerState;
use crate::protocol::{parse_client_message, ClientMessage};
use crate::types::{tick_payload, PlayerView, ServerMessage};

pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

fn encode(message: &ServerMessage) -> Result<String, CollaboratorError> {
    serde_json::to_string(message).map_err(|error| CollaboratorError::Protocol(error.to_string()))
}

async fn push(
    outbound: &mpsc::Sender<OutboundMessage>,
    text: String,
) -> Result<(), CollaboratorError> {
    outbound
        .send(OutboundMessage::Text(text))
        .await
        .map_err(|_| CollaboratorError::Disconnected)
}

pub struct SocketPlayer {
    name: String,
    outbound: mpsc::Sender<OutboundMessage>,
    inbound: mpsc::Receiver<String>,
}

impl SocketPlayer {
    pub fn new(
        name: impl Into<String>,
        outbound: mpsc::Sender<OutboundMessage>,
        inbound: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            name: name.into(),
            outbound,
            inbound,
        }
    }

    async fn exchange(
        &mut self,
        request: ActionRequest,
        state: &GameState,
    ) -> Result<ActionReply, CollaboratorError> {
        let payload = tick_payload(
            state,
            request.tick,
            request.ticks_left,
            Some(request.player_id),
            true,
        );
        push(&self.outbound, encode(&ServerMessage::Tick(payload))?).await?;

        let raw = self
            .inbound
            .recv()
            .await
            .ok_or(CollaboratorError::Disconnected)?;
        debug!(player = %self.name, tick = request.tick, %raw, "received response from socket");

        match parse_client_message(&raw) {
            Some(ClientMessage::Move { action, tick }) => Ok(ActionReply::new(tick, action)),
            _ => {
                warn!(player = %self.name, %raw, "invalid action");
                Err(CollaboratorError::Protocol(format!("invalid action: '{raw}'")))
            }
        }
    }
}

impl Player for SocketPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_action<'a>(
        &'a mut self,
        request: ActionRequest,
        state: &'a GameState,
    ) -> BoxFuture<'a, Result<ActionReply, CollaboratorError>> {
        self.exchange(request, state).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            let _ = self
                .outbound
                .send(OutboundMessage::Close {
                    code: CLOSE_NORMAL,
                    reason: "game finished".to_string(),
                })
                .await;
        }
        .boxed()
    }
}

pub struct SocketViewer {
    id: String,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl SocketViewer {
    pub fn new(id: impl Into<String>, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: id.into(),
            outbound,
        }
    }
}

impl Viewer for SocketViewer {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_tick<'a>(
        &'a mut self,
        info: TickInfo,
        state: &'a GameState,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        async move {
            let payload = tick_payload(state, info.tick, info.ticks_left, None, true);
            push(&self.outbound, encode(&ServerMessage::Tick(payload))?).await
        }
        .boxed()
    }

    fn send_winner<'a>(
        &'a mut self,
        tick: u64,
        winner: &'a PlayerState,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        async move {
            let message = ServerMessage::Winner {
                tick,
                winner: PlayerView::from_player(winner, true),
            };
            push(&self.outbound, encode(&message)?).await
        }
        .boxed()
    }
}
