// libs/video-conferencing-cell/src/services/websocket.rs
use std::time::Duration;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

use shared_config::AppConfig;

use crate::models::SignalingError;
use crate::services::signaling::{
    parse_event, ClientCommand, SignalingChannel, SignalingConnector, SignalingEvent, SignalingLink,
};

/// Signaling endpoint for a configuration: `SIGNALING_URL` when set,
/// otherwise derived from the API base URL.
pub fn signaling_endpoint(config: &AppConfig) -> Result<String, SignalingError> {
    match &config.signaling_url {
        Some(url) => Ok(url.clone()),
        None => derive_signaling_url(&config.api_base_url),
    }
}

/// `http://host:5001/api` becomes `ws://host:5001/ws`; `https` maps to `wss`.
pub fn derive_signaling_url(api_base_url: &str) -> Result<String, SignalingError> {
    let mut url = Url::parse(api_base_url)
        .map_err(|e| SignalingError::InvalidEndpoint(format!("{}: {}", api_base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SignalingError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SignalingError::InvalidEndpoint(api_base_url.to_string()))?;

    let path = url.path().trim_end_matches('/');
    let path = path.strip_suffix("/api").unwrap_or(path).to_string();
    url.set_path(&format!("{}/ws", path));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

enum Outbound {
    Send(ClientCommand),
    Close,
}

pub struct WsSignalingChannel {
    commands: mpsc::UnboundedSender<Outbound>,
    closed: bool,
}

impl WsSignalingChannel {
    fn queue(&mut self, command: ClientCommand) -> Result<(), SignalingError> {
        if self.closed {
            return Err(SignalingError::Closed);
        }
        self.commands
            .send(Outbound::Send(command))
            .map_err(|_| SignalingError::Closed)
    }
}

impl SignalingChannel for WsSignalingChannel {
    fn announce_join(&mut self, room_id: &str, user_id: &str, user_name: &str) -> Result<(), SignalingError> {
        self.queue(ClientCommand::JoinRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        })
    }

    fn announce_leave(&mut self, room_id: &str, user_id: &str) -> Result<(), SignalingError> {
        self.queue(ClientCommand::LeaveRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // The connection task may already be gone.
        let _ = self.commands.send(Outbound::Close);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// WebSocket transport for signaling. Each `open` spawns one task that owns
/// the socket for its whole life.
///
/// Closing a channel only queues the close; `shutdown` waits for the
/// connection tasks to flush it.
#[derive(Debug, Clone, Default)]
pub struct WsSignalingConnector {
    tasks: TaskTracker,
}

impl WsSignalingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `grace` for every connection task to finish. Returns
    /// false if some were still running.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tasks.close();
        let finished = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        if !finished {
            warn!("{} signaling connection(s) still open after {:?}", self.tasks.len(), grace);
        }
        finished
    }

    fn build_request(endpoint: &str, auth_token: &str) -> Result<Request, SignalingError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| SignalingError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", auth_token))
            .map_err(|_| SignalingError::ConnectionFailed("token is not a valid header value".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        Ok(request)
    }
}

impl SignalingConnector for WsSignalingConnector {
    fn open(&self, endpoint: &str, auth_token: &str) -> Result<SignalingLink, SignalingError> {
        let request = Self::build_request(endpoint, auth_token)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        info!("Opening signaling connection to {}", endpoint);
        self.tasks.spawn(run_connection(request, command_rx, event_tx));

        Ok(SignalingLink {
            channel: Box::new(WsSignalingChannel {
                commands: command_tx,
                closed: false,
            }),
            events: event_rx,
        })
    }
}

async fn run_connection(
    request: Request,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SignalingEvent>,
) {
    let connect = connect_async(request);
    tokio::pin!(connect);

    // Commands queued before the handshake completes are flushed after it.
    let mut pending = Vec::new();
    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _)) => break stream,
                Err(e) => {
                    warn!("Signaling connection failed: {}", e);
                    let _ = events.send(SignalingEvent::ConnectionFailed(e.to_string()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Outbound::Send(command)) => pending.push(command),
                Some(Outbound::Close) | None => {
                    debug!("Signaling closed before the connection was established");
                    return;
                }
            },
        }
    };

    info!("Signaling connected");
    if events.send(SignalingEvent::Connected).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    for command in pending.drain(..) {
        if let Err(reason) = send_command(&mut write, &command).await {
            let _ = events.send(SignalingEvent::ConnectionFailed(reason));
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Outbound::Send(command)) => {
                    if let Err(reason) = send_command(&mut write, &command).await {
                        let _ = events.send(SignalingEvent::ConnectionFailed(reason));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    debug!("Signaling connection closed");
                    return;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Outbound commands still drain if nobody is listening.
                    if let Some(event) = parse_event(text.as_str()) {
                        let _ = events.send(event);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!("Signaling connection closed by server");
                    let _ = events.send(SignalingEvent::ConnectionFailed(
                        "connection closed by server".to_string(),
                    ));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Signaling connection error: {}", e);
                    let _ = events.send(SignalingEvent::ConnectionFailed(e.to_string()));
                    return;
                }
            },
        }
    }
}

async fn send_command<S>(write: &mut S, command: &ClientCommand) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    <S as Sink<Message>>::Error: std::fmt::Display,
{
    let text = command.to_text().map_err(|e| e.to_string())?;
    debug!("Signaling send: {}", text);
    write.send(Message::text(text)).await.map_err(|e| e.to_string())
}
