//! Canal push: socket.io (Engine.IO v4) sobre WebSocket via tungstenite.
//!
//! Uma thread `socket-io` de longa duração mantém a sessão, responde os
//! pings do servidor e reconecta com backoff exponencial. Comandos do
//! loop (`request_update`, encerrar) chegam por um channel próprio; os
//! eventos recebidos saem pelo channel de [`TransportEvent`].
//!
//! ```text
//! handshake: ◀ 0{"sid",...}   ▶ 40   ◀ 40{"sid"}
//! sessão:    ◀ 2 / ▶ 3 (ping/pong)   ◀ 42["sensor_update",{...}]
//! encerrar:  ▶ 41 + close frame
//! ```

use crate::error::SyncError;
use crate::transport::{EventSender, PushChannel, TransportEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use feeder_core::config::{ClientConfig, SocketConfig};
use feeder_core::protocol::{
    self, ENGINE_PONG, EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT,
    EVENT_REQUEST_UPDATE, SOCKET_CONNECT, SOCKET_DISCONNECT, SocketPacket,
};
use reqwest::Url;
use serde_json::Value;
use std::net::TcpStream;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tungstenite::{HandshakeError, Message, WebSocket};

/// Intervalo máximo de bloqueio em `read()` antes de olhar os comandos.
const READ_POLL: Duration = Duration::from_millis(200);

/// Valores do Engine.IO quando o handshake não informa.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug)]
enum Command {
    RequestUpdate,
    Close,
}

/// Parâmetros da thread do socket.
#[derive(Debug, Clone)]
struct Settings {
    url: String,
    reconnection_delay: Duration,
    reconnection_delay_max: Duration,
    handshake_timeout: Duration,
}

pub struct SocketIoPush {
    settings: Settings,
    commands: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl SocketIoPush {
    pub fn new(client: &ClientConfig, socket: &SocketConfig) -> Result<Self, SyncError> {
        let url = socket_url(&client.api_base_url, &socket.path)?;
        Ok(Self {
            settings: Settings {
                url,
                reconnection_delay: socket.reconnection_delay(),
                reconnection_delay_max: socket.reconnection_delay_max(),
                handshake_timeout: socket.handshake_timeout(),
            },
            commands: None,
            worker: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }
}

impl PushChannel for SocketIoPush {
    fn connect(&mut self, events: &EventSender) {
        if self.commands.is_some() {
            return;
        }

        let (cmd_tx, cmd_rx) = unbounded();
        let settings = self.settings.clone();
        let events = events.clone();

        match thread::Builder::new()
            .name("socket-io".into())
            .spawn(move || run(settings, events, cmd_rx))
        {
            Ok(handle) => {
                self.commands = Some(cmd_tx);
                self.worker = Some(handle);
            }
            Err(e) => warn!("Falha ao criar thread socket-io: {e}"),
        }
    }

    fn request_update(&mut self) -> Result<(), SyncError> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| SyncError::Transport("socket não iniciado".into()))?;
        commands
            .send(Command::RequestUpdate)
            .map_err(|_| SyncError::Transport("thread do socket encerrada".into()))
    }

    fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        // A thread pode estar presa no handshake; não bloqueia o loop
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for SocketIoPush {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ──────────────────────────────────────────────
// URL
// ──────────────────────────────────────────────

/// `http://host:porta` → `ws://host:porta/socket.io/?EIO=4&transport=websocket`
pub fn socket_url(api_base_url: &str, path: &str) -> Result<String, SyncError> {
    let mut url = Url::parse(api_base_url)
        .map_err(|e| SyncError::Transport(format!("URL inválida {api_base_url:?}: {e}")))?;

    match url.scheme() {
        "http" => {
            url.set_scheme("ws")
                .map_err(|_| SyncError::Transport("esquema ws rejeitado".into()))?;
        }
        // Socket sem TLS; backend do alimentador roda na rede local
        "https" => {
            return Err(SyncError::Transport(
                "socket.io sobre https não suportado, use ws_enabled = false".into(),
            ));
        }
        other => {
            return Err(SyncError::Transport(format!("esquema não suportado: {other}")));
        }
    }

    let path = if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    };
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

// ──────────────────────────────────────────────
// Backoff
// ──────────────────────────────────────────────

/// Atraso de reconexão: dobra a cada tentativa, limitado a `max`.
#[derive(Debug, Clone)]
struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

// ──────────────────────────────────────────────
// Thread do socket
// ──────────────────────────────────────────────

/// Como uma sessão terminou.
enum SessionEnd {
    /// Encerramento pedido pelo loop (ou loop já largou o channel)
    Closed,
    /// Conexão perdida; reconectar
    Lost(String),
}

struct Session {
    ws: WebSocket<TcpStream>,
    /// Sem ping do servidor por mais que isso, a sessão é dada como morta
    liveness: Duration,
}

fn run(settings: Settings, events: EventSender, commands: Receiver<Command>) {
    info!("Thread socket-io iniciada ({})", settings.url);
    let mut backoff = Backoff::new(settings.reconnection_delay, settings.reconnection_delay_max);

    loop {
        match open_session(&settings) {
            Ok(mut session) => {
                backoff.reset();
                if events.send(TransportEvent::push(EVENT_CONNECT, None)).is_err() {
                    shutdown(&mut session.ws);
                    return;
                }

                match serve(&mut session, &events, &commands) {
                    SessionEnd::Closed => {
                        shutdown(&mut session.ws);
                        break;
                    }
                    SessionEnd::Lost(reason) => {
                        warn!("Sessão socket.io perdida: {reason}");
                        let payload = Some(Value::String(reason));
                        if events.send(TransportEvent::push(EVENT_DISCONNECT, payload)).is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                debug!("Conexão socket.io falhou: {e}");
                let payload = Some(Value::String(e.to_string()));
                if events.send(TransportEvent::push(EVENT_CONNECT_ERROR, payload)).is_err() {
                    break;
                }
            }
        }

        let delay = backoff.next_delay();
        debug!("Nova tentativa de socket em {}ms", delay.as_millis());
        if close_requested_within(&commands, delay) {
            break;
        }
    }

    info!("Thread socket-io encerrada");
}

/// Espera `delay` atendendo comandos. `true` se pediram para encerrar.
fn close_requested_within(commands: &Receiver<Command>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match commands.recv_timeout(remaining) {
            // Sem sessão não há a quem pedir; o pull já cobre o refresh
            Ok(Command::RequestUpdate) => continue,
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

fn open_session(settings: &Settings) -> Result<Session, SyncError> {
    let url = Url::parse(&settings.url).map_err(|e| SyncError::Transport(e.to_string()))?;
    let addr = url
        .socket_addrs(|| Some(80))?
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::Transport(format!("endereço não resolvido: {url}")))?;

    let stream = TcpStream::connect_timeout(&addr, settings.handshake_timeout)?;
    stream.set_read_timeout(Some(settings.handshake_timeout))?;
    stream.set_nodelay(true)?;

    let (mut ws, _response) = tungstenite::client(settings.url.as_str(), stream).map_err(|e| match e {
        HandshakeError::Failure(e) => SyncError::from(e),
        HandshakeError::Interrupted(_) => SyncError::Timeout,
    })?;

    // Engine.IO open
    let open = loop {
        match read_packet(&mut ws)? {
            SocketPacket::Open(params) => break params,
            other => debug!("Pacote antes do open ignorado: {other:?}"),
        }
    };
    let liveness = liveness_from(&open);

    // Namespace padrão
    ws.send(Message::Text(SOCKET_CONNECT.into()))?;
    loop {
        match read_packet(&mut ws)? {
            SocketPacket::Connect => break,
            SocketPacket::ConnectError(message) => return Err(SyncError::Transport(message)),
            other => debug!("Pacote antes do connect ignorado: {other:?}"),
        }
    }

    ws.get_ref().set_read_timeout(Some(READ_POLL))?;
    info!("socket.io conectado em {}", settings.url);
    Ok(Session { ws, liveness })
}

/// Lê o próximo pacote de texto, respondendo pings no caminho.
fn read_packet(ws: &mut WebSocket<TcpStream>) -> Result<SocketPacket, SyncError> {
    loop {
        match ws.read()? {
            Message::Text(text) => match protocol::decode_socket_packet(&text)? {
                SocketPacket::Ping => ws.send(Message::Text(ENGINE_PONG.into()))?,
                packet => return Ok(packet),
            },
            Message::Close(_) => return Err(SyncError::Transport("close frame no handshake".into())),
            _ => {}
        }
    }
}

fn liveness_from(open: &Value) -> Duration {
    let field = |name: &str, default: u64| open.get(name).and_then(Value::as_u64).unwrap_or(default);
    let interval = field("pingInterval", DEFAULT_PING_INTERVAL_MS);
    let timeout = field("pingTimeout", DEFAULT_PING_TIMEOUT_MS);
    Duration::from_millis(interval + timeout)
}

fn serve(session: &mut Session, events: &EventSender, commands: &Receiver<Command>) -> SessionEnd {
    let ws = &mut session.ws;
    let mut last_seen = Instant::now();

    loop {
        // Comandos do loop
        loop {
            match commands.try_recv() {
                Ok(Command::RequestUpdate) => {
                    let frame = protocol::encode_socket_event(EVENT_REQUEST_UPDATE, None);
                    if let Err(e) = ws.send(Message::Text(frame)) {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => return SessionEnd::Closed,
                Err(TryRecvError::Empty) => break,
            }
        }

        if last_seen.elapsed() > session.liveness {
            return SessionEnd::Lost("ping timeout".into());
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                last_seen = Instant::now();
                match protocol::decode_socket_packet(&text) {
                    Ok(SocketPacket::Ping) => {
                        if let Err(e) = ws.send(Message::Text(ENGINE_PONG.into())) {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    Ok(SocketPacket::Event { name, payload }) => {
                        if events.send(TransportEvent::push(&name, payload)).is_err() {
                            return SessionEnd::Closed;
                        }
                    }
                    Ok(SocketPacket::Disconnect) => {
                        return SessionEnd::Lost("io server disconnect".into());
                    }
                    Ok(SocketPacket::Close) => return SessionEnd::Lost("transport close".into()),
                    Ok(_) => {}
                    Err(e) => debug!("Pacote socket.io ignorado: {e}"),
                }
            }
            Ok(Message::Close(_)) => return SessionEnd::Lost("transport close".into()),
            Ok(_) => last_seen = Instant::now(),
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => return SessionEnd::Lost(e.to_string()),
        }
    }
}

/// Sai do namespace e fecha o WebSocket, ignorando erros.
fn shutdown(ws: &mut WebSocket<TcpStream>) {
    let _ = ws.send(Message::Text(SOCKET_DISCONNECT.into()));
    let _ = ws.close(None);
    let _ = ws.flush();
}
