//! Gerência dos canais push (socket.io) e pull (REST).
//!
//! Todo evento de transporte passa por [`TransportManager::dispatch`]:
//! respostas REST e eventos do socket, estes resolvidos pela tabela de
//! inscrições por nome. Só depois disso uma leitura segue para o filtro
//! de significância.
//!
//! Modo híbrido:
//!
//! ```text
//! Disconnected ──start──▶ Connecting ──connect──▶ Connected
//!                              │                  │    ▲
//!                        connect_error       disconnect │ connect
//!                              ▼                  ▼    │
//!                          Reconnecting ◀─────────┘────┘
//!
//! qualquer estado ──close──▶ Closed
//! ```
//!
//! Modo só-polling: `Idle ⇄ Fetching`, pelo timer de intervalo fixo e
//! por `refresh()`.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use feeder_core::protocol::{
    self, EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_SENSOR_UPDATE, ProtocolError,
};
use feeder_core::types::TelemetrySample;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lado de envio do channel de eventos do cliente.
pub type EventSender = Sender<TransportEvent>;

/// Evento bruto produzido pelas threads de I/O.
#[derive(Debug)]
pub enum TransportEvent {
    /// Resultado de uma busca REST
    Pull(Result<TelemetrySample, SyncError>),
    /// Evento do socket pelo nome (`connect`, `sensor_update`, ...)
    Push {
        name: String,
        payload: Option<Value>,
        received_at: DateTime<Utc>,
    },
}

impl TransportEvent {
    pub fn push(name: &str, payload: Option<Value>) -> Self {
        TransportEvent::Push {
            name: name.to_string(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Canal pull: busca assíncrona da leitura agregada.
pub trait PullChannel {
    /// Inicia uma busca. O resultado chega como [`TransportEvent::Pull`].
    fn start_fetch(&mut self, events: &EventSender);
}

/// Canal push: conexão persistente com reconexão própria.
pub trait PushChannel {
    /// Inicia a conexão; eventos chegam como [`TransportEvent::Push`].
    fn connect(&mut self, events: &EventSender);
    /// Emite `request_update`; o servidor responde com `sensor_update`.
    fn request_update(&mut self) -> Result<(), SyncError>;
    /// Encerra a conexão e a política de reconexão.
    fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    PollingOnly,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
}

/// Origem de uma leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Pull,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Push => f.write_str("push"),
            Channel::Pull => f.write_str("pull"),
        }
    }
}

/// O que o cliente precisa saber de cada evento já interpretado.
#[derive(Debug)]
pub enum Signal {
    Sample {
        sample: TelemetrySample,
        channel: Channel,
    },
    PullFailed(SyncError),
    PushConnected,
    PushDisconnected,
    PushConnectError(SyncError),
    PushMalformed(SyncError),
}

/// Resultado de um `refresh()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    RequestedUpdate,
    Pulled,
    Ignored,
}

type PushHandler = fn(&mut TransportManager, Option<Value>, DateTime<Utc>) -> Option<Signal>;

/// Tabela de inscrições: nome do evento → handler.
fn subscriptions() -> HashMap<&'static str, PushHandler> {
    let mut table: HashMap<&'static str, PushHandler> = HashMap::new();
    table.insert(EVENT_CONNECT, TransportManager::on_connect);
    table.insert(EVENT_DISCONNECT, TransportManager::on_disconnect);
    table.insert(EVENT_CONNECT_ERROR, TransportManager::on_connect_error);
    table.insert(EVENT_SENSOR_UPDATE, TransportManager::on_sensor_update);
    table
}

pub struct TransportManager {
    mode: TransportMode,
    socket_state: SocketState,
    pull: Box<dyn PullChannel>,
    push: Option<Box<dyn PushChannel>>,
    events: EventSender,
    subscriptions: HashMap<&'static str, PushHandler>,
    refresh_interval: Duration,
    next_poll: Option<Instant>,
    in_flight: usize,
}

impl TransportManager {
    /// Só polling REST em intervalo fixo.
    pub fn polling(pull: Box<dyn PullChannel>, refresh_interval: Duration, events: EventSender) -> Self {
        Self::build(TransportMode::PollingOnly, pull, None, refresh_interval, events)
    }

    /// WebSocket primário, REST como substituto enquanto o socket cai.
    pub fn hybrid(pull: Box<dyn PullChannel>, push: Box<dyn PushChannel>, events: EventSender) -> Self {
        Self::build(TransportMode::Hybrid, pull, Some(push), Duration::ZERO, events)
    }

    fn build(
        mode: TransportMode,
        pull: Box<dyn PullChannel>,
        push: Option<Box<dyn PushChannel>>,
        refresh_interval: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            mode,
            socket_state: SocketState::Disconnected,
            pull,
            push,
            events,
            subscriptions: subscriptions(),
            refresh_interval: refresh_interval.max(Duration::from_millis(1)),
            next_poll: None,
            in_flight: 0,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn socket_state(&self) -> SocketState {
        self.socket_state
    }

    pub fn poll_state(&self) -> PollState {
        if self.in_flight > 0 {
            PollState::Fetching
        } else {
            PollState::Idle
        }
    }

    pub fn is_closed(&self) -> bool {
        self.socket_state == SocketState::Closed
    }

    /// Próximo disparo do timer de polling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_poll
    }

    /// Abre os canais conforme o modo.
    pub fn start(&mut self, now: Instant) {
        if self.is_closed() {
            return;
        }
        match self.mode {
            TransportMode::Hybrid => {
                self.socket_state = SocketState::Connecting;
                if let Some(push) = self.push.as_mut() {
                    push.connect(&self.events);
                }
                info!("Modo híbrido: conectando socket, pull REST inicial");
                self.pull_now();
            }
            TransportMode::PollingOnly => {
                info!(
                    "Modo polling: intervalo de {}ms",
                    self.refresh_interval.as_millis()
                );
                self.pull_now();
                self.next_poll = Some(now + self.refresh_interval);
            }
        }
    }

    /// Dispara o polling se o timer venceu.
    pub fn on_timer(&mut self, now: Instant) {
        let Some(due) = self.next_poll else {
            return;
        };
        if now < due {
            return;
        }

        self.pull_now();

        // Cadência fixa: atrasos não acumulam disparos
        let mut next = due + self.refresh_interval;
        while next <= now {
            next += self.refresh_interval;
        }
        self.next_poll = Some(next);
    }

    /// Pedido explícito de atualização imediata.
    pub fn refresh(&mut self) -> Refresh {
        if self.is_closed() {
            return Refresh::Ignored;
        }

        if self.socket_state == SocketState::Connected {
            if let Some(push) = self.push.as_mut() {
                match push.request_update() {
                    Ok(()) => return Refresh::RequestedUpdate,
                    Err(e) => warn!("request_update falhou, usando REST: {e}"),
                }
            }
        }

        self.pull_now();
        Refresh::Pulled
    }

    /// Cancela o timer de polling e desconecta o socket, nessa ordem.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.next_poll = None;
        if let Some(push) = self.push.as_mut() {
            push.disconnect();
        }
        self.socket_state = SocketState::Closed;
    }

    /// Fan-in único de todos os eventos de transporte.
    pub fn dispatch(&mut self, event: TransportEvent) -> Option<Signal> {
        if self.is_closed() {
            return None;
        }

        match event {
            TransportEvent::Pull(result) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(match result {
                    Ok(sample) => Signal::Sample {
                        sample,
                        channel: Channel::Pull,
                    },
                    Err(e) => Signal::PullFailed(e),
                })
            }
            TransportEvent::Push {
                name,
                payload,
                received_at,
            } => match self.subscriptions.get(name.as_str()).copied() {
                Some(handler) => handler(self, payload, received_at),
                None => {
                    debug!("Evento socket ignorado: {name}");
                    None
                }
            },
        }
    }

    fn pull_now(&mut self) {
        self.in_flight += 1;
        self.pull.start_fetch(&self.events);
    }

    // ── Handlers da tabela de inscrições ──

    fn on_connect(&mut self, _payload: Option<Value>, _at: DateTime<Utc>) -> Option<Signal> {
        self.socket_state = SocketState::Connected;
        if let Some(push) = self.push.as_mut() {
            if let Err(e) = push.request_update() {
                warn!("request_update após connect falhou: {e}");
            }
        }
        Some(Signal::PushConnected)
    }

    fn on_disconnect(&mut self, payload: Option<Value>, _at: DateTime<Utc>) -> Option<Signal> {
        self.socket_state = SocketState::Reconnecting;
        debug!("Motivo do disconnect: {}", describe(payload.as_ref()));
        // REST cobre o intervalo até o socket voltar
        self.pull_now();
        Some(Signal::PushDisconnected)
    }

    fn on_connect_error(&mut self, payload: Option<Value>, _at: DateTime<Utc>) -> Option<Signal> {
        self.socket_state = SocketState::Reconnecting;
        self.pull_now();
        Some(Signal::PushConnectError(SyncError::Transport(describe(
            payload.as_ref(),
        ))))
    }

    fn on_sensor_update(&mut self, payload: Option<Value>, at: DateTime<Utc>) -> Option<Signal> {
        let parsed = match payload {
            Some(value) => protocol::parse_reading(&value, at),
            None => Err(ProtocolError::NotAnObject),
        };
        Some(match parsed {
            Ok(sample) => Signal::Sample {
                sample,
                channel: Channel::Push,
            },
            Err(e) => Signal::PushMalformed(SyncError::Malformed(e)),
        })
    }
}

fn describe(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "sem detalhes".into(),
    }
}
