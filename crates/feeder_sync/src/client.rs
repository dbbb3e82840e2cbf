//! Cliente de sincronização observável.
//!
//! Um único dono (a thread do loop de UI) chama [`SyncClient::pump`] ou
//! [`SyncClient::wait`]. As threads de I/O só falam com o cliente pelo
//! channel de [`TransportEvent`], então o cache, o contador de falhas e a
//! leitura pendente nunca são tocados em paralelo.
//!
//! ```text
//!  rest-pull ─┐
//!             ├─▶ crossbeam channel ─▶ pump() ─▶ TransportManager::dispatch
//!  socket-io ─┘                                   │
//!                                                 ▼
//!                               SignificanceFilter ─▶ ValueCache ─▶ observadores
//! ```

use crate::cache::ValueCache;
use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::failure::FailureTracker;
use crate::http::HttpPull;
use crate::significance::{Decision, PendingUpdate, SignificanceFilter};
use crate::socket::SocketIoPush;
use crate::transport::{
    Channel, Refresh, Signal, SocketState, TransportEvent, TransportManager, TransportMode,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use feeder_core::config::{AppConfig, ClientConfig};
use feeder_core::types::{ErrorKind, SyncState, TelemetrySample};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct SyncClient<C: Clock = SystemClock> {
    clock: C,
    transport: TransportManager,
    events: Receiver<TransportEvent>,
    cache: ValueCache,
    filter: SignificanceFilter,
    failures: FailureTracker,
    pending: Option<PendingUpdate>,
    last_error: Option<ErrorKind>,
    observers: Vec<Sender<SyncState>>,
    published: SyncState,
    snapshot_path: Option<PathBuf>,
    closed: bool,
}

impl SyncClient<SystemClock> {
    /// Cria o cliente com os transportes reais e já inicia a sincronização.
    pub fn connect(config: &AppConfig) -> Result<Self, SyncError> {
        let (tx, rx) = unbounded();
        let pull = Box::new(HttpPull::new(&config.client)?);

        let transport = if config.client.ws_enabled {
            let push = Box::new(SocketIoPush::new(&config.client, &config.socket)?);
            TransportManager::hybrid(pull, push, tx)
        } else {
            TransportManager::polling(pull, config.client.refresh_interval(), tx)
        };

        Ok(Self::with_transport(&config.client, SystemClock, transport, rx))
    }
}

impl<C: Clock> SyncClient<C> {
    /// Monta o cliente sobre um transporte já construído e chama `start`.
    ///
    /// `events` deve ser o lado receptor do channel entregue ao transporte.
    pub fn with_transport(
        config: &ClientConfig,
        clock: C,
        transport: TransportManager,
        events: Receiver<TransportEvent>,
    ) -> Self {
        let snapshot_path = config.snapshot_path();
        let cache = snapshot_path
            .as_deref()
            .map(ValueCache::restore)
            .unwrap_or_default();

        let mut client = Self {
            clock,
            transport,
            events,
            cache,
            filter: SignificanceFilter::from_config(config),
            failures: FailureTracker::new(config.failure_threshold),
            pending: None,
            last_error: None,
            observers: Vec::new(),
            published: SyncState::default(),
            snapshot_path,
            closed: false,
        };
        client.published = client.state();

        info!(
            "Cliente de sincronização iniciado ({:?}, {})",
            client.transport.mode(),
            config.api_base_url
        );
        let now = client.clock.now();
        client.transport.start(now);
        client
    }

    // ──── Observação ────

    /// Registra um observador. Largar o `Receiver` cancela a inscrição.
    pub fn subscribe(&mut self) -> Receiver<SyncState> {
        let (tx, rx) = unbounded();
        if !self.closed {
            self.observers.push(tx);
        }
        rx
    }

    /// Remove todos os observadores; os receptores deixam de receber.
    pub fn unsubscribe_all(&mut self) {
        self.observers.clear();
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Estado atual, o mesmo que foi (ou será) publicado.
    pub fn state(&self) -> SyncState {
        SyncState {
            current: self.cache.get().cloned(),
            is_connected: self.failures.is_connected(),
            last_error: self.last_error,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub fn socket_state(&self) -> SocketState {
        self.transport.socket_state()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ──── Loop ────

    /// Processa eventos já recebidos e timers vencidos, sem bloquear.
    pub fn pump(&mut self) {
        if self.closed {
            return;
        }
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        self.fire_timers();
    }

    /// Bloqueia até chegar um evento, vencer um timer ou passar `max`.
    pub fn wait(&mut self, max: Duration) {
        if self.closed {
            return;
        }

        let now = self.clock.now();
        let timeout = match self.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(max),
            None => max,
        };

        // Timeout ou channel fechado: só os timers andam
        if let Ok(event) = self.events.recv_timeout(timeout) {
            self.handle_event(event);
        }
        self.pump();
    }

    /// Pede uma leitura nova agora, ignorando o debounce.
    pub fn refresh(&mut self) {
        if self.closed {
            return;
        }
        match self.transport.refresh() {
            Refresh::RequestedUpdate => debug!("refresh: request_update pelo socket"),
            Refresh::Pulled => debug!("refresh: pull REST"),
            Refresh::Ignored => {}
        }
    }

    /// Encerra tudo. Depois disso nenhum observador é notificado.
    ///
    /// Ordem: leitura pendente, timer de polling, socket, snapshot.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.pending = None;
        self.transport.close();

        if let Some(path) = &self.snapshot_path {
            self.cache.persist(path);
        }
        self.unsubscribe_all();
        info!("Cliente de sincronização encerrado");
    }

    // ──── Internos ────

    fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending.as_ref().map(|p| p.due);
        match (pending, self.transport.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let Some(signal) = self.transport.dispatch(event) else {
            return;
        };

        match signal {
            Signal::Sample { sample, channel } => {
                self.failures.on_success();
                self.last_error = None;
                self.offer(sample, channel);
            }
            Signal::PullFailed(e) => {
                warn!("Pull REST falhou: {e}");
                self.failures.on_failure();
                self.last_error = Some(e.kind());
            }
            Signal::PushConnected => {
                info!("Socket conectado");
                self.failures.on_success();
                self.last_error = None;
            }
            Signal::PushDisconnected => {
                warn!("Socket desconectado, usando REST até reconectar");
                self.failures.mark_disconnected();
            }
            Signal::PushConnectError(e) => {
                warn!("Socket não conectou: {e}");
                self.failures.on_failure();
                self.last_error = Some(e.kind());
            }
            Signal::PushMalformed(e) => {
                warn!("sensor_update descartado: {e}");
                self.last_error = Some(e.kind());
            }
        }

        self.publish();
    }

    fn offer(&mut self, sample: TelemetrySample, channel: Channel) {
        let now = self.clock.now();
        match self.filter.evaluate(self.cache.get(), &sample) {
            Decision::ApplyNow => {
                // Leitura significativa substitui qualquer pendente
                self.pending = None;
                self.cache.set(sample);
            }
            Decision::ApplyDelayed(delay) => {
                if self.pending.replace(PendingUpdate::new(sample, now, delay)).is_some() {
                    debug!("Leitura {channel} substituiu a pendente");
                }
            }
            Decision::Drop => {
                debug!("Leitura {channel} descartada: mais antiga que a exibida");
            }
        }
    }

    fn fire_timers(&mut self) {
        let now = self.clock.now();

        if self.pending.as_ref().is_some_and(|p| p.is_due(now)) {
            if let Some(pending) = self.pending.take() {
                self.cache.set(pending.sample);
                self.publish();
            }
        }

        self.transport.on_timer(now);
    }

    fn publish(&mut self) {
        let state = self.state();
        if state == self.published {
            return;
        }
        self.observers.retain(|tx| tx.send(state.clone()).is_ok());
        self.published = state;
    }
}

impl<C: Clock> Drop for SyncClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}
