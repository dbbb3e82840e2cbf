//! Erros dos canais de transporte.

use feeder_core::protocol::ProtocolError;
use feeder_core::types::ErrorKind;

/// Falha de uma tentativa pull ou de um evento push.
///
/// Nunca chega ao observador como erro: o cliente traduz para
/// [`ErrorKind`] e para o indicador de conexão.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Requisição excedeu o timeout")]
    Timeout,

    #[error("Backend respondeu HTTP {0}")]
    Status(u16),

    #[error("Erro de transporte: {0}")]
    Transport(String),

    #[error("Payload inválido: {0}")]
    Malformed(#[from] ProtocolError),
}

impl SyncError {
    /// Categoria exposta no estado observável.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Timeout => ErrorKind::NetworkTimeout,
            SyncError::Status(_) | SyncError::Transport(_) => ErrorKind::TransportError,
            SyncError::Malformed(_) => ErrorKind::MalformedPayload,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else if let Some(status) = e.status() {
            SyncError::Status(status.as_u16())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => SyncError::Timeout,
            _ => SyncError::Transport(e.to_string()),
        }
    }
}

impl From<tungstenite::Error> for SyncError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(io) => SyncError::from(io),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SyncError::Timeout.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(SyncError::Status(503).kind(), ErrorKind::TransportError);
        assert_eq!(
            SyncError::Transport("recusado".into()).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            SyncError::from(ProtocolError::MissingReadings).kind(),
            ErrorKind::MalformedPayload
        );
    }

    #[test]
    fn io_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "lento");
        assert_eq!(SyncError::from(tungstenite::Error::Io(io)), SyncError::Timeout);
    }
}
