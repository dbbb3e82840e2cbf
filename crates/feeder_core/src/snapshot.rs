//! Snapshot binário da última leitura válida.
//!
//! Permite que o cliente reinicie já exibindo o último valor conhecido,
//! mesmo antes do backend responder. Formato do arquivo:
//!
//! ```text
//! ┌──────────┬─────────┬──────────────┐
//! │ Magic(1) │ Ver.(1) │ Payload (N)  │
//! └──────────┴─────────┴──────────────┘
//! ```
//!
//! - Magic byte `0x46` ('F') identifica snapshot do alimentador
//! - Payload é a [`TelemetrySample`] serializada com bincode

use crate::types::TelemetrySample;
use std::path::Path;
use tracing::debug;

/// Magic byte que identifica snapshots do cliente.
pub const SNAPSHOT_MAGIC: u8 = 0x46; // 'F'

/// Versão atual do formato.
pub const SNAPSHOT_VERSION: u8 = 2;

/// Tamanho do header (magic + version).
const HEADER_SIZE: usize = 2;

/// Erros de snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot muito curto ({0} bytes, mínimo {HEADER_SIZE})")]
    TooShort(usize),

    #[error("Magic byte inválido: 0x{0:02X} (esperado 0x{SNAPSHOT_MAGIC:02X})")]
    InvalidMagic(u8),

    #[error("Versão incompatível: {0} (suportada: {SNAPSHOT_VERSION})")]
    VersionMismatch(u8),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Codifica uma leitura no formato `[MAGIC][VERSION][bincode...]`.
pub fn encode_snapshot(sample: &TelemetrySample) -> Result<Vec<u8>, SnapshotError> {
    let body = bincode::serialize(sample).map_err(|e| SnapshotError::Serialize(e.to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.push(SNAPSHOT_MAGIC);
    frame.push(SNAPSHOT_VERSION);
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decodifica um snapshot, validando magic byte e versão.
pub fn decode_snapshot(data: &[u8]) -> Result<TelemetrySample, SnapshotError> {
    if data.len() < HEADER_SIZE {
        return Err(SnapshotError::TooShort(data.len()));
    }

    let magic = data[0];
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidMagic(magic));
    }

    let version = data[1];
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch(version));
    }

    bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| SnapshotError::Deserialize(e.to_string()))
}

/// Grava o snapshot em disco.
pub fn save_snapshot(path: &Path, sample: &TelemetrySample) -> Result<(), SnapshotError> {
    let frame = encode_snapshot(sample)?;
    std::fs::write(path, frame)?;
    debug!("Snapshot salvo em {}", path.display());
    Ok(())
}

/// Lê o snapshot do disco. Arquivo inexistente não é erro.
pub fn load_snapshot(path: &Path) -> Result<Option<TelemetrySample>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    decode_snapshot(&data).map(Some)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
