//! Protocolo de entrada do cliente.
//!
//! Duas fronteiras com o backend passam por aqui antes de qualquer
//! decisão de exibição:
//!
//! 1. **Leituras JSON** (`GET /dashboard` e evento `sensor_update`),
//!    validadas por [`parse_reading`]. JSON não validado nunca chega
//!    ao filtro de significância.
//! 2. **Pacotes socket.io** sobre Engine.IO v4, em texto:
//!
//! ```text
//! ┌────────────┬─────────────┬──────────────────────────────┐
//! │ Engine(1)  │ Socket(1)   │ Dados                        │
//! ├────────────┼─────────────┼──────────────────────────────┤
//! │ 4 message  │ 2 event     │ ["sensor_update",{...}]      │
//! │ 4 message  │ 0 connect   │ {"sid":"..."}                │
//! │ 2 ping     │ –           │ –                            │
//! └────────────┴─────────────┴──────────────────────────────┘
//! ```

use crate::types::{MotorState, TelemetrySample, TimeSource};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Pacote Engine.IO "pong", resposta a cada ping do servidor.
pub const ENGINE_PONG: &str = "3";
/// Pedido de conexão ao namespace padrão.
pub const SOCKET_CONNECT: &str = "40";
/// Saída explícita do namespace padrão.
pub const SOCKET_DISCONNECT: &str = "41";

/// Eventos de ciclo de vida entregues pela thread do socket.
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// Evento push com uma leitura nova.
pub const EVENT_SENSOR_UPDATE: &str = "sensor_update";
/// Evento emitido pelo cliente pedindo um `sensor_update` imediato.
pub const EVENT_REQUEST_UPDATE: &str = "request_update";

/// Erros do protocolo.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON inválido: {0}")]
    Json(String),

    #[error("Payload não é um objeto JSON")]
    NotAnObject,

    #[error("Payload sem leituras (nem `weight` nem `distance`)")]
    MissingReadings,

    #[error("Campo `{field}` com tipo inesperado: {found}")]
    InvalidField { field: &'static str, found: String },

    #[error("Timestamp inválido: {0}")]
    InvalidTimestamp(String),

    #[error("Pacote socket.io vazio")]
    EmptyPacket,

    #[error("Tipo de pacote desconhecido: {0:?}")]
    UnknownPacket(char),

    #[error("Evento socket.io malformado: {0}")]
    InvalidEvent(String),
}

// ──────────────────────────────────────────────
// Leituras JSON
// ──────────────────────────────────────────────

/// Converte texto JSON em leitura validada.
pub fn parse_reading_str(
    text: &str,
    received_at: DateTime<Utc>,
) -> Result<TelemetrySample, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))?;
    parse_reading(&value, received_at)
}

/// Valida um payload do backend e monta a [`TelemetrySample`].
///
/// Aceita as duas formas usadas pelo backend: `motor_status` (REST) e
/// `motor` (socket). `received_at` é usado quando não há `timestamp`
/// absoluto; a leitura sai marcada com [`TimeSource::Received`].
pub fn parse_reading(
    value: &Value,
    received_at: DateTime<Utc>,
) -> Result<TelemetrySample, ProtocolError> {
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    if !obj.contains_key("weight") && !obj.contains_key("distance") {
        return Err(ProtocolError::MissingReadings);
    }

    let weight = optional_number(obj, "weight")?;
    let tank_distance = optional_number(obj, "distance")?;
    let consumed_today = optional_number(obj, "total_consumed_today")?.unwrap_or(0.0);
    let motor_state = motor_state(obj)?;

    let backend_time = match obj.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(raw) => parse_timestamp(raw)?,
    };
    let (captured_at, time_source) = match backend_time {
        Some(at) => (at, TimeSource::Backend),
        None => (received_at, TimeSource::Received),
    };

    Ok(TelemetrySample {
        weight,
        tank_distance,
        motor_state,
        consumed_today,
        captured_at,
        time_source,
    })
}

fn optional_number(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, ProtocolError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| ProtocolError::InvalidField {
            field,
            found: n.to_string(),
        }),
        Some(other) => Err(ProtocolError::InvalidField {
            field,
            found: json_type(other).into(),
        }),
    }
}

fn motor_state(obj: &Map<String, Value>) -> Result<MotorState, ProtocolError> {
    let raw = ["motor_status", "motor"]
        .iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()));

    let running = match raw {
        None => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "running" | "on" | "1" => true,
            "idle" | "off" | "stopped" | "0" => false,
            _ => {
                return Err(ProtocolError::InvalidField {
                    field: "motor_status",
                    found: s.clone(),
                });
            }
        },
        Some(other) => {
            return Err(ProtocolError::InvalidField {
                field: "motor_status",
                found: json_type(other).into(),
            });
        }
    };

    Ok(if running {
        MotorState::Running
    } else {
        MotorState::Idle
    })
}

/// Aceita RFC 3339 ou epoch em segundos como instantes absolutos.
///
/// ISO 8601 sem fuso (o `datetime.now().isoformat()` do backend, na hora
/// local do Raspberry) é validado mas devolve `None`: o fuso do backend
/// não é conhecido aqui.
fn parse_timestamp(raw: &Value) -> Result<Option<DateTime<Utc>>, ProtocolError> {
    match raw {
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| ProtocolError::InvalidTimestamp(n.to_string()))?;
            Utc.timestamp_millis_opt((secs * 1000.0).round() as i64)
                .single()
                .map(Some)
                .ok_or_else(|| ProtocolError::InvalidTimestamp(n.to_string()))
        }
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|_| None)
                .map_err(|_| ProtocolError::InvalidTimestamp(s.clone()))
        }
        other => Err(ProtocolError::InvalidTimestamp(other.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ──────────────────────────────────────────────
// socket.io / Engine.IO
// ──────────────────────────────────────────────

/// Pacote recebido do servidor socket.io.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Handshake Engine.IO (`0{"sid":...,"pingInterval":...}`)
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace conectado (`40`)
    Connect,
    /// Namespace encerrado pelo servidor (`41`)
    Disconnect,
    /// Conexão ao namespace recusada (`44`)
    ConnectError(String),
    Event {
        name: String,
        payload: Option<Value>,
    },
    /// Tipos que o cliente não usa (ack, binário, upgrade)
    Ignored,
}

/// Decodifica um frame de texto Engine.IO.
pub fn decode_socket_packet(text: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or(ProtocolError::EmptyPacket)?;
    let rest = chars.as_str();

    match engine {
        '0' => serde_json::from_str(rest)
            .map(SocketPacket::Open)
            .map_err(|e| ProtocolError::Json(e.to_string())),
        '1' => Ok(SocketPacket::Close),
        '2' => Ok(SocketPacket::Ping),
        '3' => Ok(SocketPacket::Pong),
        '5' => Ok(SocketPacket::Ignored),
        '6' => Ok(SocketPacket::Noop),
        '4' => decode_socket_message(rest),
        other => Err(ProtocolError::UnknownPacket(other)),
    }
}

fn decode_socket_message(text: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::EmptyPacket)?;
    // O cliente só usa o namespace `/`
    let Some(body) = default_namespace_body(chars.as_str()) else {
        return Ok(SocketPacket::Ignored);
    };

    match kind {
        '0' => Ok(SocketPacket::Connect),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| body.to_owned());
            Ok(SocketPacket::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(SocketPacket::Ignored),
        other => Err(ProtocolError::UnknownPacket(other)),
    }
}

/// Corpo do pacote se ele é do namespace padrão; `None` para `/outro,...`.
fn default_namespace_body(body: &str) -> Option<&str> {
    if !body.starts_with('/') {
        return Some(body);
    }
    let (namespace, rest) = body.split_once(',').unwrap_or((body, ""));
    (namespace == "/").then_some(rest)
}

fn decode_event(body: &str) -> Result<SocketPacket, ProtocolError> {
    // Id de ack opcional antes do array
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProtocolError::InvalidEvent(e.to_string()))?;

    let mut items = match value {
        Value::Array(items) if !items.is_empty() => items.into_iter(),
        other => return Err(ProtocolError::InvalidEvent(other.to_string())),
    };

    let name = match items.next() {
        Some(Value::String(name)) => name,
        Some(other) => return Err(ProtocolError::InvalidEvent(other.to_string())),
        None => return Err(ProtocolError::InvalidEvent(String::new())),
    };

    Ok(SocketPacket::Event {
        name,
        payload: items.next(),
    })
}

/// Codifica um evento socket.io para envio (`42["nome",payload]`).
pub fn encode_socket_event(name: &str, payload: Option<&Value>) -> String {
    let mut items = vec![Value::String(name.to_owned())];
    if let Some(payload) = payload {
        items.push(payload.clone());
    }
    format!("42{}", Value::Array(items))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_dashboard_payload() {
        let payload = json!({
            "weight": 42.5,
            "distance": 73.0,
            "motor_status": 1,
            "total_consumed_today": 120.0,
            "timestamp": "2025-03-01T10:15:00+00:00",
            "system_info": {"cpu": 12}
        });
        let sample = parse_reading(&payload, now()).unwrap();
        assert_eq!(sample.weight, Some(42.5));
        assert_eq!(sample.tank_distance, Some(73.0));
        assert_eq!(sample.motor_state, MotorState::Running);
        assert_eq!(sample.consumed_today, 120.0);
        assert_eq!(
            sample.captured_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0).unwrap()
        );
    }

    #[test]
    fn socket_payload_without_timestamp_uses_receipt_time() {
        let payload = json!({"weight": 10.0, "distance": null, "motor": 0});
        let sample = parse_reading(&payload, now()).unwrap();
        assert_eq!(sample.tank_distance, None);
        assert_eq!(sample.motor_state, MotorState::Idle);
        assert_eq!(sample.consumed_today, 0.0);
        assert_eq!(sample.captured_at, now());
        assert_eq!(sample.time_source, TimeSource::Received);
    }

    #[test]
    fn naive_timestamp_falls_back_to_receipt_time() {
        // Hora local do backend, fuso desconhecido
        let payload = json!({"weight": 1.0, "timestamp": "2025-03-01T17:15:00.250000"});
        let sample = parse_reading(&payload, now()).unwrap();
        assert_eq!(sample.captured_at, now());
        assert_eq!(sample.time_source, TimeSource::Received);

        let without_fraction = json!({"weight": 1.0, "timestamp": "2025-03-01T17:15:00"});
        assert_eq!(
            parse_reading(&without_fraction, now()).unwrap().time_source,
            TimeSource::Received
        );
    }

    #[test]
    fn epoch_timestamp_is_accepted() {
        let payload = json!({"distance": 50.0, "timestamp": 1_700_000_000.5});
        let sample = parse_reading(&payload, now()).unwrap();
        assert_eq!(sample.captured_at.timestamp_millis(), 1_700_000_000_500);
        assert_eq!(sample.time_source, TimeSource::Backend);
    }

    #[test]
    fn missing_readings_is_rejected() {
        let payload = json!({"motor_status": 0, "total_consumed_today": 3.0});
        assert_eq!(
            parse_reading(&payload, now()),
            Err(ProtocolError::MissingReadings)
        );
    }

    #[test]
    fn non_numeric_weight_is_rejected() {
        let payload = json!({"weight": "12g", "distance": 40.0});
        assert!(matches!(
            parse_reading(&payload, now()),
            Err(ProtocolError::InvalidField { field: "weight", .. })
        ));
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(
            parse_reading(&json!([1, 2, 3]), now()),
            Err(ProtocolError::NotAnObject)
        );
        assert!(matches!(
            parse_reading_str("{not json", now()),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let payload = json!({"weight": 1.0, "timestamp": "ontem"});
        assert!(matches!(
            parse_reading(&payload, now()),
            Err(ProtocolError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn motor_accepts_bool_and_strings() {
        let running = json!({"weight": 1.0, "motor": true});
        let idle = json!({"weight": 1.0, "motor_status": null, "motor": "idle"});
        assert_eq!(
            parse_reading(&running, now()).unwrap().motor_state,
            MotorState::Running
        );
        assert_eq!(
            parse_reading(&idle, now()).unwrap().motor_state,
            MotorState::Idle
        );
    }

    #[test]
    fn decodes_engine_control_packets() {
        assert_eq!(decode_socket_packet("2").unwrap(), SocketPacket::Ping);
        assert_eq!(decode_socket_packet("6").unwrap(), SocketPacket::Noop);
        assert_eq!(decode_socket_packet("40").unwrap(), SocketPacket::Connect);
        assert_eq!(decode_socket_packet("41").unwrap(), SocketPacket::Disconnect);
        assert!(matches!(
            decode_socket_packet(r#"0{"sid":"abc","pingInterval":25000}"#).unwrap(),
            SocketPacket::Open(_)
        ));
        assert_eq!(decode_socket_packet(""), Err(ProtocolError::EmptyPacket));
        assert_eq!(decode_socket_packet("9"), Err(ProtocolError::UnknownPacket('9')));
    }

    #[test]
    fn decodes_sensor_update_event() {
        let packet = decode_socket_packet(r#"42["sensor_update",{"weight":12.5,"motor":1}]"#).unwrap();
        match packet {
            SocketPacket::Event { name, payload } => {
                assert_eq!(name, EVENT_SENSOR_UPDATE);
                assert_eq!(payload, Some(json!({"weight": 12.5, "motor": 1})));
            }
            other => panic!("esperado Event, veio {other:?}"),
        }
    }

    #[test]
    fn decodes_event_with_ack_id() {
        let packet = decode_socket_packet(r#"427["alert",{"type":"low"}]"#).unwrap();
        assert!(matches!(packet, SocketPacket::Event { ref name, .. } if name == "alert"));

        let explicit_root = decode_socket_packet(r#"42/,["sensor_update",{"weight":1}]"#).unwrap();
        assert!(matches!(explicit_root, SocketPacket::Event { ref name, .. } if name == EVENT_SENSOR_UPDATE));
    }

    #[test]
    fn other_namespaces_are_ignored() {
        assert_eq!(
            decode_socket_packet(r#"42/admin,7["sensor_update",{"weight":99}]"#).unwrap(),
            SocketPacket::Ignored
        );
        assert_eq!(decode_socket_packet("40/admin,").unwrap(), SocketPacket::Ignored);
        assert_eq!(decode_socket_packet("41/admin,").unwrap(), SocketPacket::Ignored);
    }

    #[test]
    fn decodes_connect_error_message() {
        let packet = decode_socket_packet(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(packet, SocketPacket::ConnectError("Not authorized".into()));
    }

    #[test]
    fn encodes_request_update_without_payload() {
        assert_eq!(
            encode_socket_event(EVENT_REQUEST_UPDATE, None),
            r#"42["request_update"]"#
        );
    }
}
