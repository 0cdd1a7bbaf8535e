//! Request and response message types for the Bybit V5 WebSocket API

use crate::events::UpdateEvent;
use crate::records::{ts_ms, Balance, Kline, Order, PositionUpdate, Trade};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Outbound operation request (`subscribe`, `unsubscribe`, `ping`, `auth`)
#[derive(Debug, Clone, Serialize)]
pub struct WsRequest {
    /// Operation name
    pub op: &'static str,
    /// Operation arguments (topics, or auth material)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Optional request ID (echoed in the response)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

impl WsRequest {
    /// Subscribe to a set of topics
    pub fn subscribe(topics: Vec<String>) -> Self {
        Self {
            op: "subscribe",
            args: topics,
            req_id: None,
        }
    }

    /// Unsubscribe from a set of topics
    pub fn unsubscribe(topics: Vec<String>) -> Self {
        Self {
            op: "unsubscribe",
            args: topics,
            req_id: None,
        }
    }

    /// Application-level ping
    pub fn ping() -> Self {
        Self {
            op: "ping",
            args: Vec::new(),
            req_id: None,
        }
    }

    /// Add a request ID
    pub fn with_req_id(mut self, id: impl Into<String>) -> Self {
        self.req_id = Some(id.into());
        self
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Acknowledgement of an operation request
#[derive(Debug, Clone, Deserialize)]
pub struct OpResponse {
    /// Operation that was acknowledged
    pub op: String,
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    /// Server message (rejection reason on failure)
    #[serde(default)]
    pub ret_msg: Option<String>,
    /// Echoed request ID
    #[serde(default)]
    pub req_id: Option<String>,
}

/// Whether a push carries a full snapshot or a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// Full state for the topic
    Snapshot,
    /// Incremental change
    Delta,
}

/// One data push for a subscribed topic
#[derive(Debug, Clone)]
pub struct TopicPush {
    /// Topic the push belongs to
    pub topic: String,
    /// Snapshot or delta
    pub kind: PushKind,
    /// Server send time (ms since epoch)
    pub ts: i64,
    /// Normalized update events carried by the push
    pub events: Vec<UpdateEvent>,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Data push for a subscribed topic
    Push(TopicPush),
    /// Operation acknowledgement
    Response(OpResponse),
    /// Pong reply to an application-level ping
    Pong,
    /// Message we do not recognize (kept raw for logging)
    Unknown(String),
}

// Raw envelope, before topic-specific payload decoding
#[derive(Deserialize)]
struct RawPush {
    topic: String,
    #[serde(rename = "type", default)]
    msg_type: Option<String>,
    #[serde(deserialize_with = "ts_ms::deserialize", default)]
    ts: i64,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct WalletEntry {
    #[serde(default)]
    coin: Vec<Balance>,
}

impl WsMessage {
    /// Parse a raw text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(op) = value.get("op").and_then(|v| v.as_str()) {
            if op == "pong" || op == "ping" {
                return Ok(Self::Pong);
            }
            let resp: OpResponse = serde_json::from_value(value)?;
            if resp.ret_msg.as_deref() == Some("pong") {
                return Ok(Self::Pong);
            }
            return Ok(Self::Response(resp));
        }

        if value.get("topic").is_some() {
            let raw: RawPush = serde_json::from_value(value)?;
            return Ok(Self::Push(Self::decode_push(raw)?));
        }

        Ok(Self::Unknown(text.to_string()))
    }

    // Decode the topic-specific payload into normalized update events
    fn decode_push(raw: RawPush) -> Result<TopicPush, serde_json::Error> {
        let kind = match raw.msg_type.as_deref() {
            Some("snapshot") => PushKind::Snapshot,
            _ => PushKind::Delta,
        };

        let events = if raw.topic.starts_with("kline.") {
            let klines: Vec<Kline> = serde_json::from_value(raw.data)?;
            klines.into_iter().map(UpdateEvent::Kline).collect()
        } else if raw.topic.starts_with("publicTrade.") {
            let trades: Vec<Trade> = serde_json::from_value(raw.data)?;
            trades.into_iter().map(UpdateEvent::Trade).collect()
        } else if raw.topic == "order" {
            let orders: Vec<Order> = serde_json::from_value(raw.data)?;
            orders.into_iter().map(UpdateEvent::Order).collect()
        } else if raw.topic == "position" {
            let positions: Vec<PositionUpdate> = serde_json::from_value(raw.data)?;
            positions.into_iter().map(UpdateEvent::Position).collect()
        } else if raw.topic == "wallet" {
            // Wallet pushes nest per-coin balances inside account entries;
            // the per-coin records carry no timestamp, so stamp the
            // envelope send time as their ordering marker.
            let entries: Vec<WalletEntry> = serde_json::from_value(raw.data)?;
            entries
                .into_iter()
                .flat_map(|e| e.coin)
                .map(|mut b| {
                    b.seq = raw.ts;
                    UpdateEvent::Balance(b)
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(TopicPush {
            topic: raw.topic,
            kind,
            ts: raw.ts,
            events,
        })
    }
}
