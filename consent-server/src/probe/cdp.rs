//! Minimal Chrome DevTools Protocol client over a WebSocket.
//!
//! Commands are issued one at a time. Events that arrive while waiting for a
//! command response are queued and handed out by `next_event` in order.

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::trace;

use super::ProbeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An unsolicited CDP message.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Set for events from an attached target (flattened sessions).
    pub session_id: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CdpMessage {
    Response {
        id: u64,
        result: Result<Value, String>,
    },
    Event(CdpEvent),
}

/// Parse one text frame from the DevTools socket.
pub fn parse_message(text: &str) -> Result<CdpMessage, ProbeError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ProbeError::Protocol(format!("bad message: {e}")))?;

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let result = match value.get("error") {
            Some(err) => Err(err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Ok(CdpMessage::Response { id, result });
    }

    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| ProbeError::Protocol("message has neither id nor method".into()))?;

    Ok(CdpMessage::Event(CdpEvent {
        method: method.to_string(),
        params: value.get("params").cloned().unwrap_or(Value::Null),
        session_id: value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
    }))
}

/// Build the JSON text of a command frame.
pub fn command_frame(id: u64, method: &str, params: Value, session_id: Option<&str>) -> String {
    let mut frame = json!({ "id": id, "method": method, "params": params });
    if let Some(session) = session_id {
        frame["sessionId"] = Value::String(session.to_string());
    }
    frame.to_string()
}

pub struct CdpConnection {
    ws: WsStream,
    next_id: u64,
    pending: VecDeque<CdpEvent>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self, ProbeError> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url).await?;
        Ok(CdpConnection {
            ws,
            next_id: 1,
            pending: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response.
    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, ProbeError> {
        let id = self.next_id;
        self.next_id += 1;

        trace!(id, method, "cdp send");
        self.ws
            .send(Message::Text(command_frame(id, method, params, session_id).into()))
            .await?;

        loop {
            match self.recv().await? {
                CdpMessage::Response { id: got, result } if got == id => {
                    return result.map_err(|e| ProbeError::Protocol(format!("{method}: {e}")));
                }
                CdpMessage::Response { .. } => {}
                CdpMessage::Event(event) => self.pending.push_back(event),
            }
        }
    }

    /// Next event, queued ones first. Cancel-safe.
    pub async fn next_event(&mut self) -> Result<CdpEvent, ProbeError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        loop {
            if let CdpMessage::Event(event) = self.recv().await? {
                return Ok(event);
            }
        }
    }

    async fn recv(&mut self) -> Result<CdpMessage, ProbeError> {
        loop {
            let msg = match self.ws.next().await {
                Some(msg) => msg?,
                None => return Err(ProbeError::Protocol("devtools connection closed".into())),
            };
            match msg {
                Message::Text(text) => return parse_message(&text),
                Message::Close(_) => {
                    return Err(ProbeError::Protocol("devtools connection closed".into()))
                }
                _ => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
