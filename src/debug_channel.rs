// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Debug channel between the engine and external devtools.
//!
//! Outbound, every telemetry event is broadcast as
//! `{"source": "<tool>-agent", "payload": <event>}`. Nobody listening is fine;
//! send failures are dropped.
//!
//! Inbound, exactly one message shape is understood:
//!
//! ```json
//! {"source": "<tool>-devtools", "name": "action", "data": {"id": "signature", "value": true}}
//! ```
//!
//! It toggles content-signature generation. Anything else is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMessage {
    pub source: String,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct DevtoolsMessage {
    source: String,
    name: String,
    data: DevtoolsAction,
}

#[derive(Debug, Deserialize)]
struct DevtoolsAction {
    id: String,
    value: Value,
}

pub struct DebugChannel {
    tool: String,
    outbound: broadcast::Sender<AgentMessage>,
    signatures: AtomicBool,
}

impl DebugChannel {
    pub fn new(tool: impl Into<String>, capacity: usize, signatures: bool) -> Self {
        let (outbound, _) = broadcast::channel(capacity.max(1));
        Self {
            tool: tool.into(),
            outbound,
            signatures: AtomicBool::new(signatures),
        }
    }

    #[must_use]
    pub fn agent_source(&self) -> String {
        format!("{}-agent", self.tool)
    }

    #[must_use]
    pub fn devtools_source(&self) -> String {
        format!("{}-devtools", self.tool)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentMessage> {
        self.outbound.subscribe()
    }

    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.outbound.receiver_count() > 0
    }

    /// Broadcast `payload` to any listeners.
    pub fn publish(&self, payload: Value) {
        let _ = self.outbound.send(AgentMessage {
            source: self.agent_source(),
            payload,
        });
    }

    #[must_use]
    pub fn signatures_enabled(&self) -> bool {
        self.signatures.load(Ordering::Relaxed)
    }

    pub fn set_signatures(&self, enabled: bool) {
        self.signatures.store(enabled, Ordering::Relaxed);
    }

    /// Apply an inbound devtools message. Returns whether it was understood.
    pub fn handle(&self, message: &Value) -> bool {
        let Ok(msg) = DevtoolsMessage::deserialize(message) else {
            return false;
        };
        if msg.source != self.devtools_source() || msg.name != "action" || msg.data.id != "signature" {
            return false;
        }
        let Some(enabled) = msg.data.value.as_bool() else {
            return false;
        };

        self.set_signatures(enabled);
        debug!(enabled, "Signature generation toggled from devtools");
        true
    }

    /// Feed inbound messages from `rx` until the sender side closes.
    pub fn listen(self: Arc<Self>, mut rx: mpsc::Receiver<Value>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                self.handle(&message);
            }
        })
    }
}
