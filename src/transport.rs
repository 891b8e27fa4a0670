//! ==============================================================================
//! transport.rs - mqtt transport adapter
//! ==============================================================================
//!
//! purpose:
//!     connects to the public sensor broker over secure websockets, subscribes
//!     to the wildcard topic and forwards each message into the hub.
//!
//! lifecycle:
//!     `connect` builds a client handle and a session. `MqttSession::run`
//!     drives the event loop until the connection is lost, then returns.
//!     it never reconnects on its own; main.rs decides when to open a new one.
//!
//!     ┌──────────┐  publish   ┌──────────────┐  decode   ┌───────────┐
//!     │  broker  │ ─────────> │ MqttSession  │ ────────> │ SensorHub │
//!     └──────────┘            └──────────────┘           └───────────┘
//!                                   ▲
//!                  TransportHandle  │ publish / disconnect
//!
//! relationships:
//!     - uses: decode.rs, hub.rs
//!     - used by: main.rs (supervisor), server.rs (publish)
//!
//! ==============================================================================

use crate::config::BrokerConfig;
use crate::decode::decode;
use crate::domain::{now_ms, SensorId};
use crate::hub::SensorHub;

use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// request queue depth between handles and the event loop
const CHANNEL_CAPACITY: usize = 32;

/// `<root>/<sensor-id>[/...]` -> sensor id, if it is one we know
pub fn sensor_id_from_topic(topic: &str) -> Option<SensorId> {
    topic.split('/').nth(1)?.parse().ok()
}

/// outbound payload; binary is sent as utf-8 text
#[derive(Debug, Clone)]
pub enum OutboundPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundPayload {
    fn into_text(self) -> String {
        match self {
            OutboundPayload::Text(s) => s,
            OutboundPayload::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

impl From<String> for OutboundPayload {
    fn from(s: String) -> Self {
        OutboundPayload::Text(s)
    }
}

impl From<&str> for OutboundPayload {
    fn from(s: &str) -> Self {
        OutboundPayload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for OutboundPayload {
    fn from(b: Vec<u8>) -> Self {
        OutboundPayload::Binary(b)
    }
}

/// cloneable handle for publishing and teardown
#[derive(Clone)]
pub struct TransportHandle {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// no-op while disconnected; failures are logged, never returned
    pub async fn publish(&self, topic: &str, payload: impl Into<OutboundPayload>) {
        if !self.is_connected() {
            debug!("publish to {} skipped: not connected", topic);
            return;
        }
        let body = payload.into().into_text();
        if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, false, body).await {
            warn!("failed to publish to {}: {}", topic, e);
        }
    }

    /// safe to call any number of times
    pub async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect().await {
            debug!("disconnect: {}", e);
        }
    }
}

/// owns the event loop for one connection
pub struct MqttSession {
    eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    topic: String,
    connect_timeout: Duration,
    hub: Arc<SensorHub>,
}

pub fn connect(config: &BrokerConfig, hub: Arc<SensorHub>) -> (TransportHandle, MqttSession) {
    let client_id = format!("{}-{:x}", config.client_id_prefix, rand::thread_rng().gen::<u64>());

    let mut options = MqttOptions::new(client_id, config.url.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(config.clean_session);
    if config.url.starts_with("wss://") {
        options.set_transport(Transport::wss_with_default_config());
    } else {
        options.set_transport(Transport::Ws);
    }

    let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
    let connected = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));

    let handle = TransportHandle {
        client: client.clone(),
        connected: connected.clone(),
        closed: closed.clone(),
    };
    let session = MqttSession {
        eventloop,
        client,
        connected,
        closed,
        topic: config.topic.clone(),
        connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
        hub,
    };
    (handle, session)
}

impl MqttSession {
    /// drive the connection until it is lost or closed
    pub async fn run(mut self) {
        loop {
            let event = if self.connected.load(Ordering::SeqCst) {
                self.eventloop.poll().await
            } else {
                match tokio::time::timeout(self.connect_timeout, self.eventloop.poll()).await {
                    Ok(event) => event,
                    Err(_) => {
                        warn!("broker connect timed out after {:?}", self.connect_timeout);
                        break;
                    }
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!("connected to broker, subscribing to {}", self.topic);
                    if let Err(e) = self.client.try_subscribe(self.topic.clone(), QoS::AtMostOnce) {
                        warn!("subscribe to {} failed: {}", self.topic, e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    handle_message(&self.hub, &msg.topic, &msg.payload).await;
                }
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                    debug!("disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if !self.closed.load(Ordering::SeqCst) {
                        warn!("broker connection lost: {}", e);
                    }
                    break;
                }
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// route one inbound message; unknown sensors are expected noise on the
/// shared wildcard and are dropped quietly
pub async fn handle_message(hub: &SensorHub, topic: &str, payload: &[u8]) {
    let Some(id) = sensor_id_from_topic(topic) else {
        trace!("ignoring message on {}", topic);
        return;
    };
    let text = String::from_utf8_lossy(payload);
    hub.ingest(id, decode(&text), now_ms()).await;
}
