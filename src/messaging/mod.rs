//! MQTT intake for device readings.
//!
//! The event loop only receives. Publishes are handled on their own tasks, at
//! most `max_in_flight` at a time; once that many are running the loop waits
//! for one to finish before taking the next message.

pub mod payload;

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    alerts::DispatchResult,
    config::MqttConfig,
    context::AppContext,
    error::{CoreError, ValidationError},
    sensors::BatchReport,
};
pub use payload::{BatchPayload, SensorMessage};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No broker configured.
    Disabled,
    Disconnected,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disabled => "disabled",
            LinkState::Disconnected => "disconnected",
            LinkState::Connected => "connected",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => LinkState::Disconnected,
            2 => LinkState::Connected,
            _ => LinkState::Disabled,
        }
    }
}

/// Broker connection state shared between the subscriber and `/health`.
#[derive(Debug, Clone, Default)]
pub struct MqttLink(Arc<AtomicU8>);

impl MqttLink {
    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, state: LinkState) {
        let v = match state {
            LinkState::Disabled => 0,
            LinkState::Disconnected => 1,
            LinkState::Connected => 2,
        };
        self.0.store(v, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Bounded handling
// ---------------------------------------------------------------------------

/// Caps the number of messages processed at once.
#[derive(Clone)]
struct InFlight {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl InFlight {
    fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self { permits: Arc::new(Semaphore::new(limit)), limit }
    }

    /// Wait for a free slot, then run `task` in the background holding it.
    async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(limit = self.limit, "Message handlers saturated; delaying intake");
                match Arc::clone(&self.permits).acquire_owned().await {
                    Ok(permit) => permit,
                    // The semaphore is never closed.
                    Err(_) => return,
                }
            }
        };
        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
    }
}

// ---------------------------------------------------------------------------
// Handling
// ---------------------------------------------------------------------------

/// What became of one message.
#[derive(Debug)]
pub enum MessageOutcome {
    Processed(BatchReport),
    Alerted(DispatchResult),
    Rejected(ValidationError),
    Failed(CoreError),
}

/// Decode and process one payload received on `topic`.
pub async fn handle_message(ctx: &AppContext, topic: &str, bytes: &[u8]) -> MessageOutcome {
    let message = match SensorMessage::parse(bytes) {
        Ok(m) => m,
        Err(e) => {
            warn!(topic = %topic, bytes = bytes.len(), error = %e, "Rejected sensor payload");
            ctx.archive.save(topic, bytes).await;
            return MessageOutcome::Rejected(e);
        }
    };

    match message {
        SensorMessage::Batch(batch) => {
            if !batch.rejected.is_empty() {
                warn!(topic = %topic, error = %batch.rejected, "Dropped fields from sensor payload");
            }
            let report = ctx
                .sensors
                .process_batch(&batch.items, batch.timestamp, ctx.fallback.as_ref())
                .await;
            MessageOutcome::Processed(report)
        }
        SensorMessage::Alert(alert) => {
            debug!(
                topic = %topic,
                sensor_type = %alert.sensor_type,
                severity = %alert.severity,
                "Pre-classified alert received"
            );
            match ctx.sensors.process_alert(alert, ctx.fallback.as_ref()).await {
                Ok(result) => MessageOutcome::Alerted(result),
                Err(e) => {
                    error!(topic = %topic, error = %e, "Failed to record device alert");
                    MessageOutcome::Failed(e)
                }
            }
        }
    }
}

fn options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(KEEP_ALIVE);
    if let Some(user) = &config.username {
        opts.set_credentials(user, config.password.as_deref().unwrap_or_default());
    }
    opts
}

/// Run the subscriber until the process exits. Connection errors are logged
/// and retried after a pause; the subscription is renewed on every connect.
pub async fn run(ctx: AppContext, config: MqttConfig) {
    let (client, mut eventloop) = AsyncClient::new(options(&config), CHANNEL_CAPACITY);
    let in_flight = InFlight::new(config.max_in_flight);
    ctx.mqtt.set(LinkState::Disconnected);
    info!(
        host = %config.host,
        port = config.port,
        topic = %config.topic,
        max_in_flight = in_flight.limit,
        "MQTT subscriber started"
    );

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                ctx.mqtt.set(LinkState::Connected);
                info!(topic = %config.topic, "Connected to MQTT broker; subscribing");
                if let Err(e) = client.try_subscribe(&config.topic, QoS::AtLeastOnce) {
                    error!(topic = %config.topic, error = %e, "Failed to subscribe");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let ctx = ctx.clone();
                in_flight
                    .spawn(async move {
                        handle_message(&ctx, &publish.topic, &publish.payload).await;
                    })
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                ctx.mqtt.set(LinkState::Disconnected);
                error!(
                    error = %e,
                    retry_in_secs = RECONNECT_DELAY.as_secs(),
                    "MQTT connection error"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
