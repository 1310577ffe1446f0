// ── Broker client ──
//
// Thin wrapper over rumqttc: connection options, last-will, and the
// event-loop pump task that forwards inbound publishes to a channel.
// Connection errors back off and retry; the broker being down must
// never take the bridge down with it.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BusError;

const EVENT_CHANNEL_SIZE: usize = 256;
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

/// An inbound publish, decoded to UTF-8.
#[derive(Debug, Clone)]
pub struct IncomingPublish {
    pub topic: String,
    pub payload: String,
}

/// Handle for publishing and subscribing on the broker.
#[derive(Clone)]
pub struct BusClient {
    client: AsyncClient,
}

impl BusClient {
    /// Connect to the broker.
    ///
    /// Returns the client, a receiver of inbound publishes, and the
    /// pump task handle. The last-will marks the bridge offline if the
    /// process dies without a clean shutdown.
    pub fn connect(
        settings: &BusSettings,
        will_topic: String,
        will_payload: String,
    ) -> (Self, mpsc::Receiver<IncomingPublish>, JoinHandle<()>) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_last_will(LastWill::new(
            will_topic,
            will_payload,
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let handle = tokio::spawn(async move {
            let mut backoff = ERROR_BACKOFF;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        backoff = ERROR_BACKOFF;
                        match String::from_utf8(publish.payload.to_vec()) {
                            Ok(payload) => {
                                let message = IncomingPublish {
                                    topic: publish.topic.clone(),
                                    payload,
                                };
                                if tx.send(message).await.is_err() {
                                    // Receiver gone: bridge shutting down.
                                    break;
                                }
                            }
                            Err(_) => {
                                warn!(topic = %publish.topic, "dropping non-UTF-8 payload");
                            }
                        }
                    }
                    Ok(event) => {
                        backoff = ERROR_BACKOFF;
                        debug!(?event, "bus event");
                    }
                    Err(e) => {
                        warn!(error = %e, backoff_secs = backoff.as_secs(), "bus connection error");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(ERROR_BACKOFF_MAX);
                    }
                }
            }
            debug!("bus pump task ended");
        });

        (Self { client }, rx, handle)
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: &str,
        retain: bool,
    ) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes())
            .await
            .map_err(BusError::from)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), BusError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(BusError::from)
    }

    /// Clean disconnect (flushes the offline will replacement first).
    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.client.disconnect().await.map_err(BusError::from)
    }
}
