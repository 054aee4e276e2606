//! Impure I/O operations for the MQTT broker client
//!
//! Owns the `rumqttc` client and a poller task per connection attempt. The
//! poller stops after reporting a failed connect or a lost connection, so
//! reconnection is always decided by the lifecycle rather than by `rumqttc`.
//!
//! Subscribe requests never wait on the `rumqttc` request channel. The caller
//! is the same task that drains broker events, and the poller stops reading
//! the socket while that event channel is full.

use super::connection::configure_mqtt_options;
use super::events::{EventRoute, EventRouter, SubscriptionTracker};
use crate::config::SessionConfig;
use crate::params::{ConnectionParameters, TopicSubscriptionSet};
use crate::transport::{BrokerClient, BrokerError, BrokerEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS, SubscribeFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Time allowed for the poller to flush a Disconnect and stop
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// `rumqttc`-backed [`BrokerClient`]
pub struct MqttBroker {
    session: SessionConfig,
    events_tx: mpsc::Sender<BrokerEvent>,
    client: Option<AsyncClient>,
    poller: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
    connected: Arc<AtomicBool>,
    tracker: Arc<Mutex<SubscriptionTracker>>,
}

impl MqttBroker {
    /// Create the client together with the receiver its notifications arrive on
    pub fn new(session: SessionConfig) -> (Self, mpsc::Receiver<BrokerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(session.channel_capacity);
        let broker = Self {
            session,
            events_tx,
            client: None,
            poller: None,
            stop_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
            tracker: Arc::new(Mutex::new(SubscriptionTracker::default())),
        };
        (broker, events_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Hand one Subscribe packet to the event loop without waiting for capacity
    async fn request_subscriptions(&mut self, filters: Vec<SubscribeFilter>) -> Result<(), BrokerError> {
        let client = self.client.as_ref().ok_or(BrokerError::NotConnected)?;

        let topics = filters.iter().map(|filter| filter.path.clone()).collect();
        self.tracker.lock().await.queue(topics);
        if let Err(e) = client.try_subscribe_many(filters) {
            self.tracker.lock().await.cancel_last();
            return Err(BrokerError::RequestFailed(Box::new(e)));
        }
        Ok(())
    }

    /// Signal the poller to stop and wait for it
    async fn stop_poller(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.join_poller().await;
    }

    /// Wait for the poller to finish on its own, aborting it after the grace period
    async fn join_poller(&mut self) {
        if let Some(mut handle) = self.poller.take() {
            match tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!("MQTT poller stopped"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT poller ended with error: {}", e),
                Err(_) => {
                    warn!("MQTT poller didn't stop in time, aborting");
                    handle.abort();
                }
                _ => {}
            }
        }
        self.stop_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Drive the event loop until the session ends or a stop is requested
    async fn run_poller(
        mut event_loop: EventLoop,
        events_tx: mpsc::Sender<BrokerEvent>,
        mut stop_rx: watch::Receiver<bool>,
        connected: Arc<AtomicBool>,
        tracker: Arc<Mutex<SubscriptionTracker>>,
    ) {
        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    debug!("Stop requested, leaving MQTT event loop");
                    break;
                }
                polled = event_loop.poll() => {
                    let event = match polled {
                        Ok(event) => event,
                        Err(e) => {
                            let notification =
                                EventRouter::route_error(&e, connected.load(Ordering::SeqCst));
                            connected.store(false, Ordering::SeqCst);
                            let _ = events_tx.send(notification).await;
                            break;
                        }
                    };

                    let keep_polling = Self::process_route(
                        EventRouter::route_event(&event),
                        &events_tx,
                        &connected,
                        &tracker,
                    )
                    .await;
                    if !keep_polling {
                        break;
                    }
                }
            }
        }
        trace!("MQTT poller finished");
    }

    /// Act on one routed event; returns false when polling must stop
    async fn process_route(
        route: EventRoute,
        events_tx: &mpsc::Sender<BrokerEvent>,
        connected: &AtomicBool,
        tracker: &Mutex<SubscriptionTracker>,
    ) -> bool {
        let notifications = match route {
            EventRoute::Connected => {
                connected.store(true, Ordering::SeqCst);
                vec![BrokerEvent::ConnectSuccess]
            }
            EventRoute::ConnectRefused(reason) => {
                let _ = events_tx.send(BrokerEvent::ConnectFailure { reason }).await;
                return false;
            }
            EventRoute::Message { topic, payload } => {
                vec![BrokerEvent::MessageArrived { topic, payload }]
            }
            EventRoute::SubscribeSent(packet_id) => {
                tracker.lock().await.sent(packet_id);
                return true;
            }
            EventRoute::SubscribeResult { packet_id, granted } => {
                let topics = tracker.lock().await.acknowledged(packet_id);
                EventRouter::subscription_events(&topics, &granted)
            }
            EventRoute::DeliveryComplete(packet_id) => {
                vec![BrokerEvent::DeliveryComplete { packet_id }]
            }
            EventRoute::DisconnectSent => {
                debug!("Disconnect sent to broker");
                connected.store(false, Ordering::SeqCst);
                return false;
            }
            EventRoute::Ignored => return true,
        };

        // A closed receiver means the session is shutting down; keep polling
        // so a pending Disconnect still reaches the broker
        for notification in notifications {
            if events_tx.send(notification).await.is_err() {
                trace!("Event receiver closed, discarding notification");
                break;
            }
        }
        true
    }
}

#[async_trait]
impl BrokerClient for MqttBroker {
    async fn connect(&mut self, params: &ConnectionParameters) -> Result<(), BrokerError> {
        self.stop_poller().await;
        self.tracker.lock().await.clear();

        info!(server = %params.server_uri(), "Connecting to MQTT broker");
        let options = configure_mqtt_options(params, &self.session);
        let (client, event_loop) = AsyncClient::new(options, self.session.channel_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(Self::run_poller(
            event_loop,
            self.events_tx.clone(),
            stop_rx,
            self.connected.clone(),
            self.tracker.clone(),
        ));

        self.client = Some(client);
        self.stop_tx = Some(stop_tx);
        self.poller = Some(handle);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), BrokerError> {
        self.request_subscriptions(vec![SubscribeFilter::new(topic.to_string(), qos)])
            .await?;
        debug!(topic = %topic, ?qos, "Subscribe requested");
        Ok(())
    }

    async fn subscribe_many(&mut self, subscriptions: &TopicSubscriptionSet) -> Result<(), BrokerError> {
        let filters: Vec<SubscribeFilter> = subscriptions
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.to_string(), qos))
            .collect();
        if filters.is_empty() {
            return Ok(());
        }

        self.request_subscriptions(filters).await?;
        debug!(count = subscriptions.len(), "Subscribe requested");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        let Some(client) = self.client.take() else {
            self.stop_poller().await;
            return Ok(());
        };

        if !self.is_connected() {
            debug!("No established session, stopping connection attempt");
            self.stop_poller().await;
            return Ok(());
        }

        client
            .disconnect()
            .await
            .map_err(|e| BrokerError::DisconnectFailed(Box::new(e)))?;
        self.join_poller().await;

        info!("MQTT client disconnected");
        Ok(())
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}
