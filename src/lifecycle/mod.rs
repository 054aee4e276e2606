//! Connection lifecycle management
//!
//! [`ConnectionLifecycle`] is a single-task reactor that owns the broker
//! session. It reacts to one input at a time, in priority order:
//!
//! 1. the shutdown signal
//! 2. the deferred reconnect deadline, if one is scheduled
//! 3. notifications from the broker client
//!
//! The reconnect delay is a deadline rather than a blocking pause, so a
//! shutdown arriving while a reconnect is pending cancels it.

pub mod state;

pub use state::{LifecycleState, RetryDecision, RetryPolicy, SessionState};

use crate::handlers::MessageHandler;
use crate::lifecycle_span;
use crate::params::topics::qos_level;
use crate::params::{ConnectionParameters, TopicSubscriptionSet};
use crate::transport::{BrokerClient, BrokerError, BrokerEvent};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Fatal lifecycle errors; each one ends the process with a failure status
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Giving up after {attempts} failed connection attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Connect request failed: {0}")]
    ConnectRequest(#[source] BrokerError),

    #[error("Disconnect failed: {0}")]
    Disconnect(#[source] BrokerError),

    #[error("Broker event stream closed unexpectedly")]
    EventStreamClosed,
}

/// Drives a [`BrokerClient`] through connect, subscribe, reconnect and shutdown
pub struct ConnectionLifecycle<B: BrokerClient> {
    broker: B,
    events: mpsc::Receiver<BrokerEvent>,
    connection: ConnectionParameters,
    subscriptions: TopicSubscriptionSet,
    handler: Box<dyn MessageHandler>,
    policy: RetryPolicy,
    session: SessionState,
    reconnect_at: Option<Instant>,
}

impl<B: BrokerClient> ConnectionLifecycle<B> {
    pub fn new(
        broker: B,
        events: mpsc::Receiver<BrokerEvent>,
        connection: ConnectionParameters,
        subscriptions: TopicSubscriptionSet,
        handler: Box<dyn MessageHandler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            events,
            connection,
            subscriptions,
            handler,
            policy,
            session: SessionState::new(),
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn retry_count(&self) -> u32 {
        self.session.retry_count()
    }

    /// Run the session until shutdown or a fatal error.
    ///
    /// Returns `Ok(())` after a clean shutdown. The shutdown signal is a
    /// `true` on the watch channel; a dropped sender counts as shutdown too.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), LifecycleError> {
        let span = lifecycle_span!(
            server = %self.connection.server_uri(),
            topics = self.subscriptions.len()
        );
        self.drive(shutdown).instrument(span).await
    }

    async fn drive(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), LifecycleError> {
        self.start_connect().await?;

        loop {
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return self.shut_down().await;
                    }
                }

                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.start_connect().await?;
                }

                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await?,
                        None => {
                            self.session.fail();
                            return Err(LifecycleError::EventStreamClosed);
                        }
                    }
                }
            }
        }
    }

    async fn start_connect(&mut self) -> Result<(), LifecycleError> {
        self.session.begin_connecting();
        info!(
            server = %self.connection.server_uri(),
            retry = self.session.retry_count(),
            "Connecting to broker"
        );

        if let Err(e) = self.broker.connect(&self.connection).await {
            error!("Connect request could not be issued: {}", e);
            self.session.fail();
            return Err(LifecycleError::ConnectRequest(e));
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: BrokerEvent) -> Result<(), LifecycleError> {
        let state = self.session.state();

        match event {
            BrokerEvent::ConnectSuccess => {
                if self.session.on_connect_success() {
                    info!("Connection success");
                    self.subscribe_all().await;
                } else {
                    debug!(%state, "Ignoring stale connect success");
                }
            }
            BrokerEvent::ConnectFailure { reason } => {
                match self.session.on_connect_failure(&self.policy) {
                    Some(RetryDecision::Retry { attempt, delay }) => {
                        warn!(attempt, max = self.policy.max_attempts, "Connection attempt failed: {}", reason);
                        self.schedule_reconnect(delay);
                    }
                    Some(RetryDecision::GiveUp { attempts }) => {
                        error!(attempts, "Connection attempt failed: {}", reason);
                        return Err(LifecycleError::RetriesExhausted { attempts });
                    }
                    None => debug!(%state, "Ignoring stale connect failure: {}", reason),
                }
            }
            BrokerEvent::ConnectionLost { cause } => {
                match self.session.on_connection_lost(&self.policy) {
                    Some(RetryDecision::Retry { delay, .. }) => {
                        warn!("Connection lost: {}", cause);
                        info!("Reconnecting...");
                        self.schedule_reconnect(delay);
                    }
                    Some(RetryDecision::GiveUp { .. }) | None => {
                        debug!(%state, "Ignoring connection loss: {}", cause);
                    }
                }
            }
            BrokerEvent::SubscribeSuccess { topic } => {
                if self.session.on_subscribe_success() {
                    info!(topic = topic.as_deref().unwrap_or("<unknown>"), "Subscription success");
                } else {
                    debug!(%state, "Ignoring stale subscription success");
                }
            }
            BrokerEvent::SubscribeFailure { topic, reason } => {
                // No recovery policy: the session stays up without this topic
                warn!(
                    topic = topic.as_deref().unwrap_or("<unknown>"),
                    "Subscription failure: {}", reason
                );
            }
            BrokerEvent::MessageArrived { topic, payload } => {
                self.deliver(&topic, &payload);
            }
            BrokerEvent::DeliveryComplete { packet_id } => {
                debug!(packet_id, "Delivery complete");
            }
        }
        Ok(())
    }

    /// Request the whole subscription set at once, then return to the event
    /// loop; the per-topic outcomes arrive as events
    async fn subscribe_all(&mut self) {
        self.session.begin_subscribing();

        for (topic, qos) in self.subscriptions.iter() {
            info!(topic, qos = qos_level(qos), "Subscribing");
        }
        if let Err(e) = self.broker.subscribe_many(&self.subscriptions).await {
            warn!(topics = self.subscriptions.len(), "Subscribe request failed: {}", e);
        }
    }

    fn deliver(&mut self, topic: &str, payload: &Bytes) {
        if let Err(e) = self.handler.handle(topic, payload) {
            warn!(topic, "Message handler failed: {}", e);
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn shut_down(&mut self) -> Result<(), LifecycleError> {
        let had_session = self.session.state().is_connected();
        if self.reconnect_at.take().is_some() {
            debug!("Pending reconnect cancelled");
        }

        info!("Disconnecting");
        self.session.begin_disconnecting();
        // Nothing is read past this point; closing unblocks a client waiting
        // to hand over a notification
        self.events.close();

        match self.broker.disconnect().await {
            Ok(()) => {
                self.session.terminate();
                info!("Disconnected");
                Ok(())
            }
            Err(e) if had_session => {
                error!("Disconnect failed: {}", e);
                self.session.fail();
                Err(LifecycleError::Disconnect(e))
            }
            Err(e) => {
                warn!("Stopping pending connection attempt failed: {}", e);
                self.session.terminate();
                Ok(())
            }
        }
    }
}
