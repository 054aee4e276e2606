//! Mock implementations for testing
//!
//! Provides a scripted [`BrokerClient`] and a recording [`MessageHandler`] so
//! the connection lifecycle can be exercised without a running broker.
//!
//! The mock keeps the flow control of the real client: requests go through a
//! bounded queue and fail when it is full, and a separate task delivers the
//! replies on a bounded event channel, waiting whenever the reader falls
//! behind. Nothing is dropped.

use crate::config::SessionConfig;
use crate::handlers::{HandlerError, MessageHandler};
use crate::params::{ConnectionParameters, TopicSubscriptionSet};
use crate::transport::{BrokerClient, BrokerError, BrokerEvent};
use async_trait::async_trait;
use rumqttc::QoS;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted reply to a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Broker accepts the connection
    Accept,
    /// Broker refuses the connection
    Refuse(String),
    /// The request itself cannot be issued
    RequestError,
    /// No reply at all; the attempt stays pending
    Silent,
}

/// Request recorded by [`MockBroker`]
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Connect(ConnectionParameters),
    Subscribe { topic: String, qos: QoS },
    Disconnect,
}

/// Mock broker client for testing
///
/// Connect requests consume scripted outcomes in order and accept once the
/// script runs out. Subscriptions are granted unless the topic was marked as
/// rejected.
///
/// Must be created inside a tokio runtime.
pub struct MockBroker {
    script: VecDeque<ConnectOutcome>,
    rejected_topics: HashSet<String>,
    disconnect_fails: bool,
    requests_tx: mpsc::Sender<Vec<BrokerEvent>>,
    events_tx: mpsc::Sender<BrokerEvent>,
    calls: Arc<Mutex<Vec<BrokerCall>>>,
}

impl MockBroker {
    /// Mock with the default session channel capacity
    pub fn new() -> (Self, mpsc::Receiver<BrokerEvent>) {
        Self::with_capacity(SessionConfig::default().channel_capacity)
    }

    /// Mock whose request queue and event channel both hold `capacity` entries
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<BrokerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (requests_tx, requests_rx) = mpsc::channel(capacity);
        tokio::spawn(Self::deliver_replies(requests_rx, events_tx.clone()));

        let broker = Self {
            script: VecDeque::new(),
            rejected_topics: HashSet::new(),
            disconnect_fails: false,
            requests_tx,
            events_tx,
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        (broker, events_rx)
    }

    /// Forward the replies of each request in order, waiting on a full channel
    async fn deliver_replies(
        mut requests_rx: mpsc::Receiver<Vec<BrokerEvent>>,
        events_tx: mpsc::Sender<BrokerEvent>,
    ) {
        while let Some(replies) = requests_rx.recv().await {
            for reply in replies {
                if events_tx.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }

    pub fn with_connect_outcomes(mut self, outcomes: impl IntoIterator<Item = ConnectOutcome>) -> Self {
        self.script.extend(outcomes);
        self
    }

    pub fn rejecting_topic(mut self, topic: &str) -> Self {
        self.rejected_topics.insert(topic.to_string());
        self
    }

    pub fn with_disconnect_failure(mut self) -> Self {
        self.disconnect_fails = true;
        self
    }

    /// Shared view of this broker that stays usable after the broker is moved
    pub fn handle(&self) -> MockBrokerHandle {
        MockBrokerHandle {
            events_tx: self.events_tx.clone(),
            calls: self.calls.clone(),
        }
    }

    fn record(&self, call: BrokerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Queue the replies to one request; a full queue fails the request
    fn reply(&self, replies: Vec<BrokerEvent>) -> Result<(), BrokerError> {
        self.requests_tx
            .try_send(replies)
            .map_err(|e| BrokerError::RequestFailed(e.to_string().into()))
    }

    fn subscription_reply(&self, topic: &str) -> BrokerEvent {
        let topic_name = Some(topic.to_string());
        if self.rejected_topics.contains(topic) {
            BrokerEvent::SubscribeFailure {
                topic: topic_name,
                reason: "mock rejection".to_string(),
            }
        } else {
            BrokerEvent::SubscribeSuccess { topic: topic_name }
        }
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn connect(&mut self, params: &ConnectionParameters) -> Result<(), BrokerError> {
        self.record(BrokerCall::Connect(params.clone()));

        match self.script.pop_front().unwrap_or(ConnectOutcome::Accept) {
            ConnectOutcome::Accept => self.reply(vec![BrokerEvent::ConnectSuccess]),
            ConnectOutcome::Refuse(reason) => {
                self.reply(vec![BrokerEvent::ConnectFailure { reason }])
            }
            ConnectOutcome::RequestError => {
                Err(BrokerError::RequestFailed("mock connect request error".into()))
            }
            ConnectOutcome::Silent => Ok(()),
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), BrokerError> {
        self.record(BrokerCall::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        self.reply(vec![self.subscription_reply(topic)])
    }

    async fn subscribe_many(&mut self, subscriptions: &TopicSubscriptionSet) -> Result<(), BrokerError> {
        let mut replies = Vec::with_capacity(subscriptions.len());
        for (topic, qos) in subscriptions.iter() {
            self.record(BrokerCall::Subscribe {
                topic: topic.to_string(),
                qos,
            });
            replies.push(self.subscription_reply(topic));
        }
        self.reply(replies)
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Disconnect);

        if self.disconnect_fails {
            return Err(BrokerError::DisconnectFailed("mock disconnect error".into()));
        }
        Ok(())
    }
}

/// Test-side handle to a [`MockBroker`]: recorded calls and event injection
#[derive(Clone)]
pub struct MockBrokerHandle {
    events_tx: mpsc::Sender<BrokerEvent>,
    calls: Arc<Mutex<Vec<BrokerCall>>>,
}

impl MockBrokerHandle {
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BrokerCall::Connect(_)))
            .count()
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Subscribe { topic, qos } => Some((topic, qos)),
                _ => None,
            })
            .collect()
    }

    pub fn disconnect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BrokerCall::Disconnect))
            .count()
    }

    /// Deliver an unsolicited notification, as the broker would
    pub async fn inject(&self, event: BrokerEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

/// Handler that records every delivered message
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    messages: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((topic.to_string(), payload.to_vec()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::topics::resolve_topics;

    #[tokio::test]
    async fn test_mock_broker_follows_script() {
        let (broker, mut events) = MockBroker::new();
        let mut broker = broker.with_connect_outcomes([
            ConnectOutcome::Refuse("down".to_string()),
            ConnectOutcome::Accept,
        ]);
        let handle = broker.handle();
        let params = ConnectionParameters::default();

        broker.connect(&params).await.unwrap();
        broker.connect(&params).await.unwrap();
        broker.connect(&params).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(BrokerEvent::ConnectFailure {
                reason: "down".to_string()
            })
        );
        assert_eq!(events.recv().await, Some(BrokerEvent::ConnectSuccess));
        assert_eq!(events.recv().await, Some(BrokerEvent::ConnectSuccess));
        assert_eq!(handle.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_broker_subscriptions_and_disconnect() {
        let (broker, mut events) = MockBroker::new();
        let mut broker = broker.rejecting_topic("bad").with_disconnect_failure();
        let handle = broker.handle();

        let subscriptions = resolve_topics(
            vec!["good".to_string(), "bad".to_string()],
            vec![QoS::AtMostOnce],
        );
        broker.subscribe_many(&subscriptions).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(BrokerEvent::SubscribeSuccess {
                topic: Some("good".to_string())
            })
        );
        assert!(matches!(
            events.recv().await,
            Some(BrokerEvent::SubscribeFailure { topic: Some(t), .. }) if t == "bad"
        ));
        assert!(broker.disconnect().await.is_err());
        assert_eq!(handle.subscriptions().len(), 2);
        assert_eq!(handle.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_broker_applies_backpressure_without_dropping() {
        let (mut broker, mut events) = MockBroker::with_capacity(2);
        let topics: Vec<String> = (0..25).map(|i| format!("bulk/{i}")).collect();
        let subscriptions = resolve_topics(topics.clone(), vec![QoS::AtMostOnce]);

        // One request for the whole set fits a two-slot queue
        broker.subscribe_many(&subscriptions).await.unwrap();

        for topic in &topics {
            assert_eq!(
                events.recv().await,
                Some(BrokerEvent::SubscribeSuccess {
                    topic: Some(topic.clone())
                })
            );
        }
    }

    #[tokio::test]
    async fn test_mock_broker_fails_requests_when_queue_is_full() {
        let (mut broker, _events) = MockBroker::with_capacity(1);

        // Fill the event channel and the request queue while nobody reads
        let mut results = Vec::new();
        for i in 0..4 {
            results.push(broker.subscribe(&format!("t/{i}"), QoS::AtMostOnce).await);
            tokio::task::yield_now().await;
        }

        assert!(results.iter().any(|result| result.is_err()));
        assert!(matches!(
            results.last(),
            Some(Err(BrokerError::RequestFailed(_)))
        ));
    }

    #[test]
    fn test_recording_handler() {
        let mut handler = RecordingHandler::new();
        let view = handler.clone();

        handler.handle("a/b", b"payload").unwrap();

        assert_eq!(view.messages(), vec![("a/b".to_string(), b"payload".to_vec())]);
    }
}
