//! Connection lifecycle tests
//!
//! Drives the lifecycle against the scripted mock broker with tokio's paused
//! clock, so reconnect delays elapse instantly and deterministically.

use mqttsub::lifecycle::{ConnectionLifecycle, LifecycleError, LifecycleState, RetryPolicy};
use mqttsub::params::topics::resolve_topics;
use mqttsub::params::ConnectionParameters;
use mqttsub::testing::{BrokerCall, ConnectOutcome, MockBroker, MockBrokerHandle, RecordingHandler};
use mqttsub::transport::BrokerEvent;
use rumqttc::QoS;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

type RunResult = (Result<(), LifecycleError>, LifecycleState);

struct Harness {
    broker: MockBrokerHandle,
    handler: RecordingHandler,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<RunResult>,
}

impl Harness {
    fn start(broker: MockBroker, events: tokio::sync::mpsc::Receiver<BrokerEvent>) -> Self {
        Self::start_with_topics(broker, events, &["lab/temp", "lab/humidity"])
    }

    fn start_with_topics(
        broker: MockBroker,
        events: tokio::sync::mpsc::Receiver<BrokerEvent>,
        topics: &[&str],
    ) -> Self {
        let handle = broker.handle();
        let handler = RecordingHandler::new();
        let subscriptions = resolve_topics(
            topics.iter().map(|t| t.to_string()).collect(),
            vec![QoS::AtLeastOnce],
        );
        let mut lifecycle = ConnectionLifecycle::new(
            broker,
            events,
            ConnectionParameters::default(),
            subscriptions,
            Box::new(handler.clone()),
            RetryPolicy::default(),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let result = lifecycle.run(shutdown_rx).await;
            (result, lifecycle.state())
        });

        Self {
            broker: handle,
            handler,
            shutdown,
            task,
        }
    }

    async fn quit(self) -> RunResult {
        let _ = self.shutdown.send(true);
        self.task.await.unwrap()
    }
}

/// Poll `condition` on the paused clock until it holds
async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(600);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_then_subscribe_every_topic() {
    let (broker, events) = MockBroker::new();
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;

    assert_eq!(
        broker.subscriptions(),
        vec![
            ("lab/temp".to_string(), QoS::AtLeastOnce),
            ("lab/humidity".to_string(), QoS::AtLeastOnce),
        ]
    );

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);
    assert_eq!(broker.calls().last(), Some(&BrokerCall::Disconnect));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_sixth_failed_connect() {
    let (broker, events) = MockBroker::new();
    let broker = broker
        .with_connect_outcomes((0..6).map(|i| ConnectOutcome::Refuse(format!("refused {i}"))));
    let handle = broker.handle();
    let harness = Harness::start(broker, events);

    let started = Instant::now();
    let (result, state) = harness.task.await.unwrap();

    assert!(matches!(
        result,
        Err(LifecycleError::RetriesExhausted { attempts: 6 })
    ));
    assert_eq!(state, LifecycleState::Failed);
    assert_eq!(handle.connect_count(), 6);
    assert!(handle.subscriptions().is_empty());
    // Five reconnect delays of 2500 ms each
    assert!(started.elapsed() >= Duration::from_millis(5 * 2500));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_within_retry_budget() {
    let (broker, events) = MockBroker::new();
    let broker = broker.with_connect_outcomes(
        (0..5).map(|_| ConnectOutcome::Refuse("broker down".to_string())),
    );
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;
    assert_eq!(broker.connect_count(), 6);

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_resets_retry_budget() {
    let (broker, events) = MockBroker::new();
    let mut script: Vec<ConnectOutcome> = (0..3)
        .map(|_| ConnectOutcome::Refuse("warming up".to_string()))
        .collect();
    script.push(ConnectOutcome::Accept);
    script.extend((0..5).map(|_| ConnectOutcome::Refuse("restarting".to_string())));
    let broker = broker.with_connect_outcomes(script);
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;
    assert_eq!(broker.connect_count(), 4);

    broker
        .inject(BrokerEvent::ConnectionLost {
            cause: "keep-alive timeout".to_string(),
        })
        .await;

    // Five more failures fit the fresh budget; the sixth attempt succeeds
    wait_until(|| broker.subscriptions().len() == 4).await;
    assert_eq!(broker.connect_count(), 10);

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_waits_for_delay() {
    let (broker, events) = MockBroker::new();
    let broker = broker.with_connect_outcomes([ConnectOutcome::Refuse("down".to_string())]);
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.connect_count() == 1).await;
    sleep(Duration::from_millis(2000)).await;
    assert_eq!(broker.connect_count(), 1);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(broker.connect_count(), 2);

    let (result, _) = harness.quit().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    let (broker, events) = MockBroker::new();
    let broker = broker.with_connect_outcomes([ConnectOutcome::Refuse("down".to_string())]);
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.connect_count() == 1).await;
    sleep(Duration::from_millis(100)).await;

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(broker.connect_count(), 1);
    assert_eq!(broker.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_messages_forwarded_to_handler() {
    let (broker, events) = MockBroker::new();
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();
    let handler = harness.handler.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;

    broker
        .inject(BrokerEvent::MessageArrived {
            topic: "lab/temp".to_string(),
            payload: "21.5".into(),
        })
        .await;
    broker
        .inject(BrokerEvent::DeliveryComplete { packet_id: 4 })
        .await;
    broker
        .inject(BrokerEvent::MessageArrived {
            topic: "lab/humidity".to_string(),
            payload: "40".into(),
        })
        .await;

    wait_until(|| handler.messages().len() == 2).await;
    assert_eq!(
        handler.messages(),
        vec![
            ("lab/temp".to_string(), b"21.5".to_vec()),
            ("lab/humidity".to_string(), b"40".to_vec()),
        ]
    );

    let (result, _) = harness.quit().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_failure_is_reported() {
    let (broker, events) = MockBroker::new();
    let broker = broker.with_disconnect_failure();
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;

    let (result, state) = harness.quit().await;
    assert!(matches!(result, Err(LifecycleError::Disconnect(_))));
    assert_eq!(state, LifecycleState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_keeps_session() {
    let (broker, events) = MockBroker::new();
    let broker = broker.rejecting_topic("lab/humidity");
    let harness = Harness::start(broker, events);
    let broker = harness.broker.clone();
    let handler = harness.handler.clone();

    wait_until(|| broker.subscriptions().len() == 2).await;

    broker
        .inject(BrokerEvent::MessageArrived {
            topic: "lab/temp".to_string(),
            payload: "19".into(),
        })
        .await;
    wait_until(|| handler.messages().len() == 1).await;

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);
    assert_eq!(broker.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_events_are_ignored() {
    let (broker, events) = MockBroker::new();
    let harness = Harness::start_with_topics(broker, events, &["#"]);
    let broker = harness.broker.clone();

    wait_until(|| broker.subscriptions().len() == 1).await;

    broker.inject(BrokerEvent::ConnectSuccess).await;
    broker
        .inject(BrokerEvent::ConnectFailure {
            reason: "late failure".to_string(),
        })
        .await;
    sleep(Duration::from_secs(5)).await;

    assert_eq!(broker.connect_count(), 1);
    assert_eq!(broker.subscriptions().len(), 1);

    let (result, _) = harness.quit().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_set_larger_than_event_channel() {
    // Default capacity is 10 for both the request queue and the event channel
    let (broker, events) = MockBroker::new();
    let topics: Vec<String> = (0..120).map(|i| format!("plant/line{}/sensor{}", i / 10, i)).collect();
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    let harness = Harness::start_with_topics(broker, events, &topic_refs);
    let broker = harness.broker.clone();
    let handler = harness.handler.clone();

    wait_until(|| broker.subscriptions().len() == 120).await;
    assert_eq!(broker.connect_count(), 1);

    // The reactor is back to draining events after the subscribe request
    broker
        .inject(BrokerEvent::MessageArrived {
            topic: "plant/line0/sensor0".to_string(),
            payload: "7".into(),
        })
        .await;
    wait_until(|| handler.messages().len() == 1).await;

    let (result, state) = harness.quit().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Terminated);
    assert_eq!(broker.disconnect_count(), 1);
}
