//! Pure routing of `rumqttc` events into broker notifications
//!
//! The poller feeds every event loop result through [`EventRouter`] and acts
//! on the returned [`EventRoute`]. Subscription acknowledgements only carry a
//! packet id and one return code per filter, so [`SubscriptionTracker`] maps
//! them back to the topic names of the request.

use crate::transport::BrokerEvent;
use bytes::Bytes;
use rumqttc::{ConnectReturnCode, ConnectionError, Event, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::collections::{HashMap, VecDeque};

/// Routing decision for one event loop event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck accepted
    Connected,
    /// ConnAck refused by the broker
    ConnectRefused(String),
    /// Publish received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Outgoing Subscribe written with this packet id
    SubscribeSent(u16),
    /// SubAck with one entry per requested filter; `None` means refused
    SubscribeResult {
        packet_id: u16,
        granted: Vec<Option<QoS>>,
    },
    /// PubAck/PubComp for an outgoing publish
    DeliveryComplete(u16),
    /// Outgoing Disconnect written; the session is over
    DisconnectSent,
    /// Ping traffic and other protocol housekeeping
    Ignored,
}

pub struct EventRouter;

impl EventRouter {
    /// Route an event loop event (pure function)
    pub fn route_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(packet) => match packet {
                Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                    EventRoute::Connected
                }
                Packet::ConnAck(ack) => {
                    EventRoute::ConnectRefused(format!("Connection refused: {:?}", ack.code))
                }
                Packet::Publish(publish) => EventRoute::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                },
                Packet::SubAck(ack) => EventRoute::SubscribeResult {
                    packet_id: ack.pkid,
                    granted: ack
                        .return_codes
                        .iter()
                        .map(|code| match code {
                            SubscribeReasonCode::Success(qos) => Some(*qos),
                            SubscribeReasonCode::Failure => None,
                        })
                        .collect(),
                },
                Packet::PubAck(ack) => EventRoute::DeliveryComplete(ack.pkid),
                Packet::PubComp(comp) => EventRoute::DeliveryComplete(comp.pkid),
                _ => EventRoute::Ignored,
            },
            Event::Outgoing(Outgoing::Subscribe(pkid)) => EventRoute::SubscribeSent(*pkid),
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::Ignored,
        }
    }

    /// Classify an event loop error: before ConnAck it is a failed connect,
    /// afterwards a lost connection (pure function)
    pub fn route_error(error: &ConnectionError, connected: bool) -> BrokerEvent {
        if connected {
            BrokerEvent::ConnectionLost {
                cause: error.to_string(),
            }
        } else {
            BrokerEvent::ConnectFailure {
                reason: error.to_string(),
            }
        }
    }

    /// Expand a SubAck into per-topic notifications (pure function).
    ///
    /// Return codes follow the filter order of the Subscribe packet, so the
    /// code at index `i` belongs to `topics[i]`.
    pub fn subscription_events(topics: &[String], granted: &[Option<QoS>]) -> Vec<BrokerEvent> {
        granted
            .iter()
            .enumerate()
            .map(|(index, grant)| {
                let topic = topics.get(index).cloned();
                match grant {
                    Some(_) => BrokerEvent::SubscribeSuccess { topic },
                    None => BrokerEvent::SubscribeFailure {
                        topic,
                        reason: "Broker rejected subscription".to_string(),
                    },
                }
            })
            .collect()
    }
}

/// Maps Subscribe packet ids back to the topics they requested
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    queued: VecDeque<Vec<String>>,
    in_flight: HashMap<u16, Vec<String>>,
}

impl SubscriptionTracker {
    /// Record a subscribe request, with its filters in packet order
    pub fn queue(&mut self, topics: Vec<String>) {
        self.queued.push_back(topics);
    }

    /// Drop the most recent request after it failed to reach the event loop
    pub fn cancel_last(&mut self) {
        self.queued.pop_back();
    }

    /// Bind the oldest queued request to the packet id it went out with
    pub fn sent(&mut self, packet_id: u16) {
        if let Some(topics) = self.queued.pop_front() {
            self.in_flight.insert(packet_id, topics);
        }
    }

    /// Resolve and forget the topics acknowledged by `packet_id`; empty when unknown
    pub fn acknowledged(&mut self, packet_id: u16) -> Vec<String> {
        self.in_flight.remove(&packet_id).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.queued.clear();
        self.in_flight.clear();
    }
}
