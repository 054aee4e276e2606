//! Topic specification resolution
//!
//! Turns the mutually exclusive topic inputs (explicit topics, device with
//! optional sensors, bare sensors, or nothing) into a [`TopicSubscriptionSet`]
//! whose topic and QoS sequences always have the same length.
//!
//! Shape precedence is topics > device > sensors > default. Resolution never
//! fails; malformed values are rejected by the aggregator beforehand.

use rumqttc::QoS;
use tracing::{debug, warn};

/// Multi-level wildcard matching every remaining topic level
pub const WILDCARD: &str = "#";

/// Topic level delimiter
pub const TOPIC_DELIMITER: char = '/';

/// QoS used when none was supplied
pub const DEFAULT_QOS: QoS = QoS::AtLeastOnce;

/// Map a numeric QoS level (0-2) to the broker QoS
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// Numeric level of a broker QoS
pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Resolved subscription list: parallel topic and QoS sequences
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSubscriptionSet {
    topics: Vec<String>,
    qos: Vec<QoS>,
}

impl TopicSubscriptionSet {
    fn single(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topics: vec![topic.into()],
            qos: vec![qos],
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn qos(&self) -> &[QoS] {
        &self.qos
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Iterate `(topic, qos)` pairs in subscription order
    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> + '_ {
        self.topics
            .iter()
            .map(String::as_str)
            .zip(self.qos.iter().copied())
    }
}

/// `device/sensor` view of a topic; only the first two levels are considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath {
    pub device: String,
    pub sensor: String,
}

impl TopicPath {
    pub fn parse(topic: &str) -> Self {
        let mut levels = topic.split(TOPIC_DELIMITER);
        let device = levels.next().unwrap_or_default().to_string();
        let sensor = levels.next().unwrap_or(WILDCARD).to_string();
        Self { device, sensor }
    }
}

/// Raw topic inputs ahead of resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicRequest {
    pub topics: Option<Vec<String>>,
    pub device: Option<String>,
    pub sensors: Option<Vec<String>>,
    pub qos: Vec<QoS>,
}

/// Which input shape drives resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicShape {
    Topics,
    Device,
    Sensors,
    Everything,
}

impl TopicRequest {
    pub fn shape(&self) -> TopicShape {
        if self.topics.as_ref().is_some_and(|t| !t.is_empty()) {
            TopicShape::Topics
        } else if self.device.is_some() {
            TopicShape::Device
        } else if self.sensors.as_ref().is_some_and(|s| !s.is_empty()) {
            TopicShape::Sensors
        } else {
            TopicShape::Everything
        }
    }
}

/// Pad (or trim) QoS values to `count`, repeating the last supplied value
/// or [`DEFAULT_QOS`] when none were given
pub fn pad_qos(mut supplied: Vec<QoS>, count: usize) -> Vec<QoS> {
    if supplied.len() > count {
        warn!(
            supplied = supplied.len(),
            topics = count,
            "More QoS values than topics, ignoring the extra values"
        );
    }
    let fill = supplied.last().copied().unwrap_or(DEFAULT_QOS);
    supplied.resize(count, fill);
    supplied
}

/// Resolve a [`TopicRequest`] into its subscription set
pub fn resolve(request: TopicRequest) -> TopicSubscriptionSet {
    let shape = request.shape();
    debug!(?shape, "Resolving topic inputs");

    let TopicRequest {
        topics,
        device,
        sensors,
        qos,
    } = request;

    match shape {
        TopicShape::Topics => resolve_topics(topics.unwrap_or_default(), qos),
        TopicShape::Device => {
            resolve_device(&device.unwrap_or_default(), sensors.unwrap_or_default(), qos)
        }
        TopicShape::Sensors => resolve_sensors(sensors.unwrap_or_default(), qos),
        TopicShape::Everything => {
            if !qos.is_empty() {
                debug!("QoS values ignored without topic inputs");
            }
            TopicSubscriptionSet::single(WILDCARD, DEFAULT_QOS)
        }
    }
}

/// Explicit topic list; a bare `#` anywhere replaces the whole list
pub fn resolve_topics(topics: Vec<String>, qos: Vec<QoS>) -> TopicSubscriptionSet {
    let qos = pad_qos(qos, topics.len());

    for (index, topic) in topics.iter().enumerate() {
        if topic == WILDCARD {
            debug!(position = index, "Wildcard topic supplied, ignoring the rest");
            return TopicSubscriptionSet::single(WILDCARD, qos[index]);
        }
        let path = TopicPath::parse(topic);
        debug!(topic = %topic, device = %path.device, sensor = %path.sensor, "Parsed topic");
    }

    TopicSubscriptionSet { topics, qos }
}

/// One topic per sensor of `device`, or `device/#` when no sensors were given
pub fn resolve_device(device: &str, sensors: Vec<String>, qos: Vec<QoS>) -> TopicSubscriptionSet {
    if sensors.is_empty() {
        let qos = qos.first().copied().unwrap_or(DEFAULT_QOS);
        return TopicSubscriptionSet::single(format!("{device}{TOPIC_DELIMITER}{WILDCARD}"), qos);
    }

    let topics: Vec<String> = sensors
        .iter()
        .map(|sensor| format!("{device}{TOPIC_DELIMITER}{sensor}"))
        .collect();
    let qos = pad_qos(qos, topics.len());
    TopicSubscriptionSet { topics, qos }
}

/// Bare sensor names used as topics, with no device prefix
pub fn resolve_sensors(sensors: Vec<String>, qos: Vec<QoS>) -> TopicSubscriptionSet {
    let qos = pad_qos(qos, sensors.len());
    TopicSubscriptionSet {
        topics: sensors,
        qos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_qos_level_mapping() {
        assert_eq!(qos_from_level(0), Some(QoS::AtMostOnce));
        assert_eq!(qos_from_level(1), Some(QoS::AtLeastOnce));
        assert_eq!(qos_from_level(2), Some(QoS::ExactlyOnce));
        assert_eq!(qos_from_level(3), None);
        assert_eq!(qos_level(QoS::ExactlyOnce), 2);
    }

    #[test]
    fn test_pad_qos_repeats_last_value() {
        let padded = pad_qos(vec![QoS::AtMostOnce, QoS::ExactlyOnce], 4);
        assert_eq!(
            padded,
            vec![
                QoS::AtMostOnce,
                QoS::ExactlyOnce,
                QoS::ExactlyOnce,
                QoS::ExactlyOnce
            ]
        );
    }

    #[test]
    fn test_pad_qos_defaults_when_empty() {
        assert_eq!(pad_qos(vec![], 2), vec![QoS::AtLeastOnce, QoS::AtLeastOnce]);
    }

    #[test]
    fn test_pad_qos_trims_extra_values() {
        assert_eq!(
            pad_qos(vec![QoS::AtMostOnce, QoS::ExactlyOnce], 1),
            vec![QoS::AtMostOnce]
        );
    }

    #[test]
    fn test_topic_path_parse() {
        assert_eq!(
            TopicPath::parse("dev/temp"),
            TopicPath {
                device: "dev".into(),
                sensor: "temp".into()
            }
        );
        assert_eq!(TopicPath::parse("dev").sensor, "#");
        assert_eq!(TopicPath::parse("dev/temp/extra").sensor, "temp");
    }

    #[test]
    fn test_shape_precedence() {
        let request = TopicRequest {
            topics: Some(strings(&["a"])),
            device: Some("dev".into()),
            sensors: Some(strings(&["s"])),
            qos: vec![],
        };
        assert_eq!(request.shape(), TopicShape::Topics);

        let request = TopicRequest {
            topics: None,
            ..request
        };
        assert_eq!(request.shape(), TopicShape::Device);

        let request = TopicRequest {
            device: None,
            ..request
        };
        assert_eq!(request.shape(), TopicShape::Sensors);

        assert_eq!(TopicRequest::default().shape(), TopicShape::Everything);
    }

    #[test]
    fn test_explicit_topics_keep_original_strings() {
        let set = resolve_topics(strings(&["dev1/temp", "dev2"]), vec![QoS::ExactlyOnce]);
        assert_eq!(set.topics(), &strings(&["dev1/temp", "dev2"])[..]);
        assert_eq!(set.qos(), &[QoS::ExactlyOnce, QoS::ExactlyOnce]);
    }

    #[test]
    fn test_wildcard_short_circuits_with_aligned_qos() {
        let set = resolve_topics(
            strings(&["a/b", "#", "c"]),
            vec![QoS::AtMostOnce, QoS::ExactlyOnce, QoS::AtLeastOnce],
        );
        assert_eq!(set.topics(), &strings(&["#"])[..]);
        assert_eq!(set.qos(), &[QoS::ExactlyOnce]);
    }

    #[test]
    fn test_wildcard_uses_padded_qos() {
        let set = resolve_topics(strings(&["a", "b", "#"]), vec![QoS::AtMostOnce]);
        assert_eq!(set.topics(), &strings(&["#"])[..]);
        assert_eq!(set.qos(), &[QoS::AtMostOnce]);
    }

    #[test]
    fn test_wildcard_only_matches_whole_topic() {
        let set = resolve_topics(strings(&["#/x", "a"]), vec![]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_device_without_sensors_subscribes_to_all_device_topics() {
        let set = resolve_device("dev", vec![], vec![QoS::ExactlyOnce, QoS::AtMostOnce]);
        assert_eq!(set.topics(), &strings(&["dev/#"])[..]);
        assert_eq!(set.qos(), &[QoS::ExactlyOnce]);

        let set = resolve_device("dev", vec![], vec![]);
        assert_eq!(set.qos(), &[QoS::AtLeastOnce]);
    }

    #[test]
    fn test_device_with_sensors() {
        let set = resolve_device("device", strings(&["temp", "humidity"]), vec![QoS::ExactlyOnce]);
        assert_eq!(set.topics(), &strings(&["device/temp", "device/humidity"])[..]);
        assert_eq!(set.qos(), &[QoS::ExactlyOnce, QoS::ExactlyOnce]);
    }

    #[test]
    fn test_sensors_only_have_no_device_prefix() {
        let set = resolve_sensors(strings(&["temp", "light"]), vec![]);
        assert_eq!(set.topics(), &strings(&["temp", "light"])[..]);
        assert_eq!(set.qos(), &[QoS::AtLeastOnce, QoS::AtLeastOnce]);
    }

    #[test]
    fn test_no_input_subscribes_to_everything() {
        let set = resolve(TopicRequest::default());
        assert_eq!(set.topics(), &strings(&["#"])[..]);
        assert_eq!(set.qos(), &[QoS::AtLeastOnce]);
    }

    #[test]
    fn test_no_input_ignores_supplied_qos() {
        let set = resolve(TopicRequest {
            qos: vec![QoS::ExactlyOnce],
            ..Default::default()
        });
        assert_eq!(set.qos(), &[QoS::AtLeastOnce]);
    }

    #[test]
    fn test_iter_pairs_topics_with_qos() {
        let set = resolve_device("d", strings(&["a", "b"]), vec![QoS::AtMostOnce, QoS::ExactlyOnce]);
        let pairs: Vec<(&str, QoS)> = set.iter().collect();
        assert_eq!(pairs, vec![("d/a", QoS::AtMostOnce), ("d/b", QoS::ExactlyOnce)]);
    }
}
