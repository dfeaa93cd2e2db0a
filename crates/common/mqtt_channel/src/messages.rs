use crate::topics::Topic;
use rumqttc::Publish;

/// A message received from MQTT
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Payload,
}

/// A message payload
pub type Payload = Vec<u8>;

impl Message {
    pub fn new<B>(topic: &Topic, payload: B) -> Message
    where
        B: Into<Payload>,
    {
        Message {
            topic: topic.clone(),
            payload: payload.into(),
        }
    }

    /// The bytes of the payload (except any trailing null char)
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload
            .strip_suffix(&[0])
            .unwrap_or(self.payload.as_slice())
    }
}

impl From<Publish> for Message {
    fn from(msg: Publish) -> Self {
        Message {
            topic: Topic::new_unchecked(&msg.topic),
            payload: msg.payload.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    fn device_topic() -> Topic {
        Topic::new_unchecked("hass.agent/devices/laptop")
    }

    #[test]
    fn a_trailing_null_char_is_not_part_of_the_payload() {
        let message = Message::new(&device_topic(), &b"{\"apis\":{}}\0"[..]);

        assert_eq!(message.payload_bytes(), b"{\"apis\":{}}");
    }

    #[test]
    fn only_the_last_null_char_is_removed() {
        let message = Message::new(&device_topic(), &b"123\0\0"[..]);

        assert_eq!(message.payload_bytes(), b"123\0");
    }

    #[test]
    fn empty_payloads_are_accepted() {
        let message = Message::new(&device_topic(), &b""[..]);

        assert_eq!(message.payload_bytes(), b"");
    }

    #[test]
    fn received_publish_packets_are_converted_into_messages() {
        let publish = Publish::new("hass.agent/devices/laptop", QoS::AtMostOnce, "{}");
        let message: Message = publish.into();

        assert_eq!(message, Message::new(&device_topic(), "{}"));
    }
}
