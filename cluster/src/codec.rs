use watchdog_common::{NodeId, Result, Term, WatchdogError};

/// Every datagram is exactly this many bytes; no framing, no length prefix.
pub const MESSAGE_LEN: usize = 4;

/// Wire message kind. Unknown discriminants survive decoding so the
/// election logic can drop them without surfacing an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Vote,
    VoteRequest,
    Heartbeat,
    Unknown(u8),
}

impl MessageKind {
    pub fn from_wire(raw: u8) -> Self {
        match raw {
            0x01 => MessageKind::Vote,
            0x02 => MessageKind::VoteRequest,
            0x03 => MessageKind::Heartbeat,
            other => MessageKind::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            MessageKind::Vote => 0x01,
            MessageKind::VoteRequest => 0x02,
            MessageKind::Heartbeat => 0x03,
            MessageKind::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Vote => write!(f, "vote"),
            MessageKind::VoteRequest => write!(f, "vote-request"),
            MessageKind::Heartbeat => write!(f, "heartbeat"),
            MessageKind::Unknown(raw) => write!(f, "unknown({raw:#04x})"),
        }
    }
}

/// One election datagram: `[source_id, term, type, leader_id]`, one byte
/// each. `leader` is `None` when the sender is not a leader and knows none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub source: NodeId,
    pub term: Term,
    pub kind: MessageKind,
    pub leader: Option<NodeId>,
}

impl Message {
    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        [
            self.source.get(),
            self.term,
            self.kind.to_wire(),
            NodeId::to_wire(self.leader),
        ]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != MESSAGE_LEN {
            return Err(WatchdogError::MalformedDatagram {
                len: data.len(),
                data: data.to_vec(),
            });
        }

        Ok(Self {
            source: NodeId::new(data[0]),
            term: data[1],
            kind: MessageKind::from_wire(data[2]),
            leader: NodeId::from_wire(data[3]),
        })
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "source: {}, term: {}, type: {}, leader: {}",
            self.source,
            self.term,
            self.kind,
            NodeId::to_wire(self.leader),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let msg = Message {
            source: NodeId::new(2),
            term: 7,
            kind: MessageKind::Heartbeat,
            leader: Some(NodeId::new(2)),
        };

        assert_eq!(msg.encode(), [2, 7, 0x03, 2]);
    }

    #[test]
    fn test_round_trip() {
        let messages = [
            Message {
                source: NodeId::new(1),
                term: 0,
                kind: MessageKind::Vote,
                leader: None,
            },
            Message {
                source: NodeId::new(255),
                term: 255,
                kind: MessageKind::VoteRequest,
                leader: None,
            },
            Message {
                source: NodeId::new(3),
                term: 9,
                kind: MessageKind::Heartbeat,
                leader: Some(NodeId::new(3)),
            },
            Message {
                source: NodeId::new(4),
                term: 1,
                kind: MessageKind::Unknown(0x7f),
                leader: Some(NodeId::new(9)),
            },
        ];

        for msg in messages {
            assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn test_rejects_wrong_length() {
        for len in [0usize, 1, 2, 3, 5, 8, 64] {
            let data = vec![0u8; len];
            let err = Message::decode(&data).unwrap_err();
            assert!(
                matches!(err, WatchdogError::MalformedDatagram { len: l, .. } if l == len),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn test_null_leader_is_zero_byte() {
        let msg = Message {
            source: NodeId::new(1),
            term: 1,
            kind: MessageKind::VoteRequest,
            leader: None,
        };

        assert_eq!(msg.encode()[3], 0);
        assert_eq!(Message::decode(&msg.encode()).unwrap().leader, None);
    }
}
