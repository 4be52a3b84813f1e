//! Control messages exchanged between the station and its drones
//!
//! Each message travels as one length-prefixed frame (see [`crate::transport`]).
//! The frame payload keeps the plain-text vocabulary of the fleet protocol:
//!
//! | Direction       | Payload                        |
//! |-----------------|--------------------------------|
//! | drone → station | `<fitness>`                    |
//! | station → drone | `ID <n>`                       |
//! | station → drone | `ROLE_CHANGE LEADER`           |
//! | station → drone | `ROLE_CHANGE FOLLOWER <n>`     |
//! | station → drone | `STATUS_CHECK`                 |
//! | drone → station | `STATUS_OK[ <telemetry>]`      |
//!
//! Payloads are decoded by whole-token matching, so a message can only ever
//! match one variant.

use crate::error::ProtocolError;
use crate::types::{Fitness, NodeId, Role};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Role carried by a `ROLE_CHANGE` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAssignment {
    Leader,
    Follower { leader_id: NodeId },
}

impl RoleAssignment {
    /// Assignment for `node_id` when `leader_id` has won the election
    pub fn for_node(node_id: NodeId, leader_id: NodeId) -> Self {
        if node_id == leader_id {
            RoleAssignment::Leader
        } else {
            RoleAssignment::Follower { leader_id }
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleAssignment::Leader => Role::Leader,
            RoleAssignment::Follower { .. } => Role::Follower,
        }
    }
}

/// Fleet control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Registration: the drone reports its fitness
    Register { fitness: Fitness },

    /// Identity assigned by the station
    IdAssigned { id: NodeId },

    /// New role after an election
    RoleChange(RoleAssignment),

    /// Liveness probe
    StatusCheck,

    /// Probe reply, optionally carrying a telemetry reading
    StatusOk { telemetry: Option<i64> },
}

impl Message {
    /// Encode the payload of a frame
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Decode the payload of a frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        text.parse()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Register { fitness } => write!(f, "{}", fitness),
            Message::IdAssigned { id } => write!(f, "ID {}", id),
            Message::RoleChange(RoleAssignment::Leader) => write!(f, "ROLE_CHANGE LEADER"),
            Message::RoleChange(RoleAssignment::Follower { leader_id }) => {
                write!(f, "ROLE_CHANGE FOLLOWER {}", leader_id)
            }
            Message::StatusCheck => write!(f, "STATUS_CHECK"),
            Message::StatusOk { telemetry: None } => write!(f, "STATUS_OK"),
            Message::StatusOk {
                telemetry: Some(value),
            } => write!(f, "STATUS_OK {}", value),
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();

        match tokens.as_slice() {
            [] => Err(ProtocolError::Empty),
            ["ID", id] => Ok(Message::IdAssigned {
                id: parse_number("id", id)?,
            }),
            ["ROLE_CHANGE", "LEADER"] => Ok(Message::RoleChange(RoleAssignment::Leader)),
            ["ROLE_CHANGE", "FOLLOWER", leader] => {
                Ok(Message::RoleChange(RoleAssignment::Follower {
                    leader_id: parse_number("leader id", leader)?,
                }))
            }
            ["STATUS_CHECK"] => Ok(Message::StatusCheck),
            ["STATUS_OK"] => Ok(Message::StatusOk { telemetry: None }),
            ["STATUS_OK", value] => Ok(Message::StatusOk {
                telemetry: Some(parse_number("telemetry", value)?),
            }),
            [fitness] => fitness
                .parse()
                .map(|fitness| Message::Register { fitness })
                .map_err(|_| ProtocolError::Unrecognized(s.to_string())),
            _ => Err(ProtocolError::Unrecognized(s.to_string())),
        }
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_text() {
        assert_eq!(Message::Register { fitness: 40 }.to_string(), "40");
        assert_eq!(Message::Register { fitness: -87 }.to_string(), "-87");
        assert_eq!(Message::IdAssigned { id: 3 }.to_string(), "ID 3");
        assert_eq!(
            Message::RoleChange(RoleAssignment::Leader).to_string(),
            "ROLE_CHANGE LEADER"
        );
        assert_eq!(
            Message::RoleChange(RoleAssignment::Follower { leader_id: 2 }).to_string(),
            "ROLE_CHANGE FOLLOWER 2"
        );
        assert_eq!(Message::StatusCheck.to_string(), "STATUS_CHECK");
        assert_eq!(Message::StatusOk { telemetry: None }.to_string(), "STATUS_OK");
        assert_eq!(
            Message::StatusOk {
                telemetry: Some(-90)
            }
            .to_string(),
            "STATUS_OK -90"
        );
    }

    #[test]
    fn test_parse_follower_with_leader_id() {
        let msg: Message = "ROLE_CHANGE FOLLOWER 7".parse().unwrap();
        assert_eq!(
            msg,
            Message::RoleChange(RoleAssignment::Follower { leader_id: 7 })
        );
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let msg: Message = "  ID 12\n".parse().unwrap();
        assert_eq!(msg, Message::IdAssigned { id: 12 });
    }

    #[test]
    fn test_tokens_are_matched_whole() {
        // Substring matching would have read this as an ID assignment.
        assert!(matches!(
            "VALID 3".parse::<Message>(),
            Err(ProtocolError::Unrecognized(_))
        ));
        assert!(matches!(
            "ROLE_CHANGE LEADERSHIP".parse::<Message>(),
            Err(ProtocolError::Unrecognized(_))
        ));
    }

    #[test]
    fn test_non_numeric_fields_are_rejected() {
        assert_eq!(
            "ROLE_CHANGE FOLLOWER abc".parse::<Message>(),
            Err(ProtocolError::InvalidNumber {
                field: "leader id",
                value: "abc".to_string(),
            })
        );
        assert!(matches!(
            "ID -1".parse::<Message>(),
            Err(ProtocolError::InvalidNumber { field: "id", .. })
        ));
        assert!(matches!(
            "battery".parse::<Message>(),
            Err(ProtocolError::Unrecognized(_))
        ));
        assert_eq!("   ".parse::<Message>(), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        assert_eq!(
            Message::from_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::NotUtf8)
        );
        assert_eq!(
            Message::from_bytes(b"STATUS_CHECK"),
            Ok(Message::StatusCheck)
        );
    }

    #[test]
    fn test_role_assignment_for_node() {
        assert_eq!(RoleAssignment::for_node(2, 2), RoleAssignment::Leader);
        assert_eq!(
            RoleAssignment::for_node(1, 2),
            RoleAssignment::Follower { leader_id: 2 }
        );
        assert_eq!(RoleAssignment::for_node(1, 2).role(), Role::Follower);
    }
}
