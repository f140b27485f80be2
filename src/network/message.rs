//! Wire Protocol
//!
//! One JSON object per UDP datagram:
//!
//! ```json
//! {"action":"heartbeat","hostname":"db1","ip":"10.0.0.5","master":1,"eligible":1,"uptime":42,"data":{}}
//! {"action":"shutdown","hostname":"db1"}
//! ```
//!
//! Flags go out as 0/1; `true`/`false` are accepted on input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::state::{NodeRecord, UserData};

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Protocol messages exchanged between nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Periodic state announcement
    Heartbeat(Heartbeat),
    /// Graceful departure notice
    Shutdown { hostname: String },
}

/// Heartbeat payload: a snapshot of the sender's own record
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub hostname: String,
    pub ip: String,
    pub master: bool,
    pub eligible: bool,
    pub uptime: u64,
    pub data: UserData,
}

impl Heartbeat {
    /// Convert into a membership record for the sender
    pub fn into_record(self) -> NodeRecord {
        let mut record = NodeRecord::new(self.hostname, self.ip);
        record.is_master = self.master;
        record.is_eligible = self.eligible;
        record.uptime_seconds = self.uptime;
        record.data = self.data;
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Heartbeat,
    Shutdown,
}

/// Boolean carried as 0/1 on the wire
#[derive(Debug, Clone, Copy)]
struct Flag(bool);

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(self.0))
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(u64),
            Bool(bool),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Int(n) => Flag(n != 0),
            Repr::Bool(b) => Flag(b),
        })
    }
}

/// Flat wire representation; validated into a `Message`
#[derive(Debug, Serialize, Deserialize)]
struct Datagram {
    action: Action,
    hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    master: Option<Flag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eligible: Option<Flag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<UserData>,
}

impl Message {
    /// Hostname of the sending node
    pub fn hostname(&self) -> &str {
        match self {
            Message::Heartbeat(hb) => &hb.hostname,
            Message::Shutdown { hostname } => hostname,
        }
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Heartbeat(_) => "heartbeat",
            Message::Shutdown { .. } => "shutdown",
        }
    }

    /// Serialize to a datagram payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let datagram = match self {
            Message::Heartbeat(hb) => Datagram {
                action: Action::Heartbeat,
                hostname: hb.hostname.clone(),
                ip: Some(hb.ip.clone()),
                master: Some(Flag(hb.master)),
                eligible: Some(Flag(hb.eligible)),
                uptime: Some(hb.uptime),
                data: Some(hb.data.clone()),
            },
            Message::Shutdown { hostname } => Datagram {
                action: Action::Shutdown,
                hostname: hostname.clone(),
                ip: None,
                master: None,
                eligible: None,
                uptime: None,
                data: None,
            },
        };

        let bytes = serde_json::to_vec(&datagram)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Parse a datagram payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let datagram: Datagram = serde_json::from_slice(bytes)?;

        if datagram.hostname.is_empty() {
            return Err(Error::Decode("empty hostname".into()));
        }

        match datagram.action {
            Action::Shutdown => Ok(Message::Shutdown {
                hostname: datagram.hostname,
            }),
            Action::Heartbeat => {
                let missing = |field: &str| {
                    Error::Decode(format!(
                        "heartbeat from {} missing '{}'",
                        datagram.hostname, field
                    ))
                };

                let ip = datagram.ip.clone().ok_or_else(|| missing("ip"))?;
                let master = datagram.master.ok_or_else(|| missing("master"))?;
                let eligible = datagram.eligible.ok_or_else(|| missing("eligible"))?;
                let uptime = datagram.uptime.ok_or_else(|| missing("uptime"))?;

                Ok(Message::Heartbeat(Heartbeat {
                    hostname: datagram.hostname,
                    ip,
                    master: master.0,
                    eligible: eligible.0,
                    uptime,
                    data: datagram.data.unwrap_or_default(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            hostname: "db1".to_string(),
            ip: "10.0.0.5".to_string(),
            master: true,
            eligible: false,
            uptime: 42,
            data: UserData::from_json(r#"{"slot":7}"#, 1024).unwrap(),
        }
    }

    #[test]
    fn test_heartbeat_wire_format() {
        let bytes = Message::Heartbeat(heartbeat()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["action"], "heartbeat");
        assert_eq!(value["hostname"], "db1");
        assert_eq!(value["ip"], "10.0.0.5");
        assert_eq!(value["master"], 1);
        assert_eq!(value["eligible"], 0);
        assert_eq!(value["uptime"], 42);
        assert_eq!(value["data"]["slot"], 7);
    }

    #[test]
    fn test_shutdown_wire_format() {
        let bytes = Message::Shutdown { hostname: "db1".into() }.encode().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"action":"shutdown","hostname":"db1"}"#
        );
    }

    #[test]
    fn test_decode_heartbeat() {
        let raw = br#"{"action":"heartbeat","hostname":"db2","ip":"10.0.0.6","master":0,"eligible":1,"uptime":9,"data":{"k":"v"}}"#;
        let message = Message::decode(raw).unwrap();

        let Message::Heartbeat(hb) = message else {
            panic!("expected heartbeat");
        };
        assert_eq!(hb.hostname, "db2");
        assert!(!hb.master);
        assert!(hb.eligible);
        assert_eq!(hb.uptime, 9);
        assert_eq!(hb.data.as_str(), r#"{"k":"v"}"#);

        let record = hb.into_record();
        assert_eq!(record.address, "10.0.0.6");
        assert!(record.is_eligible);
        assert!(!record.is_self);
    }

    #[test]
    fn test_decode_accepts_boolean_flags_and_missing_data() {
        let raw = br#"{"action":"heartbeat","hostname":"db3","ip":"10.0.0.7","master":true,"eligible":false,"uptime":1}"#;
        let Message::Heartbeat(hb) = Message::decode(raw).unwrap() else {
            panic!("expected heartbeat");
        };
        assert!(hb.master);
        assert!(!hb.eligible);
        assert!(hb.data.is_empty());
    }

    #[test]
    fn test_decode_shutdown() {
        let message = Message::decode(br#"{"action":"shutdown","hostname":"db4"}"#).unwrap();
        assert_eq!(message, Message::Shutdown { hostname: "db4".into() });
        assert_eq!(message.hostname(), "db4");
        assert_eq!(message.type_name(), "shutdown");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: [&[u8]; 6] = [
            b"not json at all",
            br#"{"action":"dance","hostname":"db1"}"#,
            br#"{"action":"heartbeat"}"#,
            br#"{"action":"heartbeat","hostname":"db1","master":1,"eligible":1,"uptime":1}"#,
            br#"{"action":"shutdown","hostname":""}"#,
            br#"[1,2,3]"#,
        ];

        for raw in cases {
            let err = Message::decode(raw).unwrap_err();
            assert!(err.is_malformed_input(), "unexpected error kind: {}", err);
        }
    }
}
