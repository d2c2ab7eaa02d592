//! Client and relay messages (NIP-01 subset).
//!
//! - Client to relay: `REQ`, `EVENT`, `CLOSE`
//! - Relay to client: `EVENT`, `EOSE`, `OK`, `NOTICE`, `CLOSED`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::NostrEvent;
use crate::SessionError;

/// Subscription filter. Empty lists and `None` fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Relay-side check of whether `event` belongs to this subscription.
    pub fn matches(&self, event: &NostrEvent) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.authors.is_empty() || self.authors.iter().any(|a| *a == event.pubkey))
            && self.since.map_or(true, |since| event.created_at >= since)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub filter: Filter,
}

impl Subscription {
    pub fn new(id: impl Into<String>, filter: Filter) -> Self {
        Self {
            id: id.into(),
            filter,
        }
    }

    pub fn to_req(&self) -> ClientMessage {
        ClientMessage::Req {
            subscription_id: self.id.clone(),
            filter: self.filter.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["REQ", <subscription_id>, <filter>]`
    Req {
        subscription_id: String,
        filter: Filter,
    },
    /// `["EVENT", <event>]`
    Event(NostrEvent),
    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, SessionError> {
        let value = match self {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => serde_json::json!(["REQ", subscription_id, filter]),
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Parses a client message; used by the in-memory relay.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let arr = parse_array(json)?;
        match label(&arr)? {
            "REQ" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let filter = arr
                    .get(2)
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                Ok(ClientMessage::Req {
                    subscription_id,
                    filter,
                })
            }
            "EVENT" => {
                let event = arr
                    .get(1)
                    .cloned()
                    .ok_or_else(|| missing("event"))?;
                Ok(ClientMessage::Event(serde_json::from_value(event)?))
            }
            "CLOSE" => Ok(ClientMessage::Close {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            }),
            other => Err(SessionError::Protocol(format!(
                "unknown client message: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: NostrEvent,
    },
    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },
    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },
}

impl RelayMessage {
    /// Parses a relay message.
    ///
    /// Returns `Ok(None)` for well-formed messages with a label this client
    /// does not handle (`AUTH`, `COUNT`, ...). Malformed input is a
    /// [`SessionError::Protocol`] or [`SessionError::Json`].
    pub fn from_json(json: &str) -> Result<Option<Self>, SessionError> {
        let arr = parse_array(json)?;
        let message = match label(&arr)? {
            "EVENT" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let event = arr.get(2).cloned().ok_or_else(|| missing("event"))?;
                RelayMessage::Event {
                    subscription_id,
                    event: serde_json::from_value(event)?,
                }
            }
            "EOSE" => RelayMessage::Eose {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            },
            "OK" => RelayMessage::Ok {
                event_id: string_at(&arr, 1, "event_id")?,
                accepted: arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| missing("accepted"))?,
                message: optional_string_at(&arr, 3),
            },
            "NOTICE" => RelayMessage::Notice {
                message: string_at(&arr, 1, "message")?,
            },
            "CLOSED" => RelayMessage::Closed {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
                message: optional_string_at(&arr, 2),
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => serde_json::json!(["EVENT", subscription_id, event]),
            RelayMessage::Eose { subscription_id } => serde_json::json!(["EOSE", subscription_id]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => serde_json::json!(["OK", event_id, accepted, message]),
            RelayMessage::Notice { message } => serde_json::json!(["NOTICE", message]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => serde_json::json!(["CLOSED", subscription_id, message]),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

fn parse_array(json: &str) -> Result<Vec<Value>, SessionError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(arr) if !arr.is_empty() => Ok(arr),
        Value::Array(_) => Err(SessionError::Protocol("empty message array".to_string())),
        _ => Err(SessionError::Protocol("message is not an array".to_string())),
    }
}

fn label(arr: &[Value]) -> Result<&str, SessionError> {
    arr[0]
        .as_str()
        .ok_or_else(|| SessionError::Protocol("message label is not a string".to_string()))
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String, SessionError> {
    arr.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn optional_string_at(arr: &[Value], index: usize) -> String {
    arr.get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn missing(field: &str) -> SessionError {
    SessionError::Protocol(format!("missing or invalid field: {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_json() -> &'static str {
        r#"{"id":"aa","pubkey":"bb","created_at":10,"kind":1,"tags":[["p","cc"]],"content":"hi","sig":"dd"}"#
    }

    #[test]
    fn test_req_serialization_omits_empty_fields() {
        let req = ClientMessage::Req {
            subscription_id: "notes".to_string(),
            filter: Filter::new().kind(1).since(1_700_000_000),
        };
        assert_eq!(
            req.to_json().unwrap(),
            r#"["REQ","notes",{"kinds":[1],"since":1700000000}]"#
        );
    }

    #[test]
    fn test_close_serialization() {
        let close = ClientMessage::Close {
            subscription_id: "contacts".to_string(),
        };
        assert_eq!(close.to_json().unwrap(), r#"["CLOSE","contacts"]"#);
    }

    #[test]
    fn test_client_message_parse() {
        let parsed = ClientMessage::from_json(r#"["REQ","x",{"kinds":[3],"authors":["ab"]}]"#).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::Req {
                subscription_id: "x".to_string(),
                filter: Filter::new().kind(3).author("ab"),
            }
        );
        assert!(ClientMessage::from_json(r#"["AUTH","x"]"#).is_err());
    }

    #[test]
    fn test_parse_event_message() {
        let json = format!(r#"["EVENT","notes",{}]"#, event_json());
        match RelayMessage::from_json(&json).unwrap() {
            Some(RelayMessage::Event {
                subscription_id,
                event,
            }) => {
                assert_eq!(subscription_id, "notes");
                assert_eq!(event.kind, 1);
                assert_eq!(event.content, "hi");
                assert_eq!(event.tags, vec![vec!["p".to_string(), "cc".to_string()]]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","contacts"]"#).unwrap(),
            Some(RelayMessage::Eose {
                subscription_id: "contacts".to_string()
            })
        );
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abc",false,"blocked: spam"]"#).unwrap(),
            Some(RelayMessage::Ok {
                event_id: "abc".to_string(),
                accepted: false,
                message: "blocked: spam".to_string(),
            })
        );
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abc",true]"#).unwrap(),
            Some(RelayMessage::Ok {
                event_id: "abc".to_string(),
                accepted: true,
                message: String::new(),
            })
        );
        assert_eq!(
            RelayMessage::from_json(r#"["NOTICE","slow down"]"#).unwrap(),
            Some(RelayMessage::Notice {
                message: "slow down".to_string()
            })
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","notes","error: shutting down"]"#).unwrap(),
            Some(RelayMessage::Closed {
                subscription_id: "notes".to_string(),
                message: "error: shutting down".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_label_is_ignored() {
        assert_eq!(RelayMessage::from_json(r#"["AUTH","challenge"]"#).unwrap(), None);
        assert_eq!(
            RelayMessage::from_json(r#"["COUNT","x",{"count":3}]"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_messages_are_errors() {
        assert!(matches!(
            RelayMessage::from_json("not json"),
            Err(SessionError::Json(_))
        ));
        assert!(matches!(
            RelayMessage::from_json("{}"),
            Err(SessionError::Protocol(_))
        ));
        assert!(matches!(
            RelayMessage::from_json("[]"),
            Err(SessionError::Protocol(_))
        ));
        assert!(matches!(
            RelayMessage::from_json("[1,2]"),
            Err(SessionError::Protocol(_))
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["EVENT","notes"]"#),
            Err(SessionError::Protocol(_))
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["EVENT","notes",{"kind":1}]"#),
            Err(SessionError::Json(_))
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["OK","abc","yes"]"#),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn test_relay_message_to_json_parses_back() {
        let event: NostrEvent = serde_json::from_str(event_json()).unwrap();
        let message = RelayMessage::Event {
            subscription_id: "notes".to_string(),
            event,
        };
        let json = message.to_json().unwrap();
        assert_eq!(RelayMessage::from_json(&json).unwrap(), Some(message));
    }

    #[test]
    fn test_filter_matches() {
        let event: NostrEvent = serde_json::from_str(event_json()).unwrap();
        assert!(Filter::new().kind(1).matches(&event));
        assert!(!Filter::new().kind(3).matches(&event));
        assert!(Filter::new().author("bb").since(10).matches(&event));
        assert!(!Filter::new().since(11).matches(&event));
    }
}
