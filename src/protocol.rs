//! Line-delimited packet protocol
//!
//! Shared by the stdio host and the plugin channel: each line carries one
//! JSON packet tagged by its `Type` member.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPacket {
    #[serde(rename = "Type", default = "packet_types::request")]
    pub packet_type: String,
    #[serde(default)]
    pub seq: u64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl RequestPacket {
    pub fn new(seq: u64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            packet_type: packet_types::request(),
            seq,
            command: command.into(),
            arguments,
        }
    }

    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// A successful reply skeleton for this request.
    pub fn reply(&self, seq: u64) -> ResponsePacket {
        ResponsePacket {
            packet_type: packet_types::response(),
            seq,
            request_seq: self.seq,
            command: self.command.clone(),
            running: true,
            success: true,
            message: None,
            body: Value::Null,
        }
    }
}

/// Reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponsePacket {
    #[serde(rename = "Type", default = "packet_types::response")]
    pub packet_type: String,
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "Request_seq")]
    pub request_seq: u64,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_true")]
    pub running: bool,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl ResponsePacket {
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.message = Some(message.into());
        self.body = Value::Null;
        self
    }
}

/// Unsolicited notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventPacket {
    #[serde(rename = "Type", default = "packet_types::event")]
    pub packet_type: String,
    #[serde(default)]
    pub seq: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl EventPacket {
    pub fn new(seq: u64, event: impl Into<String>, body: Value) -> Self {
        Self {
            packet_type: packet_types::event(),
            seq,
            event: event.into(),
            body,
        }
    }
}

fn default_true() -> bool {
    true
}

mod packet_types {
    pub fn request() -> String {
        "request".to_string()
    }
    pub fn response() -> String {
        "response".to_string()
    }
    pub fn event() -> String {
        "event".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = RequestPacket::new(1, "/findsymbols", Some(serde_json::json!({"Filter": "Foo"})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"Type\":\"request\""));
        assert!(json.contains("\"Seq\":1"));
        assert!(json.contains("\"Command\":\"/findsymbols\""));
    }

    #[test]
    fn test_request_parse_without_type() {
        let req = RequestPacket::parse(r#"{"Seq":7,"Command":"/codecheck"}"#).unwrap();
        assert_eq!(req.packet_type, "request");
        assert_eq!(req.arguments, None);
    }

    #[test]
    fn test_reply_echoes_request() {
        let req = RequestPacket::new(4, "/gotodefinition", None);
        let resp = req.reply(9).with_body(serde_json::json!({"Line": 1}));
        assert_eq!(resp.request_seq, 4);
        assert_eq!(resp.command, "/gotodefinition");
        assert!(resp.success);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"Request_seq\":4"));
    }

    #[test]
    fn test_failed_response() {
        let resp = RequestPacket::new(1, "/x", None).reply(2).failed("nope");
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("nope"));
        assert!(resp.body.is_null());
    }
}
