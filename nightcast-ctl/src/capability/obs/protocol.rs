//! OBS WebSocket v5 message framing
//!
//! Every frame is a JSON object `{"op": <opcode>, "d": <payload>}`. Only the
//! opcodes the controller speaks are modelled; anything else decodes to
//! [`Incoming::Other`] and is ignored by the reader.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const RPC_VERSION: u32 = 1;

/// `EventSubscription::General`
pub const EVENT_SUB_GENERAL: u32 = 1 << 0;
/// `EventSubscription::MediaInputs`
pub const EVENT_SUB_MEDIA_INPUTS: u32 = 1 << 8;

/// Event emitted by OBS when a media input starts an entry
pub const EVENT_MEDIA_INPUT_PLAYBACK_STARTED: &str = "MediaInputPlaybackStarted";
/// Event emitted by OBS when a media input finishes
pub const EVENT_MEDIA_INPUT_PLAYBACK_ENDED: &str = "MediaInputPlaybackEnded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Serialize)]
struct OutFrame<'a, T: Serialize> {
    op: u8,
    d: &'a T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Option<Value>,
}

impl Event {
    /// `eventData.inputName`, when present
    pub fn input_name(&self) -> Option<&str> {
        self.event_data.as_ref()?.get("inputName")?.as_str()
    }
}

/// Decoded server frame
#[derive(Debug, Clone)]
pub enum Incoming {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    Other(u8),
}

/// Serialize an outgoing frame
pub fn encode<T: Serialize>(op: OpCode, payload: &T) -> Result<String> {
    serde_json::to_string(&OutFrame {
        op: op as u8,
        d: payload,
    })
    .map_err(|e| Error::Protocol(format!("encode op {}: {}", op as u8, e)))
}

/// Parse a text frame from the server
pub fn decode(text: &str) -> Result<Incoming> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("bad frame: {}", e)))?;

    Ok(match frame.op {
        0 => Incoming::Hello(serde_json::from_value(frame.d).map_err(payload("Hello"))?),
        2 => Incoming::Identified(serde_json::from_value(frame.d).map_err(payload("Identified"))?),
        5 => Incoming::Event(serde_json::from_value(frame.d).map_err(payload("Event"))?),
        7 => Incoming::RequestResponse(
            serde_json::from_value(frame.d).map_err(payload("RequestResponse"))?,
        ),
        other => Incoming::Other(other),
    })
}

fn payload(op: &'static str) -> impl Fn(serde_json::Error) -> Error {
    move |e| Error::Protocol(format!("bad {} payload: {}", op, e))
}

/// Authentication string for `Identify`
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    BASE64.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}
