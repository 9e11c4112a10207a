//! Closed wire-event unions for the WebSocket transport.
//!
//! Every event the coordinator accepts or emits has exactly one variant
//! here, so the dispatcher's `match` is exhaustive and a renamed or
//! misspelled event name fails at the serde boundary instead of silently
//! falling through a string lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_source_language() -> String {
    crate::DEFAULT_SOURCE_LANGUAGE.to_string()
}

fn default_target_language() -> String {
    crate::DEFAULT_TARGET_LANGUAGE.to_string()
}

/// Events received from a connected client.
///
/// Signaling payloads (`offer`, `answer`, `candidate`) are opaque JSON — the
/// coordinator relays them without inspecting WebRTC internals. Audio bytes
/// cross the wire base64-encoded in the `audio` fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "register_user")]
    RegisterUser { username: String },

    #[serde(rename = "call_user")]
    CallUser {
        caller: String,
        callee: String,
        offer: Value,
    },

    #[serde(rename = "call_response")]
    CallResponse {
        caller: String,
        #[serde(default)]
        answer: Value,
        accepted: bool,
    },

    #[serde(rename = "ice_candidate")]
    IceCandidate { target: String, candidate: Value },

    #[serde(rename = "end_call")]
    EndCall { target: String },

    #[serde(rename = "audio_data")]
    AudioData {
        audio: String,
        #[serde(default = "default_source_language")]
        source_language: String,
        #[serde(default = "default_target_language")]
        target_language: String,
    },

    #[serde(rename = "translated_audio")]
    TranslatedAudio { target: String, audio: String },

    #[serde(rename = "friend_request")]
    FriendRequest { from: String, to: String },

    #[serde(rename = "accept_friend_request")]
    AcceptFriendRequest { from: String, to: String },

    #[serde(rename = "reject_friend_request")]
    RejectFriendRequest { from: String, to: String },

    #[serde(rename = "get_friend_requests")]
    GetFriendRequests { username: String },

    #[serde(rename = "get_friends")]
    GetFriends { username: String },
}

/// A friend entry as delivered in `friends_list`.
///
/// `online_status` reflects the live Session Registry at emission time, not
/// the persisted flag; `last_seen` is the persisted ISO-8601 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendInfo {
    pub username: String,
    pub online_status: bool,
    pub last_seen: String,
}

/// Events emitted to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "user_online")]
    UserOnline { username: String },

    #[serde(rename = "user_offline")]
    UserOffline { username: String },

    #[serde(rename = "incoming_call")]
    IncomingCall { caller: String, offer: Value },

    #[serde(rename = "call_failed")]
    CallFailed { message: String },

    #[serde(rename = "call_accepted")]
    CallAccepted { answer: Value },

    #[serde(rename = "call_rejected")]
    CallRejected,

    #[serde(rename = "call_ended")]
    CallEnded,

    #[serde(rename = "ice_candidate")]
    IceCandidate { candidate: Value },

    #[serde(rename = "translation_result")]
    TranslationResult {
        original_text: String,
        translated_text: String,
        audio: String,
    },

    #[serde(rename = "translated_audio")]
    TranslatedAudio { audio: String },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "friend_request_received")]
    FriendRequestReceived { from: String },

    #[serde(rename = "friend_request_sent")]
    FriendRequestSent { to: String },

    #[serde(rename = "friends_list")]
    FriendsList { friends: Vec<FriendInfo> },

    #[serde(rename = "friend_request_accepted")]
    FriendRequestAccepted { username: String },

    #[serde(rename = "friend_request_rejected")]
    FriendRequestRejected { username: String },

    #[serde(rename = "friend_requests_list")]
    FriendRequestsList { requests: Vec<String> },
}
