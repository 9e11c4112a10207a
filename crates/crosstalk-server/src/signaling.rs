//! Stateless relay of WebRTC call-signaling payloads between two sessions.
//!
//! The coordinator keeps no call state: each message is routed by the
//! target identity's current session and forgotten. Offers to an offline
//! callee fail back to the caller; answers, ICE candidates, and end-call
//! notices are forward-if-present, drop-if-absent. There is deliberately
//! no admission control or duplicate-call arbitration — endpoints own
//! their call state.

use crate::api_ws::send_to_session;
use crate::registry::SessionRegistry;
use crosstalk_types::OutboundEvent;
use serde_json::Value;
use tokio::sync::mpsc;

/// Forwards a call offer to the callee, or tells the caller the callee is
/// offline.
pub async fn relay_offer(
    registry: &SessionRegistry,
    reply: &mpsc::Sender<String>,
    caller: &str,
    callee: &str,
    offer: Value,
) {
    let delivered = registry
        .send_event(
            callee,
            &OutboundEvent::IncomingCall {
                caller: caller.to_string(),
                offer,
            },
        )
        .await;

    if !delivered {
        tracing::debug!(caller = %caller, callee = %callee, "call offer to offline callee");
        send_to_session(
            reply,
            &OutboundEvent::CallFailed {
                message: "User is offline".to_string(),
            },
        );
    }
}

/// Forwards the callee's accept/reject outcome to the caller. Dropped
/// silently if the caller is gone.
pub async fn relay_answer(registry: &SessionRegistry, caller: &str, answer: Value, accepted: bool) {
    let event = if accepted {
        OutboundEvent::CallAccepted { answer }
    } else {
        OutboundEvent::CallRejected
    };

    if !registry.send_event(caller, &event).await {
        tracing::debug!(caller = %caller, "dropping call answer for absent caller");
    }
}

/// Forwards an ICE candidate to the target session, if any.
pub async fn relay_ice_candidate(registry: &SessionRegistry, target: &str, candidate: Value) {
    if !registry
        .send_event(target, &OutboundEvent::IceCandidate { candidate })
        .await
    {
        tracing::debug!(target = %target, "dropping ICE candidate for absent target");
    }
}

/// Forwards an end-call notice to the target session, if any.
pub async fn relay_end_call(registry: &SessionRegistry, target: &str) {
    if !registry.send_event(target, &OutboundEvent::CallEnded).await {
        tracing::debug!(target = %target, "dropping end-call notice for absent target");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn registered(registry: &SessionRegistry, username: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        registry.register(username.to_string(), tx).await;
        rx
    }

    fn parse(raw: String) -> Value {
        serde_json::from_str(&raw).expect("valid JSON")
    }

    #[tokio::test]
    async fn offer_reaches_online_callee_untouched() {
        let registry = SessionRegistry::new();
        let mut callee_rx = registered(&registry, "bob").await;
        let (caller_tx, mut caller_rx) = mpsc::channel(8);

        let offer = json!({"sdp": "v=0", "type": "offer"});
        relay_offer(&registry, &caller_tx, "alice", "bob", offer.clone()).await;

        let event = parse(callee_rx.recv().await.expect("callee should receive"));
        assert_eq!(event["type"], "incoming_call");
        assert_eq!(event["caller"], "alice");
        assert_eq!(event["offer"], offer);

        assert!(caller_rx.try_recv().is_err(), "caller gets nothing on success");
    }

    #[tokio::test]
    async fn offer_to_offline_callee_fails_back_to_caller() {
        let registry = SessionRegistry::new();
        let (caller_tx, mut caller_rx) = mpsc::channel(8);

        relay_offer(&registry, &caller_tx, "alice", "carol", json!({})).await;

        let event = parse(caller_rx.recv().await.expect("caller should be notified"));
        assert_eq!(event["type"], "call_failed");
        assert_eq!(event["message"], "User is offline");
    }

    #[tokio::test]
    async fn answer_maps_accepted_flag_to_distinct_events() {
        let registry = SessionRegistry::new();
        let mut caller_rx = registered(&registry, "alice").await;

        relay_answer(&registry, "alice", json!({"sdp": "v=0"}), true).await;
        let event = parse(caller_rx.recv().await.expect("accepted answer"));
        assert_eq!(event["type"], "call_accepted");
        assert_eq!(event["answer"]["sdp"], "v=0");

        relay_answer(&registry, "alice", Value::Null, false).await;
        let event = parse(caller_rx.recv().await.expect("rejected answer"));
        assert_eq!(event["type"], "call_rejected");
    }

    #[tokio::test]
    async fn ice_and_end_call_drop_silently_for_absent_targets() {
        let registry = SessionRegistry::new();

        // Nothing to assert beyond "does not panic or error": the contract
        // is silence toward the sender.
        relay_ice_candidate(&registry, "nobody", json!({"candidate": "c"})).await;
        relay_end_call(&registry, "nobody").await;

        let mut target_rx = registered(&registry, "bob").await;
        relay_ice_candidate(&registry, "bob", json!({"candidate": "c"})).await;
        relay_end_call(&registry, "bob").await;

        let event = parse(target_rx.recv().await.expect("candidate should arrive"));
        assert_eq!(event["type"], "ice_candidate");
        let event = parse(target_rx.recv().await.expect("end notice should arrive"));
        assert_eq!(event["type"], "call_ended");
    }
}
