use serde_json::Value;

use crate::{
    Effect, Envelope, ErrorRecord, Msg, Phase, ProtocolError, SseEventKind, SubscriptionState,
    Summary,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SubscriptionState, msg: Msg) -> (SubscriptionState, Vec<Effect>) {
    let effects = match msg {
        Msg::Subscribe { key, request } => {
            if state.key() == Some(&key) {
                // Same toggle twice is the same job.
                return (state, Vec::new());
            }
            let mut effects = Vec::with_capacity(3);
            if let Some(toggled) = state.active_toggle() {
                effects.push(Effect::ClosePort { toggled });
            }
            if key.toggled == 0 {
                state.reset();
                return (state, effects);
            }

            let toggled = key.toggled;
            let name = key.port_name();
            state.begin(key);
            effects.push(Effect::OpenPort { name, toggled });
            effects.push(Effect::SendRequest {
                toggled,
                envelope: request,
            });
            effects
        }
        Msg::Frame { toggled, frame } => {
            if state.active_toggle() != Some(toggled) {
                // Stale port, or a frame after the terminal envelope.
                return (state, Vec::new());
            }
            apply_frame(&mut state, frame);
            if state.phase().is_terminal() {
                vec![Effect::ClosePort { toggled }]
            } else {
                Vec::new()
            }
        }
        Msg::PortClosed { toggled } => {
            if state.active_toggle() == Some(toggled) {
                state.finish();
            }
            Vec::new()
        }
        Msg::Dispose => match state.active_toggle() {
            Some(toggled) => {
                state.dispose();
                vec![Effect::ClosePort { toggled }]
            }
            None => Vec::new(),
        },
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn apply_frame(state: &mut SubscriptionState, frame: Value) {
    let envelope = match Envelope::from_value(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            state.fail(ErrorRecord::protocol_violation(&err));
            return;
        }
    };

    match envelope {
        Envelope::Response {
            response_ok: true,
            response_json,
        } => match decode_summary(response_json.unwrap_or(Value::Null)) {
            Ok(summary) => state.replace_summary(summary),
            Err(err) => state.fail(err),
        },
        Envelope::Response {
            response_ok: false,
            response_json,
        } => state.fail(http_failure(response_json)),
        Envelope::Sse {
            sse_event,
            sse_data,
        } => {
            if SseEventKind::parse(&sse_event) == SseEventKind::Summary {
                // A malformed partial is dropped; later deliveries may still be fine.
                if let Ok(partial) = serde_json::from_value::<Summary>(sse_data) {
                    state.merge_partial(partial);
                }
            }
        }
        Envelope::Error { error } => state.fail(error),
        Envelope::Request { .. } => {
            state.fail(ErrorRecord::protocol_violation(&ProtocolError::Unexpected(
                "request",
            )));
        }
    }
}

fn decode_summary(json: Value) -> Result<Summary, ErrorRecord> {
    serde_json::from_value(json).map_err(|err| ErrorRecord::new("DecodeError", err.to_string()))
}

/// Non-OK responses carry the server's JSON explanation; surface it as the message.
fn http_failure(json: Option<Value>) -> ErrorRecord {
    let message = match json {
        Some(Value::String(text)) => text,
        Some(Value::Object(map)) => map
            .get("detail")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Some(other) => other.to_string(),
        None => "request failed".to_string(),
    };
    ErrorRecord::new("HttpError", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobKey, Operation, RequestInit};

    #[test]
    fn http_failure_prefers_detail() {
        let record = http_failure(Some(serde_json::json!({"detail": "bad vid"})));
        assert_eq!(record.message, "bad vid");
        assert_eq!(record.name, "HttpError");
    }

    #[test]
    fn dispose_without_port_is_noop() {
        let (state, effects) = update(SubscriptionState::new(), Msg::Dispose);
        assert!(effects.is_empty());
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn closed_port_after_failure_keeps_failure() {
        let key = JobKey::new(Operation::Summarize, "v", 1);
        let request = Envelope::request("https://x/api/summarize/v", RequestInit::default());
        let (state, _) = update(SubscriptionState::new(), Msg::Subscribe { key, request });
        let error = Envelope::error(ErrorRecord::new("FatalError", "boom")).to_value();
        let (state, _) = update(
            state,
            Msg::Frame {
                toggled: 1,
                frame: error,
            },
        );
        let (state, _) = update(state, Msg::PortClosed { toggled: 1 });
        assert_eq!(state.phase(), Phase::Failed);
    }
}
