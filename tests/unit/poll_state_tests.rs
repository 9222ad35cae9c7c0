//! Unit tests for poll-state classification and interval coercion.

use serde_json::json;

use unity_mcp_bridge::models::response::{
    PollState, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};

// ── Unmarked payloads ────────────────────────────────────────────────────────

/// A null payload means the operation has not produced anything yet.
#[test]
fn null_payload_is_pending_with_default_interval() {
    let state = PollState::interpret(&json!(null));
    assert_eq!(
        state,
        PollState::Pending {
            interval_seconds: DEFAULT_POLL_INTERVAL
        }
    );
}

/// An empty object without a status marker is still pending.
#[test]
fn empty_object_is_pending() {
    let state = PollState::interpret(&json!({}));
    assert_eq!(
        state,
        PollState::Pending {
            interval_seconds: DEFAULT_POLL_INTERVAL
        }
    );
}

/// A non-empty object without a status marker is terminal.
#[test]
fn unmarked_non_empty_object_is_final() {
    let state = PollState::interpret(&json!({"message": "done"}));
    assert_eq!(state, PollState::Final);
}

/// A non-object, non-null payload is terminal.
#[test]
fn scalar_payload_is_final() {
    assert_eq!(PollState::interpret(&json!("text")), PollState::Final);
    assert_eq!(PollState::interpret(&json!(3)), PollState::Final);
    assert_eq!(PollState::interpret(&json!([1, 2])), PollState::Final);
}

// ── Marked payloads ──────────────────────────────────────────────────────────

/// A pending marker with a numeric interval hint uses that interval.
#[test]
fn pending_with_numeric_interval() {
    let state = PollState::interpret(&json!({
        "_mcp_status": "pending",
        "_mcp_poll_interval": 2.5,
    }));
    assert_eq!(
        state,
        PollState::Pending {
            interval_seconds: 2.5
        }
    );
}

/// A numeric-string interval hint is parsed like a number.
#[test]
fn pending_with_numeric_string_interval() {
    let state = PollState::interpret(&json!({
        "_mcp_status": "pending",
        "_mcp_poll_interval": "0.5",
    }));
    assert_eq!(
        state,
        PollState::Pending {
            interval_seconds: 0.5
        }
    );
}

/// Interval hints are clamped to the allowed range on both ends.
#[test]
fn interval_hints_are_clamped() {
    let too_small = PollState::interpret(&json!({
        "_mcp_status": "pending",
        "_mcp_poll_interval": 0.001,
    }));
    assert_eq!(
        too_small,
        PollState::Pending {
            interval_seconds: MIN_POLL_INTERVAL
        }
    );

    let too_large = PollState::interpret(&json!({
        "_mcp_status": "pending",
        "_mcp_poll_interval": 120,
    }));
    assert_eq!(
        too_large,
        PollState::Pending {
            interval_seconds: MAX_POLL_INTERVAL
        }
    );
}

/// An unparseable interval hint falls back to the default.
#[test]
fn bad_interval_hint_falls_back_to_default() {
    for hint in [json!("soon"), json!(true), json!({"n": 1})] {
        let state = PollState::interpret(&json!({
            "_mcp_status": "pending",
            "_mcp_poll_interval": hint,
        }));
        assert_eq!(
            state,
            PollState::Pending {
                interval_seconds: DEFAULT_POLL_INTERVAL
            },
            "hint {hint:?} must fall back to the default interval"
        );
    }
}

/// A pending marker without any interval hint uses the default.
#[test]
fn pending_without_hint_uses_default_interval() {
    let state = PollState::interpret(&json!({"_mcp_status": "pending"}));
    assert_eq!(
        state,
        PollState::Pending {
            interval_seconds: DEFAULT_POLL_INTERVAL
        }
    );
}

/// Complete and error markers are recognized as their terminal states.
#[test]
fn complete_and_error_markers_are_terminal() {
    assert_eq!(
        PollState::interpret(&json!({"_mcp_status": "complete"})),
        PollState::Complete
    );
    assert_eq!(
        PollState::interpret(&json!({"_mcp_status": "error", "error": "x"})),
        PollState::Error
    );
}

/// An unrecognized or non-string status marker is treated as terminal.
#[test]
fn unknown_status_marker_is_final() {
    assert_eq!(
        PollState::interpret(&json!({"_mcp_status": "paused"})),
        PollState::Final
    );
    assert_eq!(
        PollState::interpret(&json!({"_mcp_status": 7})),
        PollState::Final
    );
}
