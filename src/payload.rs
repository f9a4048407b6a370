//! Payload extraction and follow-up decisions.
//!
//! The agent's answer payload may be nested at several known paths inside
//! the raw response body. These functions locate it, decide whether it
//! signals "more results available" or "incomplete", and generate the
//! single follow-up query string for the next step of a chain. Rendering
//! the payload itself is out of scope here.

use serde_json::Value;

/// Nested paths probed for the answer payload, in priority order.
const PAYLOAD_PATHS: [&[&str]; 4] = [
    &["data", "output", "transformed", "payload"],
    &["data", "output", "payload"],
    &["data", "output", "answer"],
    &["payload"],
];

/// Locates the answer payload inside a raw response body.
///
/// Probes the known nested paths in order; the first present value wins.
/// When none is present the raw body itself is returned, so callers can
/// always run the follow-up predicates against something. Never fails.
#[must_use]
pub fn extract_payload(body: &Value) -> &Value {
    for path in PAYLOAD_PATHS {
        let mut current = body;
        let mut found = true;
        for segment in path {
            match current.get(segment) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return current;
        }
    }
    body
}

/// Whether the payload signals that a follow-up query should be issued.
///
/// True iff `requires_follow_up` is set, or `data.incomplete` is set, or
/// either pagination flag (`has_more_results`, `data.has_more`) is set.
#[must_use]
pub fn should_follow_up(payload: &Value) -> bool {
    flag(payload, &["requires_follow_up"])
        || flag(payload, &["data", "incomplete"])
        || has_more(payload)
}

/// Generates the follow-up query string for the next chain step.
///
/// Returns `None` once `depth` has reached `max_depth`. Pagination is
/// checked before incompleteness, and only one follow-up is produced per
/// step even when both signals are present:
///
/// - "has more" → `"<original> (page <next>)"` where `next` is
///   `payload.data.page` (default 0) plus one.
/// - "incomplete" → `"<original> (continue with more details)"`.
#[must_use]
pub fn generate_follow_up_query(
    original_query: &str,
    payload: &Value,
    depth: usize,
    max_depth: usize,
) -> Option<String> {
    if depth >= max_depth {
        return None;
    }
    if has_more(payload) {
        let page = payload
            .get("data")
            .and_then(|d| d.get("page"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        return Some(format!("{original_query} (page {})", page + 1));
    }
    if flag(payload, &["requires_follow_up"]) || flag(payload, &["data", "incomplete"]) {
        return Some(format!("{original_query} (continue with more details)"));
    }
    None
}

/// Either pagination signal.
fn has_more(payload: &Value) -> bool {
    flag(payload, &["has_more_results"]) || flag(payload, &["data", "has_more"])
}

/// True iff the boolean at `path` is present and `true`.
fn flag(payload: &Value, path: &[&str]) -> bool {
    let mut current = payload;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current.as_bool() == Some(true)
}
