//! IPC message dispatch — parse s-expressions and route to handlers.

use lexpr::Value;
use tracing::{debug, warn};

use super::plist::{get_int, get_keyword, get_string, parse_element, parse_frame};
use crate::state::DaemonState;
use crate::tracking::Indicator;

pub use super::plist::{error_response, ok_response};

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut DaemonState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map(|c| c.authenticated)
        .unwrap_or(false);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some("ping") => handle_ping(state, msg_id, &value),
        Some("status") => handle_status(state, msg_id),
        // Frames
        Some("frame") => handle_frame(state, msg_id, &value),
        // Scene
        Some("element-add") => handle_element_add(state, msg_id, &value),
        Some("element-remove") => handle_element_remove(state, msg_id, &value),
        Some("element-list") => handle_element_list(state, msg_id),
        // Indicator
        Some("indicator-show") => handle_indicator_visibility(state, msg_id, true),
        Some("indicator-hide") => handle_indicator_visibility(state, msg_id, false),
        Some("indicator-resize") => handle_indicator_resize(state, msg_id, &value),
        Some("indicator-status") => handle_indicator_status(state, msg_id),
        // Tracker
        Some("tracker-status") => handle_tracker_status(state, msg_id),
        Some("tracker-config") => handle_tracker_config(state, msg_id),
        Some("tracker-reset") => handle_tracker_reset(state, msg_id),
        Some("tracker-set-hysteresis") => handle_tracker_set_hysteresis(state, msg_id, &value),
        Some("tracker-set-freeze") => handle_tracker_set_freeze(state, msg_id, &value),
        Some("tracker-set-throttle") => handle_tracker_set_throttle(state, msg_id, &value),
        // IPC security
        Some("ipc-client-info") => handle_ipc_client_info(state, client_id, msg_id),
        Some("ipc-rate-limit") => handle_ipc_rate_limit(state, client_id, msg_id, &value),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handshake ───────────────────────────────────────────────

fn handle_hello(
    state: &mut DaemonState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != 1 {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    // Only clients running as the daemon's own user may connect.
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        if let Some(peer_uid) = client.peer_uid {
            let our_uid = unsafe { libc::getuid() };
            if peer_uid != our_uid {
                warn!(client_id, peer_uid, our_uid, "rejecting client: UID mismatch");
                return Some(error_response(msg_id, "authentication failed: UID mismatch"));
            }
        }
    }

    let client_name = get_string(value, "client").unwrap_or_default();
    debug!(client_id, client_name, "hello handshake (authenticated)");

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.authenticated = true;
    }

    Some(format!(
        "(:type :hello :id {} :version 1 :server \"gazewink\" :server-version \"{}\")",
        msg_id,
        env!("CARGO_PKG_VERSION")
    ))
}

fn handle_ping(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id,
        client_ts,
        state.unix_millis()
    ))
}

fn handle_status(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :daemon {})",
        msg_id,
        state.status_sexp()
    ))
}

// ── Frames ──────────────────────────────────────────────────

fn handle_frame(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    let frame = parse_frame(value);
    let report = state.handle_frame(&frame);
    if report.frozen {
        return Some(format!(
            "(:type :response :id {} :status :ok :frozen t)",
            msg_id
        ));
    }
    Some(format!(
        "(:type :response :id {} :status :ok :events {})",
        msg_id,
        report.events.len()
    ))
}

// ── Scene ───────────────────────────────────────────────────

fn handle_element_add(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    match parse_element(value) {
        Ok(element) => {
            state.add_element(element);
            Some(ok_response(msg_id))
        }
        Err(reason) => Some(error_response(msg_id, &reason)),
    }
}

fn handle_element_remove(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    let id = match get_int(value, "id") {
        Some(id) if id >= 0 => id as u64,
        _ => return Some(error_response(msg_id, "missing or invalid :id")),
    };
    if state.remove_element(id) {
        Some(ok_response(msg_id))
    } else {
        Some(error_response(msg_id, &format!("element {id} not found")))
    }
}

fn handle_element_list(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :elements {})",
        msg_id,
        state.scene.list_sexp()
    ))
}

// ── Indicator ───────────────────────────────────────────────

fn handle_indicator_visibility(state: &mut DaemonState, msg_id: i64, visible: bool) -> Option<String> {
    if visible {
        state.indicator.show();
    } else {
        state.indicator.hide();
    }
    Some(ok_response(msg_id))
}

fn handle_indicator_resize(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    let size = match get_int(value, "size") {
        Some(s) if (1..=2000).contains(&s) => s as f64,
        _ => return Some(error_response(msg_id, "invalid :size (1-2000)")),
    };
    state.indicator.resize(size);
    Some(format!(
        "(:type :response :id {} :status :ok :size {:.0})",
        msg_id, size
    ))
}

fn handle_indicator_status(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    let now_ms = state.pipeline.now_ms();
    Some(format!(
        "(:type :response :id {} :status :ok :indicator {})",
        msg_id,
        state.indicator.status_sexp(now_ms)
    ))
}

// ── Tracker ─────────────────────────────────────────────────

fn handle_tracker_status(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :tracker {})",
        msg_id,
        state.pipeline.status_sexp()
    ))
}

fn handle_tracker_config(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.pipeline.config.config_sexp()
    ))
}

fn handle_tracker_reset(state: &mut DaemonState, msg_id: i64) -> Option<String> {
    state.pipeline.reset();
    Some(ok_response(msg_id))
}

fn handle_tracker_set_hysteresis(
    state: &mut DaemonState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let ms = match get_int(value, "ms") {
        Some(ms) if (50..=2000).contains(&ms) => ms as f64,
        _ => return Some(error_response(msg_id, "invalid :ms (50-2000)")),
    };
    state.pipeline.set_hysteresis(ms);
    Some(format!(
        "(:type :response :id {} :status :ok :hysteresis-ms {:.0})",
        msg_id, ms
    ))
}

fn handle_tracker_set_freeze(state: &mut DaemonState, msg_id: i64, value: &Value) -> Option<String> {
    let ms = match get_int(value, "ms") {
        Some(ms) if (0..=5000).contains(&ms) => ms as f64,
        _ => return Some(error_response(msg_id, "invalid :ms (0-5000)")),
    };
    state.pipeline.set_freeze(ms);
    Some(format!(
        "(:type :response :id {} :status :ok :freeze-ms {:.0})",
        msg_id, ms
    ))
}

fn handle_tracker_set_throttle(
    state: &mut DaemonState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let ms = match get_int(value, "ms") {
        Some(ms) if (0..=1000).contains(&ms) => ms as f64,
        _ => return Some(error_response(msg_id, "invalid :ms (0-1000)")),
    };
    state.pipeline.set_throttle(ms);
    Some(format!(
        "(:type :response :id {} :status :ok :throttle-ms {:.0})",
        msg_id, ms
    ))
}

// ── IPC security handlers ───────────────────────────────────

fn handle_ipc_client_info(state: &mut DaemonState, client_id: u64, msg_id: i64) -> Option<String> {
    let Some(client) = state.ipc_server.clients.get(&client_id) else {
        return Some(error_response(msg_id, "client not found"));
    };
    let uid = client
        .peer_uid
        .map(|u| u.to_string())
        .unwrap_or_else(|| "nil".to_string());
    Some(format!(
        "(:type :response :id {} :status :ok :client-id {} :peer-uid {} :rate-limit {})",
        msg_id, client_id, uid, client.rate_limiter.max_per_second
    ))
}

fn handle_ipc_rate_limit(
    state: &mut DaemonState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let new_limit = match get_int(value, "limit") {
        Some(n) if n > 0 && n <= 10000 => n as u32,
        Some(_) => return Some(error_response(msg_id, "limit must be 1-10000")),
        None => return Some(error_response(msg_id, "missing :limit parameter")),
    };

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.rate_limiter.max_per_second = new_limit;
        debug!(client_id, new_limit, "rate limit updated");
    }
    Some(ok_response(msg_id))
}
