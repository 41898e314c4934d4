use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, Counter, TimerKind};
use serde_json::json;

fn handle_timer_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind_raw = match required_str(req, "kind") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(kind) = TimerKind::parse(&kind_raw) else {
        return err(&req.id, "bad_params", "kind must be stopwatch or countdown", None);
    };
    let action = match required_str(req, "action") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let elapsed_ms = req
        .params
        .get("elapsedMs")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let result = match (kind, action.as_str()) {
        (TimerKind::Stopwatch, "start") => stats::increment(conn, &owner_id, Counter::StopwatchStarts),
        (TimerKind::Stopwatch, "flag") => stats::increment(conn, &owner_id, Counter::StopwatchFlags),
        (TimerKind::Countdown, "start") => stats::increment(conn, &owner_id, Counter::CountdownStarts),
        (_, "stop") => stats::add_elapsed(conn, &owner_id, kind, elapsed_ms),
        _ => {
            return err(
                &req.id,
                "bad_params",
                format!("unsupported action for {}: {}", kind_raw, action),
                None,
            );
        }
    };
    if let Err(e) = result {
        return store_err(&req.id, &e);
    }
    ok(&req.id, json!({ "recorded": true }))
}

fn handle_stats_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match stats::get(conn, &owner_id) {
        Ok(s) => ok(
            &req.id,
            json!({
                "calculatorUses": s.calculator_uses,
                "wheelSpins": s.wheel_spins,
                "dividerUses": s.divider_uses,
                "stopwatchStarts": s.stopwatch_starts,
                "stopwatchFlags": s.stopwatch_flags,
                "stopwatchTotalMs": s.stopwatch_total_ms,
                "countdownStarts": s.countdown_starts,
                "countdownTotalMs": s.countdown_total_ms,
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timer.record" => Some(handle_timer_record(state, req)),
        "stats.get" => Some(handle_stats_get(state, req)),
        _ => None,
    }
}
