use crate::divider;
use crate::gradecalc::{self, RoundingOption};
use crate::groups;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{required_f64, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::karma::members;
use crate::stats::{self, Counter};
use crate::wheel;
use serde_json::json;

fn handle_gradecalc_thresholds(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let max_points = match required_f64(req, "maxPoints") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let rounding_raw = match required_i64(req, "roundingOption") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let rounding = match RoundingOption::parse(rounding_raw) {
        Ok(r) => r,
        Err(e) => return store_err(&req.id, &e),
    };

    let grades = gradecalc::thresholds(max_points, rounding);
    if let Err(e) = stats::increment(conn, &owner_id, Counter::CalculatorUses) {
        return store_err(&req.id, &e);
    }

    // Per-cutoff rendering: whole values as integers, half-point bumps as
    // floats, so a mixed ladder reads 21, 19.5, 19, ...
    let rendered: Vec<serde_json::Value> = grades
        .iter()
        .map(|g| {
            if g.fract() == 0.0 {
                json!(*g as i64)
            } else {
                json!(g)
            }
        })
        .collect();
    ok(
        &req.id,
        json!({ "thresholds": rendered, "tooFewPoints": grades.is_empty() }),
    )
}

fn handle_divider_split(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let size = match required_i64(req, "size") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let group = match groups::fetch_owned(conn, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => return store_err(&req.id, &e),
    };
    let roster = match members::list(conn, &group.id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    // Negative sizes collapse to zero and fail the engine's >= 1 rule.
    let sub_groups = match divider::split(roster, size.max(0) as usize) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    if let Err(e) = stats::increment(conn, &owner_id, Counter::DividerUses) {
        return store_err(&req.id, &e);
    }

    let rendered: Vec<_> = sub_groups
        .iter()
        .map(|sg| {
            json!({
                "color": sg.color,
                "members": sg
                    .members
                    .iter()
                    .map(|m| json!({ "id": m.id, "name": m.name, "color": m.color }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    ok(&req.id, json!({ "subGroups": rendered }))
}

fn handle_wheel_spin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let group = match groups::fetch_owned(conn, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => return store_err(&req.id, &e),
    };
    let mut already = match wheel::load_picks(conn, &group.id, &owner_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };

    // Round over before drawing: the caller decides whether to reset.
    if already.len() as i64 >= group.size {
        return ok(
            &req.id,
            json!({ "allChosen": true, "alreadyChosen": already }),
        );
    }

    let names = groups::parse_member_names(&group.members_text);
    let Some(chosen) = wheel::draw(&names, &mut already) else {
        return ok(
            &req.id,
            json!({ "allChosen": true, "alreadyChosen": already }),
        );
    };
    if let Err(e) = wheel::save_picks(conn, &group.id, &owner_id, &already) {
        return store_err(&req.id, &e);
    }
    if let Err(e) = stats::increment(conn, &owner_id, Counter::WheelSpins) {
        return store_err(&req.id, &e);
    }

    ok(
        &req.id,
        json!({
            "chosenName": chosen,
            "alreadyChosen": already,
            "allChosen": false,
        }),
    )
}

fn handle_wheel_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match wheel::reset_owner(conn, &owner_id) {
        Ok(cleared) => ok(&req.id, json!({ "cleared": cleared })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradecalc.thresholds" => Some(handle_gradecalc_thresholds(state, req)),
        "divider.split" => Some(handle_divider_split(state, req)),
        "wheel.spin" => Some(handle_wheel_spin(state, req)),
        "wheel.reset" => Some(handle_wheel_reset(state, req)),
        _ => None,
    }
}
