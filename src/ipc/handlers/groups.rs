use crate::groups;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{raw_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::karma::{members, value};
use serde_json::json;
use tracing::info;

fn group_json(g: &groups::Group) -> serde_json::Value {
    json!({
        "id": g.id,
        "title": g.title,
        "membersText": g.members_text,
        "size": g.size,
        "createdAt": g.created_at,
    })
}

fn sync_json(o: groups::SyncOutcome) -> serde_json::Value {
    json!({
        "size": o.size,
        "created": o.created,
        "removed": o.removed,
    })
}

fn member_json(m: &members::Member) -> serde_json::Value {
    json!({
        "id": m.id,
        "name": m.name,
        "color": m.color,
        "positiveData": value::map_json(&m.positive_data),
        "negativeData": value::map_json(&m.negative_data),
        "positiveTotal": m.positive_total,
        "negativeTotal": m.negative_total,
    })
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match groups::list(conn, &owner_id) {
        Ok(rows) => ok(
            &req.id,
            json!({ "groups": rows.iter().map(group_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner_id = match required_str(req, "ownerId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match raw_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let members_text = match raw_str(req, "membersText") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let (group, outcome) = match groups::create(&tx, &owner_id, &title, &members_text) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    info!("created group {} with {} members", group.title, outcome.size);
    ok(
        &req.id,
        json!({ "group": group_json(&group), "sync": sync_json(outcome) }),
    )
}

fn handle_groups_update(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let title = req.params.get("title").and_then(|v| v.as_str());
    let members_text = req.params.get("membersText").and_then(|v| v.as_str());

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let (group, outcome) = match groups::update(&tx, &owner_id, &group_id, title, members_text) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };

    // Per-member color overrides ride along with the save. Unknown members
    // and empty values are skipped, not errors.
    if let Some(colors) = req.params.get("memberColors").and_then(|v| v.as_object()) {
        for (member_id, color) in colors {
            let Some(color) = color.as_str() else {
                continue;
            };
            if let Err(e) = groups::set_member_color(&tx, &group.id, member_id, color) {
                let _ = tx.rollback();
                return store_err(&req.id, &e);
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "group": group_json(&group), "sync": sync_json(outcome) }),
    )
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    if let Err(e) = groups::delete(&tx, &owner_id, &group_id) {
        let _ = tx.rollback();
        return store_err(&req.id, &e);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    info!("deleted group {}", group_id);
    ok(&req.id, json!({ "deleted": true }))
}

fn handle_groups_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let outcome = match groups::fetch_owned(&tx, &owner_id, &group_id)
        .and_then(|group| groups::sync_members(&tx, &group))
    {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    info!(
        "synced group {}: {} created, {} removed",
        group_id, outcome.created, outcome.removed
    );
    ok(&req.id, sync_json(outcome))
}

fn handle_groups_members(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match members::list(conn, &group.id) {
        Ok(rows) => ok(
            &req.id,
            json!({ "members": rows.iter().map(member_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.list" => Some(handle_groups_list(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.update" => Some(handle_groups_update(state, req)),
        "groups.delete" => Some(handle_groups_delete(state, req)),
        "groups.sync" => Some(handle_groups_sync(state, req)),
        "groups.members" => Some(handle_groups_members(state, req)),
        _ => None,
    }
}
