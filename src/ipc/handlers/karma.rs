use crate::groups;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{raw_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::karma::{fields, members, ranking, value, FieldValue, Sign, ValueType};
use serde_json::json;

fn field_json(d: &fields::FieldDefinition) -> serde_json::Value {
    json!({
        "id": d.id,
        "name": d.name,
        "type": d.value_type.as_str(),
        "sign": d.sign.as_str(),
    })
}

/// Member rendering for the dashboard: totals recomputed from the mappings
/// rather than read from the stored columns.
fn member_display_json(m: &members::Member) -> serde_json::Value {
    json!({
        "id": m.id,
        "name": m.name,
        "color": m.color,
        "positiveData": value::map_json(&m.positive_data),
        "negativeData": value::map_json(&m.negative_data),
        "positiveTotal": value::map_total(&m.positive_data),
        "negativeTotal": value::map_total(&m.negative_data),
    })
}

fn parse_sign(req: &Request) -> Result<Sign, serde_json::Value> {
    let raw = required_str(req, "sign")?;
    Sign::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "sign must be positive or negative",
            None,
        )
    })
}

fn handle_karma_open(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let roster = match members::list(conn, &group.id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let defs = match fields::list(conn, &group.id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };

    let positive_fields: Vec<_> = defs
        .iter()
        .filter(|d| d.sign == Sign::Positive)
        .map(field_json)
        .collect();
    let negative_fields: Vec<_> = defs
        .iter()
        .filter(|d| d.sign == Sign::Negative)
        .map(field_json)
        .collect();

    ok(
        &req.id,
        json!({
            "group": {
                "id": group.id,
                "title": group.title,
                "membersText": group.members_text,
                "size": group.size,
                "createdAt": group.created_at,
            },
            "members": roster.iter().map(member_display_json).collect::<Vec<_>>(),
            "positiveFields": positive_fields,
            "negativeFields": negative_fields,
        }),
    )
}

fn handle_fields_add(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let name = match raw_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let type_raw = match required_str(req, "type") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(value_type) = ValueType::parse(&type_raw) else {
        return err(&req.id, "bad_params", "type must be number or text", None);
    };
    let sign = match parse_sign(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let group = match groups::fetch_owned(&tx, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    let def = match fields::create(&tx, &group.id, &name, value_type, sign) {
        Ok(d) => d,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    let updated = match members::add_field_to_members(&tx, &group.id, &def.name, value_type, sign)
    {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "field": field_json(&def), "membersUpdated": updated }),
    )
}

fn handle_fields_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let old_name = match required_str(req, "oldName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new_name = match raw_str(req, "newName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sign = match parse_sign(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let group = match groups::fetch_owned(&tx, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    let def = match fields::rename(&tx, &group.id, &old_name, &new_name, sign) {
        Ok(d) => d,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    // Renaming a column to its own name changes no member data.
    let renamed = if def.name == old_name {
        0
    } else {
        match members::rename_field_for_members(&tx, &group.id, &old_name, &def.name, sign) {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.rollback();
                return store_err(&req.id, &e);
            }
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "field": field_json(&def), "membersRenamed": renamed }),
    )
}

fn handle_fields_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sign = match parse_sign(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let group = match groups::fetch_owned(&tx, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    // Existence check first, then the member fan-out, all in one transaction.
    if let Err(e) = fields::delete(&tx, &group.id, &name, sign) {
        let _ = tx.rollback();
        return store_err(&req.id, &e);
    }
    let updated = match members::remove_field_from_members(&tx, &group.id, &name, sign) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "removed": true, "membersUpdated": updated }),
    )
}

fn handle_scores_save(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let sign = match parse_sign(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing entries", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let group = match groups::fetch_owned(&tx, &owner_id, &group_id) {
        Ok(g) => g,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    let roster = match members::list(&tx, &group.id) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };

    // Form-style keys: {memberId}_{sign}_{columnName}, split on the first
    // marker so column names may contain underscores. Keys for unknown
    // columns or other members are ignored; every member is re-persisted.
    let mut updated = 0usize;
    for mut member in roster {
        let mut data = member.data(sign).clone();
        let prefix = format!("{}{}", member.id, sign.entry_marker());
        for (key, raw) in entries {
            let Some(column) = key.strip_prefix(&prefix) else {
                continue;
            };
            if !data.contains_key(column) {
                continue;
            }
            let parsed = match FieldValue::from_json(raw) {
                Ok(v) => v,
                Err(e) => {
                    let _ = tx.rollback();
                    return store_err(&req.id, &e);
                }
            };
            data.insert(column.to_string(), parsed);
        }
        let result = match sign {
            Sign::Positive => members::update_member_data(&tx, &mut member, Some(data), None),
            Sign::Negative => members::update_member_data(&tx, &mut member, None, Some(data)),
        };
        if let Err(e) = result {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
        updated += 1;
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "membersUpdated": updated }))
}

fn handle_karma_totals(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let totals = match groups::fetch_owned(conn, &owner_id, &group_id)
        .and_then(|group| ranking::group_totals(conn, &group.id))
    {
        Ok(t) => t,
        Err(e) => return store_err(&req.id, &e),
    };
    ok(
        &req.id,
        json!({
            "totalPositive": totals.total_positive,
            "totalNegative": totals.total_negative,
            "netTotal": totals.net_total,
            "memberCount": totals.member_count,
        }),
    )
}

fn handle_karma_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let order = ranking::RankOrder::parse(req.params.get("orderBy").and_then(|v| v.as_str()));

    let rows = match groups::fetch_owned(conn, &owner_id, &group_id)
        .and_then(|group| ranking::member_ranking(conn, &group.id, order))
    {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let ranking_rows: Vec<_> = rows
        .iter()
        .map(|r| {
            json!({
                "memberId": r.member_id,
                "name": r.name,
                "positiveTotal": r.positive_total,
                "negativeTotal": r.negative_total,
                "netTotal": r.net_total,
                "rank": r.rank,
            })
        })
        .collect();
    ok(
        &req.id,
        json!({ "orderBy": order.as_str(), "ranking": ranking_rows }),
    )
}

fn handle_karma_recalculate(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let updated = match groups::fetch_owned(&tx, &owner_id, &group_id)
        .and_then(|group| members::recalculate_totals(&tx, &group.id))
    {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return store_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "membersUpdated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "karma.open" => Some(handle_karma_open(state, req)),
        "karma.scores.save" => Some(handle_scores_save(state, req)),
        "karma.fields.add" => Some(handle_fields_add(state, req)),
        "karma.fields.rename" => Some(handle_fields_rename(state, req)),
        "karma.fields.remove" => Some(handle_fields_remove(state, req)),
        "karma.totals" => Some(handle_karma_totals(state, req)),
        "karma.ranking" => Some(handle_karma_ranking(state, req)),
        "karma.recalculate" => Some(handle_karma_recalculate(state, req)),
        _ => None,
    }
}
