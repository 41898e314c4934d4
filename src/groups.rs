use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::karma::value::FieldMap;
use crate::karma::{fields, members, Sign};
use crate::store::{is_unique_violation, now, StoreError};

pub const MAX_TITLE_LEN: usize = 100;

/// Display palette for member rows. New members take colors round-robin,
/// indexed by how many members the group already has when they are inserted.
pub const MEMBER_COLORS: [&str; 30] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4",
    "#46f0f0", "#f032e6", "#bcf60c", "#fabebe", "#008080", "#e6beff",
    "#9a6324", "#fffac8", "#800000", "#aaffc3", "#808000", "#ffd8b1",
    "#000075", "#808080", "#1779db", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf", "#ff7f0e",
];

#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub members_text: String,
    pub size: i64,
    pub created_at: String,
}

/// What a sync did: parsed size plus create/delete counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub size: usize,
    pub created: usize,
    pub removed: usize,
}

/// Split a free-form name list: newlines count as commas, entries are
/// trimmed, empties dropped. Duplicates are kept — the result is an ordered
/// multiset.
pub fn parse_member_names(text: &str) -> Vec<String> {
    text.replace('\n', ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validated_title(raw: &str) -> Result<String, StoreError> {
    let title = raw.trim().to_string();
    if title.is_empty() {
        return Err(StoreError::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(StoreError::validation(
            "title must be 100 characters or fewer",
        ));
    }
    Ok(title)
}

fn read_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        members_text: row.get(3)?,
        size: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const GROUP_COLS: &str = "id, owner_id, title, members_text, size, created_at";

/// Look up a group by id, filtered by owner. A group that exists but
/// belongs to someone else reads exactly like a missing one.
pub fn fetch_owned(
    conn: &Connection,
    owner_id: &str,
    group_id: &str,
) -> Result<Group, StoreError> {
    let sql = format!("SELECT {GROUP_COLS} FROM groups WHERE id = ? AND owner_id = ?");
    conn.query_row(&sql, (group_id, owner_id), read_group)
        .optional()?
        .ok_or(StoreError::GroupNotFound)
}

/// An owner's groups, newest first.
pub fn list(conn: &Connection, owner_id: &str) -> Result<Vec<Group>, StoreError> {
    let sql = format!(
        "SELECT {GROUP_COLS} FROM groups WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([owner_id], read_group)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Create a group and run the first member sync. Callers wrap this in a
/// transaction so the group row and its member rows land together.
pub fn create(
    conn: &Connection,
    owner_id: &str,
    title: &str,
    members_text: &str,
) -> Result<(Group, SyncOutcome), StoreError> {
    let title = validated_title(title)?;
    let names = parse_member_names(members_text);
    if names.is_empty() {
        return Err(StoreError::validation(
            "at least one member name is required",
        ));
    }

    let group = Group {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        title,
        members_text: members_text.to_string(),
        size: names.len() as i64,
        created_at: now(),
    };
    let inserted = conn.execute(
        "INSERT INTO groups(id, owner_id, title, members_text, size, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &group.id,
            &group.owner_id,
            &group.title,
            &group.members_text,
            group.size,
            &group.created_at,
            &group.created_at,
        ),
    );
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(StoreError::DuplicateTitle { title: group.title });
        }
        return Err(e.into());
    }

    let outcome = sync_members(conn, &group)?;
    Ok((group, outcome))
}

/// Apply title/member-text changes and re-sync. The sync runs on every
/// successful save, changed text or not — it is idempotent.
pub fn update(
    conn: &Connection,
    owner_id: &str,
    group_id: &str,
    new_title: Option<&str>,
    new_members_text: Option<&str>,
) -> Result<(Group, SyncOutcome), StoreError> {
    let mut group = fetch_owned(conn, owner_id, group_id)?;
    if let Some(t) = new_title {
        group.title = validated_title(t)?;
    }
    if let Some(text) = new_members_text {
        group.members_text = text.to_string();
    }
    if parse_member_names(&group.members_text).is_empty() {
        return Err(StoreError::validation(
            "at least one member name is required",
        ));
    }

    let updated = conn.execute(
        "UPDATE groups SET title = ?, members_text = ?, updated_at = ? WHERE id = ?",
        (&group.title, &group.members_text, now(), &group.id),
    );
    if let Err(e) = updated {
        if is_unique_violation(&e) {
            return Err(StoreError::DuplicateTitle { title: group.title });
        }
        return Err(e.into());
    }

    let outcome = sync_members(conn, &group)?;
    // sync_members wrote the reconciled size to the row; mirror it on the
    // struct handed back to the caller.
    group.size = outcome.size as i64;
    Ok((group, outcome))
}

/// Dependency-order cascade delete. Callers wrap this in a transaction.
pub fn delete(conn: &Connection, owner_id: &str, group_id: &str) -> Result<(), StoreError> {
    fetch_owned(conn, owner_id, group_id)?;
    conn.execute("DELETE FROM wheel_picks WHERE group_id = ?", [group_id])?;
    conn.execute("DELETE FROM members WHERE group_id = ?", [group_id])?;
    conn.execute("DELETE FROM field_definitions WHERE group_id = ?", [group_id])?;
    conn.execute("DELETE FROM groups WHERE id = ?", [group_id])?;
    Ok(())
}

/// Override one member's display color. No-op for unknown members or empty
/// values; reports whether a row changed.
pub fn set_member_color(
    conn: &Connection,
    group_id: &str,
    member_id: &str,
    color: &str,
) -> Result<bool, StoreError> {
    let color = color.trim();
    if color.is_empty() {
        return Ok(false);
    }
    let n = conn.execute(
        "UPDATE members SET color = ?, updated_at = ? WHERE id = ? AND group_id = ?",
        (color, now(), member_id, group_id),
    )?;
    Ok(n > 0)
}

fn default_maps(conn: &Connection, group_id: &str) -> Result<(FieldMap, FieldMap), StoreError> {
    let mut positive = FieldMap::new();
    for def in fields::list_for_sign(conn, group_id, Sign::Positive)? {
        positive.insert(def.name, def.value_type.default_value());
    }
    let mut negative = FieldMap::new();
    for def in fields::list_for_sign(conn, group_id, Sign::Negative)? {
        negative.insert(def.name, def.value_type.default_value());
    }
    Ok((positive, negative))
}

/// Reconcile the group's Member rows against its parsed name list.
///
/// Multiset semantics: a name appearing N times in the text keeps exactly N
/// rows. Excess rows are deleted newest-first (same-named duplicates are
/// interchangeable until they carry distinct data), missing rows are created
/// in list order with mappings pre-populated from the current column
/// definitions and a palette color. Retained rows get missing column keys
/// backfilled. Idempotent: a second run with unchanged text is a no-op.
pub fn sync_members(conn: &Connection, group: &Group) -> Result<SyncOutcome, StoreError> {
    let names = parse_member_names(&group.members_text);
    let mut required: HashMap<&str, usize> = HashMap::new();
    for name in &names {
        *required.entry(name.as_str()).or_insert(0) += 1;
    }

    // Delete rows beyond each name's required count (and names gone
    // entirely). Rows arrive sorted oldest-first, so the tail is newest.
    let existing = members::list(conn, &group.id)?;
    let mut by_name: HashMap<&str, Vec<&members::Member>> = HashMap::new();
    for m in &existing {
        by_name.entry(m.name.as_str()).or_default().push(m);
    }
    let mut removed = 0usize;
    for (name, rows) in &by_name {
        let keep = required.get(name).copied().unwrap_or(0);
        for row in rows.iter().skip(keep) {
            conn.execute("DELETE FROM members WHERE id = ?", [&row.id])?;
            removed += 1;
            debug!("removed member {} from group {}", row.name, group.title);
        }
    }

    let (default_positive, default_negative) = default_maps(conn, &group.id)?;

    // Backfill column keys the survivors are missing, so every retained row
    // covers the current definitions. Totals are unaffected by defaults but
    // the persisted mapping must show the keys.
    let mut survivors = members::list(conn, &group.id)?;
    for member in &mut survivors {
        let mut changed = false;
        for (name, default) in &default_positive {
            if !member.positive_data.contains_key(name) {
                member.positive_data.insert(name.clone(), default.clone());
                changed = true;
            }
        }
        for (name, default) in &default_negative {
            if !member.negative_data.contains_key(name) {
                member.negative_data.insert(name.clone(), default.clone());
                changed = true;
            }
        }
        if changed {
            members::update_member_data(conn, member, None, None)?;
        }
    }

    // Create the deficit in list order; colors rotate from the live count.
    let mut have: HashMap<String, usize> = HashMap::new();
    for m in &survivors {
        *have.entry(m.name.clone()).or_insert(0) += 1;
    }
    let mut next_sort = survivors
        .iter()
        .map(|m| m.sort_order)
        .max()
        .map_or(0, |v| v + 1);
    let mut color_index = survivors.len();
    let mut created = 0usize;
    for name in &names {
        let h = have.entry(name.clone()).or_insert(0);
        if *h > 0 {
            *h -= 1;
            continue;
        }
        let color = MEMBER_COLORS[color_index % MEMBER_COLORS.len()];
        members::insert(
            conn,
            &group.id,
            name,
            color,
            next_sort,
            default_positive.clone(),
            default_negative.clone(),
        )?;
        debug!("created member {} in group {}", name, group.title);
        next_sort += 1;
        color_index += 1;
        created += 1;
    }

    conn.execute(
        "UPDATE groups SET size = ?, updated_at = ? WHERE id = ?",
        (names.len() as i64, now(), &group.id),
    )?;

    Ok(SyncOutcome {
        size: names.len(),
        created,
        removed,
    })
}
