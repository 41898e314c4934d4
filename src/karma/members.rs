use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{now, StoreError};

use super::value::{self, FieldMap};
use super::{Sign, ValueType};

/// A member row with its sparse scoring mappings decoded.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub color: String,
    pub sort_order: i64,
    pub positive_data: FieldMap,
    pub negative_data: FieldMap,
    pub positive_total: i64,
    pub negative_total: i64,
}

impl Member {
    pub fn data(&self, sign: Sign) -> &FieldMap {
        match sign {
            Sign::Positive => &self.positive_data,
            Sign::Negative => &self.negative_data,
        }
    }

    fn data_mut(&mut self, sign: Sign) -> &mut FieldMap {
        match sign {
            Sign::Positive => &mut self.positive_data,
            Sign::Negative => &mut self.negative_data,
        }
    }
}

type RawRow = (String, String, String, String, i64, String, String, i64, i64);

const SELECT_COLS: &str =
    "id, group_id, name, color, sort_order, positive_data, negative_data, positive_total, negative_total";

fn from_raw(raw: RawRow) -> Result<Member, StoreError> {
    let (id, group_id, name, color, sort_order, positive, negative, positive_total, negative_total) =
        raw;
    Ok(Member {
        id,
        group_id,
        name,
        color,
        sort_order,
        positive_data: value::decode_map(&positive)?,
        negative_data: value::decode_map(&negative)?,
        positive_total,
        negative_total,
    })
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Members of a group in insertion order.
pub fn list(conn: &Connection, group_id: &str) -> Result<Vec<Member>, StoreError> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM members WHERE group_id = ? ORDER BY sort_order, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map([group_id], read_raw)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(from_raw).collect()
}

pub fn get(
    conn: &Connection,
    group_id: &str,
    member_id: &str,
) -> Result<Option<Member>, StoreError> {
    let sql = format!("SELECT {SELECT_COLS} FROM members WHERE group_id = ? AND id = ?");
    let raw = conn
        .query_row(&sql, (group_id, member_id), read_raw)
        .optional()?;
    raw.map(from_raw).transpose()
}

/// Insert a member row with pre-populated mappings. Used by the group sync.
pub fn insert(
    conn: &Connection,
    group_id: &str,
    name: &str,
    color: &str,
    sort_order: i64,
    positive_data: FieldMap,
    negative_data: FieldMap,
) -> Result<Member, StoreError> {
    let member = Member {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        sort_order,
        positive_total: value::map_total(&positive_data),
        negative_total: value::map_total(&negative_data),
        positive_data,
        negative_data,
    };
    let ts = now();
    conn.execute(
        "INSERT INTO members(id, group_id, name, color, sort_order,
                             positive_data, negative_data, positive_total, negative_total,
                             created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &member.id,
            &member.group_id,
            &member.name,
            &member.color,
            member.sort_order,
            value::encode_map(&member.positive_data)?,
            value::encode_map(&member.negative_data)?,
            member.positive_total,
            member.negative_total,
            &ts,
            &ts,
        ),
    )?;
    Ok(member)
}

/// Write back a member's mappings and totals.
fn persist_data(conn: &Connection, member: &Member) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE members
         SET positive_data = ?, negative_data = ?, positive_total = ?, negative_total = ?, updated_at = ?
         WHERE id = ?",
        (
            value::encode_map(&member.positive_data)?,
            value::encode_map(&member.negative_data)?,
            member.positive_total,
            member.negative_total,
            now(),
            &member.id,
        ),
    )?;
    Ok(())
}

/// Replace whichever mappings are provided (sanitized), recompute both
/// totals, persist. Orphan keys — present in data with no matching column —
/// are deliberately left alone.
pub fn update_member_data(
    conn: &Connection,
    member: &mut Member,
    positive_data: Option<FieldMap>,
    negative_data: Option<FieldMap>,
) -> Result<(), StoreError> {
    if let Some(data) = positive_data {
        member.positive_data = value::sanitize_map(data);
    }
    if let Some(data) = negative_data {
        member.negative_data = value::sanitize_map(data);
    }
    member.positive_total = value::map_total(&member.positive_data);
    member.negative_total = value::map_total(&member.negative_data);
    persist_data(conn, member)?;
    debug!(
        "updated member {}: +{}/-{}",
        member.name, member.positive_total, member.negative_total
    );
    Ok(())
}

/// Seed `name` into every member's mapping for `sign`, defaulting numeric
/// columns to 0 and text columns to "". Members that already carry the key
/// keep their value. Runs inside the caller's transaction.
pub fn add_field_to_members(
    conn: &Connection,
    group_id: &str,
    name: &str,
    value_type: ValueType,
    sign: Sign,
) -> Result<usize, StoreError> {
    let mut members = list(conn, group_id)?;
    for member in &mut members {
        let data = member.data_mut(sign);
        if !data.contains_key(name) {
            data.insert(name.to_string(), value_type.default_value());
        }
        member.positive_total = value::map_total(&member.positive_data);
        member.negative_total = value::map_total(&member.negative_data);
        persist_data(conn, member)?;
    }
    info!("added column '{}' to {} members", name, members.len());
    Ok(members.len())
}

/// Drop `name` from every member's mapping for `sign` (no error when a
/// member never had it) and recompute totals. Runs inside the caller's
/// transaction; the caller also deletes the column definition there.
pub fn remove_field_from_members(
    conn: &Connection,
    group_id: &str,
    name: &str,
    sign: Sign,
) -> Result<usize, StoreError> {
    let mut members = list(conn, group_id)?;
    for member in &mut members {
        member.data_mut(sign).remove(name);
        member.positive_total = value::map_total(&member.positive_data);
        member.negative_total = value::map_total(&member.negative_data);
        persist_data(conn, member)?;
    }
    info!("removed column '{}' from {} members", name, members.len());
    Ok(members.len())
}

/// Move each member's `old_name` entry to `new_name`, preserving the value
/// exactly (non-numeric values included). Members without the key are
/// silently skipped. Runs inside the caller's transaction.
pub fn rename_field_for_members(
    conn: &Connection,
    group_id: &str,
    old_name: &str,
    new_name: &str,
    sign: Sign,
) -> Result<usize, StoreError> {
    let mut members = list(conn, group_id)?;
    let mut renamed = 0usize;
    for member in &mut members {
        let data = member.data_mut(sign);
        if let Some(v) = data.remove(old_name) {
            data.insert(new_name.to_string(), v);
            renamed += 1;
            persist_data(conn, member)?;
        }
    }
    info!(
        "renamed column '{}' to '{}' for {} members",
        old_name, new_name, renamed
    );
    Ok(renamed)
}

/// Recompute every member's totals from its stored mappings. Data-integrity
/// utility; returns the member count.
pub fn recalculate_totals(conn: &Connection, group_id: &str) -> Result<usize, StoreError> {
    let mut members = list(conn, group_id)?;
    for member in &mut members {
        member.positive_total = value::map_total(&member.positive_data);
        member.negative_total = value::map_total(&member.negative_data);
        persist_data(conn, member)?;
    }
    info!("recalculated totals for {} members", members.len());
    Ok(members.len())
}
