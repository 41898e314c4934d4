use rusqlite::Connection;

use crate::store::StoreError;

/// Metric the ranking sorts by. Unknown strings fall back to `Net`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Net,
    Positive,
    Negative,
}

impl RankOrder {
    pub fn parse(s: Option<&str>) -> RankOrder {
        match s {
            Some("positive") => RankOrder::Positive,
            Some("negative") => RankOrder::Negative,
            _ => RankOrder::Net,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankOrder::Net => "net",
            RankOrder::Positive => "positive",
            RankOrder::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTotals {
    pub total_positive: i64,
    pub total_negative: i64,
    pub net_total: i64,
    pub member_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedMember {
    pub member_id: String,
    pub name: String,
    pub positive_total: i64,
    pub negative_total: i64,
    pub net_total: i64,
    pub rank: usize,
}

/// One stored-totals row per member, insertion order.
#[derive(Debug, Clone)]
pub struct MemberTotals {
    pub member_id: String,
    pub name: String,
    pub positive_total: i64,
    pub negative_total: i64,
}

pub fn totals_of(rows: &[MemberTotals]) -> GroupTotals {
    let mut totals = GroupTotals {
        member_count: rows.len(),
        ..GroupTotals::default()
    };
    for row in rows {
        totals.total_positive = totals.total_positive.saturating_add(row.positive_total);
        totals.total_negative = totals.total_negative.saturating_add(row.negative_total);
    }
    totals.net_total = totals.total_positive.saturating_sub(totals.total_negative);
    totals
}

/// Sort descending by the chosen metric and assign 1-based position ranks.
/// No tie-breaking: equal scores get consecutive distinct ranks, the stable
/// sort keeping their insertion order.
pub fn rank_rows(rows: Vec<MemberTotals>, order: RankOrder) -> Vec<RankedMember> {
    let mut scored: Vec<RankedMember> = rows
        .into_iter()
        .map(|r| RankedMember {
            net_total: r.positive_total.saturating_sub(r.negative_total),
            member_id: r.member_id,
            name: r.name,
            positive_total: r.positive_total,
            negative_total: r.negative_total,
            rank: 0,
        })
        .collect();

    match order {
        RankOrder::Positive => scored.sort_by(|a, b| b.positive_total.cmp(&a.positive_total)),
        RankOrder::Negative => scored.sort_by(|a, b| b.negative_total.cmp(&a.negative_total)),
        RankOrder::Net => scored.sort_by(|a, b| b.net_total.cmp(&a.net_total)),
    }

    for (i, entry) in scored.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    scored
}

fn load_totals(conn: &Connection, group_id: &str) -> Result<Vec<MemberTotals>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, positive_total, negative_total
         FROM members WHERE group_id = ? ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([group_id], |row| {
            Ok(MemberTotals {
                member_id: row.get(0)?,
                name: row.get(1)?,
                positive_total: row.get(2)?,
                negative_total: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Aggregate stored totals across a group. Single pass.
pub fn group_totals(conn: &Connection, group_id: &str) -> Result<GroupTotals, StoreError> {
    Ok(totals_of(&load_totals(conn, group_id)?))
}

pub fn member_ranking(
    conn: &Connection,
    group_id: &str,
    order: RankOrder,
) -> Result<Vec<RankedMember>, StoreError> {
    Ok(rank_rows(load_totals(conn, group_id)?, order))
}
