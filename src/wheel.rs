use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension};

use crate::store::{now, StoreError};

/// Pick a random name that has not been picked this round. When the round is
/// spent (every name already appears in `already`), the list is wiped and a
/// fresh round starts from the full roster. Returns `None` only for an empty
/// roster.
///
/// Matching is by value: once "John" is drawn, every member named John is off
/// the wheel for the rest of the round.
pub fn draw(names: &[String], already: &mut Vec<String>) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let mut remaining: Vec<&String> = names.iter().filter(|n| !already.contains(n)).collect();
    if remaining.is_empty() {
        already.clear();
        remaining = names.iter().collect();
    }
    let chosen = (*remaining.choose(&mut rand::thread_rng())?).clone();
    already.push(chosen.clone());
    Some(chosen)
}

/// The stored pick list for one owner's round on one group. Missing row
/// reads as an empty round.
pub fn load_picks(
    conn: &Connection,
    group_id: &str,
    owner_id: &str,
) -> Result<Vec<String>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT picked_names FROM wheel_picks WHERE group_id = ? AND owner_id = ?",
            (group_id, owner_id),
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| StoreError::Corrupt(format!("pick list is not valid JSON: {e}"))),
    }
}

pub fn save_picks(
    conn: &Connection,
    group_id: &str,
    owner_id: &str,
    picks: &[String],
) -> Result<(), StoreError> {
    let encoded = serde_json::to_string(picks)
        .map_err(|e| StoreError::Corrupt(format!("pick list failed to encode: {e}")))?;
    conn.execute(
        "INSERT INTO wheel_picks(group_id, owner_id, picked_names, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(group_id, owner_id) DO UPDATE SET
             picked_names = excluded.picked_names,
             updated_at = excluded.updated_at",
        (group_id, owner_id, encoded, now()),
    )?;
    Ok(())
}

/// Drop every pick list the owner has, across all groups. Returns how many
/// rounds were cleared.
pub fn reset_owner(conn: &Connection, owner_id: &str) -> Result<usize, StoreError> {
    let n = conn.execute("DELETE FROM wheel_picks WHERE owner_id = ?", [owner_id])?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn draw_avoids_already_chosen_names() {
        let roster = names(&["Alice", "Bob", "Carol"]);
        let mut already = names(&["Alice", "Carol"]);
        let chosen = draw(&roster, &mut already).expect("draw");
        assert_eq!(chosen, "Bob");
        assert_eq!(already, names(&["Alice", "Carol", "Bob"]));
    }

    #[test]
    fn duplicate_names_leave_the_wheel_together() {
        let roster = names(&["John", "John", "Alice"]);
        let mut already = names(&["John"]);
        let chosen = draw(&roster, &mut already).expect("draw");
        assert_eq!(chosen, "Alice");
    }

    #[test]
    fn spent_round_restarts_from_the_full_roster() {
        let roster = names(&["Alice", "Bob"]);
        let mut already = names(&["Bob", "Alice"]);
        let chosen = draw(&roster, &mut already).expect("draw");
        assert!(roster.contains(&chosen));
        assert_eq!(already, vec![chosen]);
    }

    #[test]
    fn empty_roster_draws_nothing() {
        let mut already = Vec::new();
        assert!(draw(&[], &mut already).is_none());
        assert!(already.is_empty());
    }

    #[test]
    fn full_round_covers_everyone_once() {
        let roster = names(&["Alice", "Bob", "Carol", "Dave"]);
        let mut already = Vec::new();
        for _ in 0..roster.len() {
            draw(&roster, &mut already).expect("draw");
        }
        let mut seen = already.clone();
        seen.sort();
        let mut want = roster.clone();
        want.sort();
        assert_eq!(seen, want);
    }

    #[test]
    fn picks_persist_per_group_and_owner() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO groups(id, owner_id, title, members_text, size, created_at, updated_at)
             VALUES('g1', 'u1', 'A', 'x', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z'),
                   ('g2', 'u1', 'B', 'x', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .expect("seed groups");

        assert!(load_picks(&conn, "g1", "u1").expect("load").is_empty());

        save_picks(&conn, "g1", "u1", &names(&["Alice"])).expect("save");
        save_picks(&conn, "g1", "u1", &names(&["Alice", "Bob"])).expect("overwrite");
        save_picks(&conn, "g2", "u1", &names(&["Carol"])).expect("save");
        save_picks(&conn, "g1", "u2", &names(&["Dave"])).expect("save");

        assert_eq!(
            load_picks(&conn, "g1", "u1").expect("load"),
            names(&["Alice", "Bob"])
        );

        let cleared = reset_owner(&conn, "u1").expect("reset");
        assert_eq!(cleared, 2);
        assert!(load_picks(&conn, "g1", "u1").expect("load").is_empty());
        assert!(load_picks(&conn, "g2", "u1").expect("load").is_empty());
        assert_eq!(load_picks(&conn, "g1", "u2").expect("load"), names(&["Dave"]));
    }
}
