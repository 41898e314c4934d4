use rusqlite::Connection;
use uuid::Uuid;

use crate::store::{is_unique_violation, now, StoreError};

use super::{Sign, ValueType};

pub const MAX_FIELD_NAME_LEN: usize = 100;

/// A named, typed, signed scoring column scoped to one group.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub value_type: ValueType,
    pub sign: Sign,
}

fn validated_name(raw: &str) -> Result<String, StoreError> {
    let name = raw.trim().to_string();
    if name.is_empty() {
        return Err(StoreError::validation("column name must not be empty"));
    }
    if name.chars().count() > MAX_FIELD_NAME_LEN {
        return Err(StoreError::validation(
            "column name must be 100 characters or fewer",
        ));
    }
    Ok(name)
}

fn collect<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<FieldDefinition>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(raw.len());
    for (id, group_id, name, value_type, sign) in raw {
        out.push(FieldDefinition {
            id,
            group_id,
            name,
            value_type: ValueType::parse(&value_type)
                .ok_or_else(|| StoreError::Corrupt(format!("bad value type '{value_type}'")))?,
            sign: Sign::parse(&sign)
                .ok_or_else(|| StoreError::Corrupt(format!("bad sign '{sign}'")))?,
        });
    }
    Ok(out)
}

/// All definitions of a group, creation order.
pub fn list(conn: &Connection, group_id: &str) -> Result<Vec<FieldDefinition>, StoreError> {
    collect(
        conn,
        "SELECT id, group_id, name, value_type, sign
         FROM field_definitions
         WHERE group_id = ?
         ORDER BY created_at, rowid",
        [group_id],
    )
}

/// Definitions of one sign, creation order. Column order on the dashboard.
pub fn list_for_sign(
    conn: &Connection,
    group_id: &str,
    sign: Sign,
) -> Result<Vec<FieldDefinition>, StoreError> {
    collect(
        conn,
        "SELECT id, group_id, name, value_type, sign
         FROM field_definitions
         WHERE group_id = ? AND sign = ?
         ORDER BY created_at, rowid",
        (group_id, sign.as_str()),
    )
}

pub fn get(
    conn: &Connection,
    group_id: &str,
    name: &str,
    sign: Sign,
) -> Result<Option<FieldDefinition>, StoreError> {
    let found = collect(
        conn,
        "SELECT id, group_id, name, value_type, sign
         FROM field_definitions
         WHERE group_id = ? AND name = ? AND sign = ?",
        (group_id, name, sign.as_str()),
    )?;
    Ok(found.into_iter().next())
}

/// Add a column definition. The (group, name, sign) pre-check gives the
/// friendly error; the UNIQUE constraint catches races behind it.
pub fn create(
    conn: &Connection,
    group_id: &str,
    name: &str,
    value_type: ValueType,
    sign: Sign,
) -> Result<FieldDefinition, StoreError> {
    let name = validated_name(name)?;

    if get(conn, group_id, &name, sign)?.is_some() {
        return Err(StoreError::DuplicateField {
            name,
            sign: sign.as_str().to_string(),
        });
    }

    let def = FieldDefinition {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        name,
        value_type,
        sign,
    };
    let ts = now();
    let inserted = conn.execute(
        "INSERT INTO field_definitions(id, group_id, name, value_type, sign, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &def.id,
            &def.group_id,
            &def.name,
            def.value_type.as_str(),
            def.sign.as_str(),
            &ts,
            &ts,
        ),
    );
    match inserted {
        Ok(_) => Ok(def),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateField {
            name: def.name,
            sign: sign.as_str().to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Rename a definition in place. Renaming a column to its own name is a
/// successful no-op.
pub fn rename(
    conn: &Connection,
    group_id: &str,
    old_name: &str,
    new_name: &str,
    sign: Sign,
) -> Result<FieldDefinition, StoreError> {
    let new_name = validated_name(new_name)?;

    let Some(def) = get(conn, group_id, old_name, sign)? else {
        return Err(StoreError::FieldNotFound {
            name: old_name.to_string(),
        });
    };
    if def.name == new_name {
        return Ok(def);
    }
    if get(conn, group_id, &new_name, sign)?.is_some() {
        return Err(StoreError::DuplicateField {
            name: new_name,
            sign: sign.as_str().to_string(),
        });
    }

    let updated = conn.execute(
        "UPDATE field_definitions SET name = ?, updated_at = ? WHERE id = ?",
        (&new_name, &now(), &def.id),
    );
    match updated {
        Ok(_) => Ok(FieldDefinition {
            name: new_name,
            ..def
        }),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateField {
            name: new_name,
            sign: sign.as_str().to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Delete a definition. Member data cleanup is the engine's job, performed
/// by the caller in the same transaction.
pub fn delete(
    conn: &Connection,
    group_id: &str,
    name: &str,
    sign: Sign,
) -> Result<(), StoreError> {
    let deleted = conn.execute(
        "DELETE FROM field_definitions WHERE group_id = ? AND name = ? AND sign = ?",
        (group_id, name, sign.as_str()),
    )?;
    if deleted == 0 {
        return Err(StoreError::FieldNotFound {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO groups(id, owner_id, title, members_text, size, created_at, updated_at)
             VALUES('g1', 'u1', 'Test Group', 'Alice, Bob', 2, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .expect("seed group");
        conn
    }

    #[test]
    fn same_name_allowed_across_signs_but_not_within() {
        let conn = test_conn();
        create(&conn, "g1", "effort", ValueType::Number, Sign::Positive).expect("positive");
        create(&conn, "g1", "effort", ValueType::Number, Sign::Negative).expect("negative");

        let dup = create(&conn, "g1", "effort", ValueType::Number, Sign::Positive);
        assert!(matches!(dup, Err(StoreError::DuplicateField { .. })));
    }

    #[test]
    fn rename_checks_both_ends() {
        let conn = test_conn();
        create(&conn, "g1", "homework", ValueType::Number, Sign::Positive).expect("add");
        create(&conn, "g1", "effort", ValueType::Number, Sign::Positive).expect("add");

        let missing = rename(&conn, "g1", "nope", "other", Sign::Positive);
        assert!(matches!(missing, Err(StoreError::FieldNotFound { .. })));

        let clash = rename(&conn, "g1", "homework", "effort", Sign::Positive);
        assert!(matches!(clash, Err(StoreError::DuplicateField { .. })));

        // Renaming to the same name succeeds without touching anything.
        let noop = rename(&conn, "g1", "homework", "homework", Sign::Positive).expect("noop");
        assert_eq!(noop.name, "homework");

        let renamed =
            rename(&conn, "g1", "homework", "assignments", Sign::Positive).expect("rename");
        assert_eq!(renamed.name, "assignments");
        assert!(get(&conn, "g1", "homework", Sign::Positive)
            .expect("get")
            .is_none());
    }

    #[test]
    fn delete_of_missing_column_is_field_not_found() {
        let conn = test_conn();
        let gone = delete(&conn, "g1", "homework", Sign::Positive);
        assert!(matches!(gone, Err(StoreError::FieldNotFound { .. })));
    }

    #[test]
    fn name_validation() {
        let conn = test_conn();
        assert!(matches!(
            create(&conn, "g1", "   ", ValueType::Text, Sign::Positive),
            Err(StoreError::Validation(_))
        ));
        let long = "x".repeat(101);
        assert!(matches!(
            create(&conn, "g1", &long, ValueType::Text, Sign::Positive),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn list_orders_by_creation() {
        let conn = test_conn();
        // Same-timestamp inserts fall back to rowid order.
        create(&conn, "g1", "first", ValueType::Number, Sign::Positive).expect("a");
        create(&conn, "g1", "second", ValueType::Text, Sign::Positive).expect("b");
        create(&conn, "g1", "other", ValueType::Number, Sign::Negative).expect("c");

        let names: Vec<String> = list_for_sign(&conn, "g1", Sign::Positive)
            .expect("list")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(list(&conn, "g1").expect("all").len(), 3);
    }
}
