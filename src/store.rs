use rusqlite::ffi::ErrorCode;
use thiserror::Error;

/// Domain errors shared by the group store, schema store and member data
/// engine. Handlers map these onto IPC error envelopes via their `code`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("a column named '{name}' already exists in the {sign} table")]
    DuplicateField { name: String, sign: String },

    #[error("a group titled '{title}' already exists")]
    DuplicateTitle { title: String },

    #[error("column '{name}' not found")]
    FieldNotFound { name: String },

    /// Covers both genuinely missing groups and groups owned by someone
    /// else; callers cannot tell the two apart.
    #[error("group not found")]
    GroupNotFound,

    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation_failed",
            StoreError::DuplicateField { .. } => "duplicate_field",
            StoreError::DuplicateTitle { .. } => "duplicate_title",
            StoreError::FieldNotFound { .. } => "field_not_found",
            StoreError::GroupNotFound => "not_found",
            StoreError::Corrupt(_) => "db_failed",
            StoreError::Db(_) => "db_failed",
        }
    }

    pub fn validation(msg: impl Into<String>) -> StoreError {
        StoreError::Validation(msg.into())
    }
}

/// True when a rusqlite error is a UNIQUE/PRIMARY KEY constraint failure.
/// Races on the (group, name, sign) and title constraints land here rather
/// than in the pre-checks.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

/// RFC 3339 UTC timestamp for created_at/updated_at columns.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(
            StoreError::validation("empty member list").code(),
            "validation_failed"
        );
        assert_eq!(
            StoreError::DuplicateField {
                name: "homework".to_string(),
                sign: "positive".to_string(),
            }
            .code(),
            "duplicate_field"
        );
        assert_eq!(
            StoreError::FieldNotFound {
                name: "homework".to_string(),
            }
            .code(),
            "field_not_found"
        );
        assert_eq!(StoreError::GroupNotFound.code(), "not_found");
    }

    #[test]
    fn duplicate_field_message_names_the_table() {
        let e = StoreError::DuplicateField {
            name: "effort".to_string(),
            sign: "negative".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "a column named 'effort' already exists in the negative table"
        );
    }

    #[test]
    fn unique_violation_detection() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE t(v TEXT UNIQUE)", []).expect("create");
        conn.execute("INSERT INTO t(v) VALUES('a')", []).expect("first");
        let err = conn
            .execute("INSERT INTO t(v) VALUES('a')", [])
            .expect_err("duplicate insert must fail");
        assert!(is_unique_violation(&err));
        let not_unique = conn
            .execute("INSERT INTO missing(v) VALUES('a')", [])
            .expect_err("bad table");
        assert!(!is_unique_violation(&not_unique));
    }
}
