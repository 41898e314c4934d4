pub mod fields;
pub mod members;
pub mod ranking;
pub mod value;

pub use value::{FieldMap, FieldValue};

/// Which of a member's two scoring mappings a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    pub fn as_str(self) -> &'static str {
        match self {
            Sign::Positive => "positive",
            Sign::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Sign> {
        match s {
            "positive" => Some(Sign::Positive),
            "negative" => Some(Sign::Negative),
            _ => None,
        }
    }

    /// The key separator used by score-entry form keys:
    /// `{memberId}_positive_{column}` / `{memberId}_negative_{column}`.
    pub fn entry_marker(self) -> &'static str {
        match self {
            Sign::Positive => "_positive_",
            Sign::Negative => "_negative_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Text,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<ValueType> {
        match s {
            "number" => Some(ValueType::Number),
            "text" => Some(ValueType::Text),
            _ => None,
        }
    }

    /// Default cell value when a column of this type is added to a member.
    pub fn default_value(self) -> FieldValue {
        match self {
            ValueType::Number => FieldValue::Number(0),
            ValueType::Text => FieldValue::Text(String::new()),
        }
    }
}
