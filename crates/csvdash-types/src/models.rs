use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A stored CSV file as listed by the server. The server is the source of
/// truth; clients only hold a cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub file_size: u64,
    pub uploader_id: i64,
    pub uploader_username: String,
    pub uploaded_at: NaiveDateTime,
}

/// One CSV row keyed by header.
pub type CsvRow = Map<String, Value>;

/// Parsed contents of a CSV file, already truncated server-side to the
/// requested row limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvView {
    pub filename: String,
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
    pub total_rows: usize,
    pub displayed_rows: usize,
}

impl CsvView {
    /// Text of a single cell. Missing and null cells render as "".
    pub fn cell(row: &CsvRow, header: &str) -> String {
        match row.get(header) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
