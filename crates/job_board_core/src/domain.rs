//! crates/job_board_core/src/domain.rs
//!
//! Defines the core data structures shared by the session, data-access and
//! connectivity layers. These types know nothing about a concrete backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::ports::{PortError, PortResult};

/// Name of the collection holding one profile record per signed-up identifier.
pub const USERS_COLLECTION: &str = "users";

/// Profile fields carrying the role claim.
pub const ROLE_FIELD: &str = "role";
pub const ROLE_PENDING_FIELD: &str = "rolePending";

/// Shortest password the identity backends accept.
pub const MIN_PASSWORD_LEN: usize = 6;

/// The stored fields of a schemaless document.
pub type Fields = serde_json::Map<String, Value>;

//=========================================================================================
// Identity
//=========================================================================================

/// The two kinds of account on the job board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employer,
    #[default]
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employer => "employer",
            Role::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employer" => Ok(Role::Employer),
            "employee" => Ok(Role::Employee),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The account as reported by the identity provider, before any profile data is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// The signed-in actor together with the role read from its profile record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    /// `None` when no profile record exists (or it could not be read).
    pub role: Option<Role>,
    /// True while `role` is the default handed out by a social sign-in and the
    /// user has not picked one yet.
    pub pending_role_selection: bool,
}

impl Principal {
    /// Combines the account with the role claims of its stored profile fields.
    /// Only `role` and `rolePending` are read; the rest of the record may have any shape.
    pub fn new(user: &AuthUser, profile: Option<&Fields>) -> Self {
        Self {
            uid: user.uid.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            photo_url: user.photo_url.clone(),
            role: profile.and_then(role_from_fields),
            pending_role_selection: profile
                .and_then(|fields| fields.get(ROLE_PENDING_FIELD))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Reads the `role` claim of a profile record. Absent or unknown roles are `None`.
pub fn role_from_fields(fields: &Fields) -> Option<Role> {
    fields.get(ROLE_FIELD)?.as_str()?.parse().ok()
}

/// The profile record stored under `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub role_pending: bool,
}

impl UserProfile {
    pub fn to_fields(&self) -> PortResult<Fields> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(PortError::Unexpected(
                "profile did not serialize to an object".to_string(),
            )),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    pub fn from_fields(fields: Fields) -> PortResult<Self> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| PortError::Unexpected(format!("malformed profile record: {}", e)))
    }
}

/// Loose shape check on an email address: a non-empty local part and a dotted domain.
pub fn is_well_formed_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

//=========================================================================================
// Documents and queries
//=========================================================================================

/// A stored document with its identifier kept apart from its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Flattens the document into one JSON object. The identifier is written last,
    /// so it wins over a stored `id` field.
    pub fn into_json(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// Comparison operators accepted in a [`QueryCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::ArrayContains => "array-contains",
            FilterOp::ArrayContainsAny => "array-contains-any",
            FilterOp::In => "in",
            FilterOp::NotIn => "not-in",
        }
    }

    /// Operators whose comparison value must be a list.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOp::In | FilterOp::NotIn | FilterOp::ArrayContainsAny
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown filter operator '{}'", s))
    }
}

/// A `(field, operator, value)` filter. Conditions in one query are ANDed.
///
/// On the wire a condition is the three-element array `["userId", "==", "u1"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, FilterOp, Value)", into = "(String, FilterOp, Value)")]
pub struct QueryCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl From<(String, FilterOp, Value)> for QueryCondition {
    fn from((field, op, value): (String, FilterOp, Value)) -> Self {
        Self { field, op, value }
    }
}

impl From<QueryCondition> for (String, FilterOp, Value) {
    fn from(c: QueryCondition) -> Self {
        (c.field, c.op, c.value)
    }
}

impl QueryCondition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// The dotted field path split into its segments.
    pub fn path(&self) -> Vec<&str> {
        self.field.split('.').collect()
    }

    /// Rejects conditions no backend can evaluate.
    pub fn validate(&self) -> PortResult<()> {
        if self.field.is_empty() || self.field.split('.').any(str::is_empty) {
            return Err(PortError::store(
                "invalid-argument",
                format!("invalid field path '{}'", self.field),
            ));
        }
        if self.op.takes_list() && !self.value.is_array() {
            return Err(PortError::store(
                "invalid-argument",
                format!("operator '{}' requires an array value", self.op),
            ));
        }
        Ok(())
    }

    /// Evaluates the condition against a document's fields.
    ///
    /// A missing field never matches, and values of different JSON types never
    /// compare.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = lookup(fields, &self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Ne => !values_equal(actual, &self.value),
            FilterOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => actual
                .as_array()
                .map_or(false, |items| items.iter().any(|i| values_equal(i, &self.value))),
            FilterOp::ArrayContainsAny => match (actual.as_array(), self.value.as_array()) {
                (Some(items), Some(wanted)) => items
                    .iter()
                    .any(|i| wanted.iter().any(|w| values_equal(i, w))),
                _ => false,
            },
            FilterOp::In => self
                .value
                .as_array()
                .map_or(false, |list| list.iter().any(|v| values_equal(actual, v))),
            FilterOp::NotIn => self
                .value
                .as_array()
                .map_or(false, |list| list.iter().all(|v| !values_equal(actual, v))),
        }
    }
}

fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Integers compare exactly; anything involving a float falls back to `f64`.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (integer(x), integer(y)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

//=========================================================================================
// Fetch errors
//=========================================================================================

/// The error record kept by the data-access facade after a failed read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    pub message: String,
    pub code: String,
    pub is_offline_error: bool,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}
