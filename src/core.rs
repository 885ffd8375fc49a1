use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::ConfigError;


/// A "namespace.kind" label naming a kind of entity, like `auth.user` or
/// `blog.entry`. Always stored lower-cased.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentType {
	namespace: String,
	kind: String,
}

/// The identity of a watched entity instance. At most one activity record
/// exists per identity.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Identity {
	pub content_type: ContentType,
	pub object_id: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Actor {
	pub id: i64,
	pub name: String,
	pub is_superuser: bool,
	pub is_staff: bool,
}

/// A value read from a watched entity by field name.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
	Null,
	Bool(bool),
	Date(NaiveDate),
	DateTime(DateTime<Utc>),
	Text(String),
	Actor(Actor),
}

/// The concrete kind a content type resolves to in the host's type system.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Kind {
	pub content_type: ContentType,
	/// Display name of the kind, e.g. `Entry`.
	pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ImageRef(pub String);


fn is_identifier(part: &str) -> bool {
	let mut chars = part.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ContentType {
	pub fn new(namespace: &str, kind: &str) -> Result<Self, ConfigError> {
		if !is_identifier(namespace) || !is_identifier(kind) {
			return Err(ConfigError::MalformedModel(format!("{}.{}", namespace, kind)));
		}
		Ok(Self {
			namespace: namespace.to_ascii_lowercase(),
			kind: kind.to_ascii_lowercase(),
		})
	}

	pub fn parse(label: &str) -> Result<Self, ConfigError> {
		let mut parts = label.split('.');
		match (parts.next(), parts.next(), parts.next()) {
			(Some(namespace), Some(kind), None) => Self::new(namespace, kind)
				.map_err(|_| ConfigError::MalformedModel(label.to_string())),
			_ => Err(ConfigError::MalformedModel(label.to_string())),
		}
	}

	pub fn namespace(&self) -> &str { &self.namespace }

	pub fn kind(&self) -> &str { &self.kind }

	/// The kind with its first letter capitalized, e.g. "Topic".
	pub fn kind_name(&self) -> String {
		let mut chars = self.kind.chars();
		match chars.next() {
			Some(first) => first.to_uppercase().chain(chars).collect(),
			None => String::new(),
		}
	}

	/// Whether instances of this kind are themselves the actor of their
	/// activity.
	pub fn is_user_kind(&self) -> bool { self.kind == "user" || self.kind == "profile" }

	pub fn label(&self) -> String { format!("{}.{}", self.namespace, self.kind) }
}

impl fmt::Display for ContentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.namespace, self.kind)
	}
}

impl FromStr for ContentType {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for ContentType {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<ContentType> for String {
	fn from(value: ContentType) -> Self { value.label() }
}

impl Identity {
	pub fn new(content_type: ContentType, object_id: i64) -> Self {
		Self {
			content_type,
			object_id,
		}
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.content_type, self.object_id)
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.name) }
}

impl FieldValue {
	/// Returns the value as a point in time. Bare dates are taken to be at
	/// midnight.
	pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
		match self {
			Self::DateTime(t) => Some(*t),
			Self::Date(d) => Some(d.and_time(NaiveTime::MIN).and_utc()),
			_ => None,
		}
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Date(_) => "date",
			Self::DateTime(_) => "datetime",
			Self::Text(_) => "text",
			Self::Actor(_) => "actor",
		}
	}
}
