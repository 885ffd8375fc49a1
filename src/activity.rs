use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;

use crate::{core::*, watched::WatchedEntity};


/// A persisted activity: the latest qualifying change of one watched entity.
#[derive(Clone, Debug)]
pub struct ActivityRecord {
	pub id: i64,
	pub actor_id: i64,
	/// Display name of the actor when the record was created.
	pub actor_name: String,
	pub verb: Option<String>,
	pub override_string: Option<String>,
	/// Display string of the watched entity when the record was created.
	pub target: String,
	pub timestamp: DateTime<Utc>,
	pub identity: Identity,
	short_action_string: OnceCell<String>,
}

/// An activity record together with the entity it refers to.
pub struct ResolvedActivity {
	pub record: ActivityRecord,
	pub kind: Option<Kind>,
	pub content: Box<dyn WatchedEntity>,
	image: OnceCell<Option<ImageRef>>,
}


impl ActivityRecord {
	pub fn new(
		id: i64, actor_id: i64, actor_name: String, verb: Option<String>,
		override_string: Option<String>, target: String, timestamp: DateTime<Utc>,
		identity: Identity,
	) -> Self {
		Self {
			id,
			actor_id,
			actor_name,
			verb,
			override_string,
			target,
			timestamp,
			identity,
			short_action_string: OnceCell::new(),
		}
	}

	/// The override string if there is one, otherwise the verb.
	pub fn display_verb(&self) -> Option<&str> {
		self.override_string
			.as_deref()
			.filter(|s| s.len() > 0)
			.or(self.verb.as_deref())
	}

	/// The actor followed by what they did, e.g. "Joe posted a comment". The
	/// target is left out.
	pub fn short_action_string(&self) -> &str {
		self.short_action_string.get_or_init(|| {
			format!("{} {}", self.actor_name, self.display_verb().unwrap_or_default())
		})
	}

	pub fn content_type(&self) -> &ContentType { &self.identity.content_type }
}

impl fmt::Display for ActivityRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.identity.content_type.kind_name(), self.target)
	}
}

impl PartialEq for ActivityRecord {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id &&
			self.actor_id == other.actor_id &&
			self.actor_name == other.actor_name &&
			self.verb == other.verb &&
			self.override_string == other.override_string &&
			self.target == other.target &&
			self.timestamp == other.timestamp &&
			self.identity == other.identity
	}
}

impl ResolvedActivity {
	pub fn new(record: ActivityRecord, kind: Option<Kind>, content: Box<dyn WatchedEntity>) -> Self {
		Self {
			record,
			kind,
			content,
			image: OnceCell::new(),
		}
	}

	/// The short action string followed by the current rendering of the
	/// content, e.g. `Joe posted a new topic: "my new topic"`.
	pub fn full_action_string(&self) -> String {
		format!("{} {}", self.record.short_action_string(), self.content.render())
	}

	pub fn absolute_url(&self) -> Option<String> { self.content.absolute_url() }

	/// A representative image of the content. An explicitly representative
	/// image wins over a plain image attribute, and the content itself wins
	/// over the entity it is attached to.
	pub fn image(&self) -> Option<&ImageRef> {
		self.image
			.get_or_init(|| {
				let content = &*self.content;
				let wrapped = content.wrapped();
				content
					.representative_image()
					.or_else(|| wrapped.and_then(|w| w.representative_image()))
					.or_else(|| content.image())
					.or_else(|| wrapped.and_then(|w| w.image()))
			})
			.as_ref()
	}
}

impl fmt::Display for ResolvedActivity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.kind {
			Some(kind) => write!(f, "{}: {}", kind.name, self.content.render()),
			None => write!(f, "{}", self.record),
		}
	}
}
