//! Decides what should happen to the activity record of an entity that has
//! just been saved or deleted.

use chrono::{DateTime, Duration, Utc};
use log::*;
use thiserror::Error;

use crate::{
	core::*,
	db::NewActivity,
	registry::{Registry, WatchRule, DEFAULT_DATE_FIELD},
	watched::{CatalogError, EntityCatalog, WatchedEntity},
};


/// Changes older than this are not recorded.
pub const STALE_AFTER_DAYS: i64 = 3;


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
	NotWatched,
	NoTimestamp,
	FutureTimestamp,
	StaleTimestamp,
	NoActor,
	Superuser,
	Staff,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
	/// Leave any existing record as it is.
	Skip(SkipReason),
	/// Remove the record of the identity, if there is one.
	Delete(Identity),
	/// Create or refresh the record.
	Upsert(NewActivity),
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("{content_type} has no field {field:?}")]
	MissingField { content_type: ContentType, field: String },
	#[error("field {field:?} of {content_type} holds a {found} value, expected {expected}")]
	UnexpectedFieldType {
		content_type: ContentType,
		field: String,
		expected: &'static str,
		found: &'static str,
	},
	#[error("unable to check whether {identity} is part of collection {collection:?}: {source}")]
	Catalog {
		identity: Identity,
		collection: String,
		#[source]
		source: CatalogError,
	},
}

pub type Result<T> = std::result::Result<T, self::Error>;

pub struct Classifier<'a> {
	registry: &'a Registry,
	catalog: &'a dyn EntityCatalog,
}


fn read_field(
	rule: &WatchRule, instance: &dyn WatchedEntity, field: &str,
) -> Result<FieldValue> {
	instance.field(field).ok_or_else(|| Error::MissingField {
		content_type: rule.content_type.clone(),
		field: field.to_string(),
	})
}

/// Reads the configured date field, or the default one if the instance has no
/// such field.
fn read_date_field(rule: &WatchRule, instance: &dyn WatchedEntity) -> Result<FieldValue> {
	match instance.field(&rule.date_field) {
		Some(value) => Ok(value),
		None => match instance.field(DEFAULT_DATE_FIELD) {
			Some(value) => {
				debug!(
					"{} has no field {:?}, falling back to {:?}.",
					&rule.content_type, &rule.date_field, DEFAULT_DATE_FIELD
				);
				Ok(value)
			}
			None => read_field(rule, instance, &rule.date_field),
		},
	}
}

fn unexpected(rule: &WatchRule, field: &str, expected: &'static str, found: &FieldValue) -> Error {
	Error::UnexpectedFieldType {
		content_type: rule.content_type.clone(),
		field: field.to_string(),
		expected,
		found: found.type_name(),
	}
}


impl<'a> Classifier<'a> {
	pub fn new(registry: &'a Registry, catalog: &'a dyn EntityCatalog) -> Self {
		Self { registry, catalog }
	}

	pub async fn classify(
		&self, content_type: &ContentType, instance: &dyn WatchedEntity, is_delete: bool,
	) -> Result<Decision> {
		self.classify_at(content_type, instance, is_delete, Utc::now())
			.await
	}

	/// Classifies the change as if it happened at `now`.
	pub async fn classify_at(
		&self, content_type: &ContentType, instance: &dyn WatchedEntity, is_delete: bool,
		now: DateTime<Utc>,
	) -> Result<Decision> {
		let (rule, kind) = match self.registry.find(content_type, self.catalog) {
			Some(r) => r,
			None => {
				debug!("Not recording activity for {}: not watched.", content_type);
				return Ok(Decision::Skip(SkipReason::NotWatched));
			}
		};
		let identity = Identity::new(kind.content_type.clone(), instance.object_id());

		if is_delete {
			return Ok(Decision::Delete(identity));
		}

		// An explicit flag that withdraws the activity
		if let Some(check_field) = &rule.check_field {
			match read_field(rule, instance, check_field)? {
				FieldValue::Bool(false) => return Ok(Decision::Delete(identity)),
				_ => {}
			}
		}

		let timestamp = match read_date_field(rule, instance)? {
			FieldValue::Null => return Ok(self.skip(&identity, SkipReason::NoTimestamp)),
			value => match value.as_timestamp() {
				Some(t) => t,
				None => return Err(unexpected(rule, &rule.date_field, "date", &value)),
			},
		};

		let actor = match self.resolve_actor(rule, content_type, instance)? {
			Some(a) => a,
			None => return Ok(self.skip(&identity, SkipReason::NoActor)),
		};

		// Bail out on anything that shouldn't end up in the feed, without
		// touching a record that may already be there.
		if timestamp > now {
			return Ok(self.skip(&identity, SkipReason::FutureTimestamp));
		}
		if timestamp < now - Duration::days(STALE_AFTER_DAYS) {
			return Ok(self.skip(&identity, SkipReason::StaleTimestamp));
		}
		if rule.filter_superuser && actor.is_superuser {
			return Ok(self.skip(&identity, SkipReason::Superuser));
		}
		if rule.filter_staff && actor.is_staff {
			return Ok(self.skip(&identity, SkipReason::Staff));
		}

		let qualifies = self
			.catalog
			.qualifies(kind, &rule.collection, identity.object_id)
			.await
			.map_err(|e| Error::Catalog {
				identity: identity.clone(),
				collection: rule.collection.clone(),
				source: e,
			})?;
		if !qualifies {
			debug!(
				"{} is not part of collection {:?}, withdrawing its activity.",
				&identity, &rule.collection
			);
			return Ok(Decision::Delete(identity));
		}

		Ok(Decision::Upsert(NewActivity {
			identity,
			actor,
			verb: rule.verb.clone(),
			override_string: rule.override_string.clone(),
			timestamp,
			target: instance.render(),
		}))
	}

	fn resolve_actor(
		&self, rule: &WatchRule, content_type: &ContentType, instance: &dyn WatchedEntity,
	) -> Result<Option<Actor>> {
		if let Some(user_field) = &rule.user_field {
			return match read_field(rule, instance, user_field)? {
				FieldValue::Actor(actor) => Ok(Some(actor)),
				FieldValue::Null => Ok(None),
				other => Err(unexpected(rule, user_field, "actor", &other)),
			};
		}

		if content_type.is_user_kind() || rule.content_type.is_user_kind() {
			Ok(instance.as_actor())
		} else {
			Ok(instance.owner())
		}
	}

	fn skip(&self, identity: &Identity, reason: SkipReason) -> Decision {
		debug!("Not recording activity for {}: {:?}.", identity, reason);
		Decision::Skip(reason)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::WatchRuleConfig,
		test::{self, TestCatalog, TestEntity},
	};

	fn rule(model: &str) -> WatchRuleConfig {
		WatchRuleConfig {
			model: model.to_string(),
			..Default::default()
		}
	}

	fn setup(rules: &[WatchRuleConfig]) -> (Registry, TestCatalog) {
		let catalog = TestCatalog::new(&["auth.user", "blog.entry", "blog.comment"]);
		let registry = Registry::build(rules, &catalog).unwrap();
		(registry, catalog)
	}

	fn entry(id: i64, hours_ago: i64) -> TestEntity {
		TestEntity::new(id)
			.rendered("An entry")
			.with_field("created", FieldValue::DateTime(test::now() - Duration::hours(hours_ago)))
			.owned_by(test::actor(1, "alice"))
	}

	async fn classify(
		registry: &Registry, catalog: &TestCatalog, label: &str, instance: &TestEntity,
	) -> Decision {
		Classifier::new(registry, catalog)
			.classify_at(&ContentType::parse(label).unwrap(), instance, false, test::now())
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_unwatched_kind_is_skipped() {
		let (registry, catalog) = setup(&[rule("blog.entry")]);
		let decision = classify(&registry, &catalog, "blog.comment", &entry(1, 1)).await;
		assert_eq!(decision, Decision::Skip(SkipReason::NotWatched));
	}

	#[tokio::test]
	async fn test_delete_event_always_deletes() {
		let mut check = rule("blog.entry");
		check.check = Some("is_published".to_string());
		let (registry, catalog) = setup(&[check]);

		// Not even the missing check field gets looked at
		let stale = entry(4, 24 * 30);
		let decision = Classifier::new(&registry, &catalog)
			.classify_at(&ContentType::parse("blog.entry").unwrap(), &stale, true, test::now())
			.await
			.unwrap();
		assert_eq!(decision, Decision::Delete(test::identity("blog.entry", 4)));
	}

	#[tokio::test]
	async fn test_upsert() {
		let mut config = rule("blog.entry");
		config.verb = Some("posted".to_string());
		config.override_string = Some("wrote an entry".to_string());
		let (registry, catalog) = setup(&[config]);

		let instance = entry(2, 1);
		match classify(&registry, &catalog, "blog.entry", &instance).await {
			Decision::Upsert(new) => {
				assert_eq!(new.identity, test::identity("blog.entry", 2));
				assert_eq!(new.actor.name, "alice");
				assert_eq!(new.verb.as_deref(), Some("posted"));
				assert_eq!(new.override_string.as_deref(), Some("wrote an entry"));
				assert_eq!(new.timestamp, test::now() - Duration::hours(1));
				assert_eq!(new.target, "An entry");
			}
			other => panic!("expected an upsert, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_check_field_withdraws() {
		let mut config = rule("blog.entry");
		config.check = Some("is_published".to_string());
		let (registry, catalog) = setup(&[config]);

		let unpublished = entry(3, 1).with_field("is_published", FieldValue::Bool(false));
		let decision = classify(&registry, &catalog, "blog.entry", &unpublished).await;
		assert_eq!(decision, Decision::Delete(test::identity("blog.entry", 3)));

		// Only an explicit false withdraws
		let undecided = entry(3, 1).with_field("is_published", FieldValue::Null);
		let decision = classify(&registry, &catalog, "blog.entry", &undecided).await;
		assert!(matches!(decision, Decision::Upsert(_)));

		// The check happens before any of the bail-outs
		let old_unpublished = entry(3, 24 * 10).with_field("is_published", FieldValue::Bool(false));
		let decision = classify(&registry, &catalog, "blog.entry", &old_unpublished).await;
		assert_eq!(decision, Decision::Delete(test::identity("blog.entry", 3)));
	}

	#[tokio::test]
	async fn test_future_and_stale_are_skipped() {
		let (registry, catalog) = setup(&[rule("blog.entry")]);

		let future = entry(1, -1);
		let decision = classify(&registry, &catalog, "blog.entry", &future).await;
		assert_eq!(decision, Decision::Skip(SkipReason::FutureTimestamp));

		let stale = entry(1, 24 * 4);
		let decision = classify(&registry, &catalog, "blog.entry", &stale).await;
		assert_eq!(decision, Decision::Skip(SkipReason::StaleTimestamp));

		let almost_stale = entry(1, 24 * 3 - 1);
		let decision = classify(&registry, &catalog, "blog.entry", &almost_stale).await;
		assert!(matches!(decision, Decision::Upsert(_)));
	}

	#[tokio::test]
	async fn test_date_field_and_dates() {
		let mut config = rule("blog.entry");
		config.date_field = Some("pub_date".to_string());
		let (registry, catalog) = setup(&[config]);

		let today = test::now().date_naive();
		let dated = entry(1, 1).with_field("pub_date", FieldValue::Date(today));
		match classify(&registry, &catalog, "blog.entry", &dated).await {
			Decision::Upsert(new) => assert_eq!(new.timestamp, FieldValue::Date(today).as_timestamp().unwrap()),
			other => panic!("expected an upsert, got {:?}", other),
		}

		let undated = entry(1, 1).with_field("pub_date", FieldValue::Null);
		let decision = classify(&registry, &catalog, "blog.entry", &undated).await;
		assert_eq!(decision, Decision::Skip(SkipReason::NoTimestamp));

		// Without the configured field, the creation date is used
		let created_only = entry(1, 1);
		match classify(&registry, &catalog, "blog.entry", &created_only).await {
			Decision::Upsert(new) => assert_eq!(
				new.timestamp,
				created_only.fields["created"].as_timestamp().unwrap()
			),
			other => panic!("expected an upsert, got {:?}", other),
		}

		let missing = TestEntity::new(1).owned_by(test::actor(1, "alice"));
		let result = Classifier::new(&registry, &catalog)
			.classify_at(&ContentType::parse("blog.entry").unwrap(), &missing, false, test::now())
			.await;
		match result {
			Err(Error::MissingField { field, .. }) => assert_eq!(field, "pub_date"),
			other => panic!("expected a missing field error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_actor_resolution() {
		let mut with_user_field = rule("blog.comment");
		with_user_field.user_field = Some("author".to_string());
		let (registry, catalog) = setup(&[rule("auth.user"), rule("blog.entry"), with_user_field]);

		// A user is its own actor
		let user = TestEntity::new(9)
			.with_field("created", FieldValue::DateTime(test::now()))
			.as_user(test::actor(9, "carol"));
		match classify(&registry, &catalog, "auth.user", &user).await {
			Decision::Upsert(new) => assert_eq!(new.actor.id, 9),
			other => panic!("expected an upsert, got {:?}", other),
		}

		// The user field wins over the owner
		let comment = entry(5, 1).with_field("author", FieldValue::Actor(test::actor(2, "bob")));
		match classify(&registry, &catalog, "blog.comment", &comment).await {
			Decision::Upsert(new) => assert_eq!(new.actor.name, "bob"),
			other => panic!("expected an upsert, got {:?}", other),
		}

		let anonymous = entry(5, 1).with_field("author", FieldValue::Null);
		let decision = classify(&registry, &catalog, "blog.comment", &anonymous).await;
		assert_eq!(decision, Decision::Skip(SkipReason::NoActor));

		let orphan = TestEntity::new(6).with_field("created", FieldValue::DateTime(test::now()));
		let decision = classify(&registry, &catalog, "blog.entry", &orphan).await;
		assert_eq!(decision, Decision::Skip(SkipReason::NoActor));
	}

	#[tokio::test]
	async fn test_privileged_actors_are_filtered() {
		let mut config = rule("blog.entry");
		config.filter_superuser = true;
		config.filter_staff = true;
		let (registry, catalog) = setup(&[config]);

		let mut admin = test::actor(1, "admin");
		admin.is_superuser = true;
		let by_admin = entry(1, 1).owned_by(admin);
		let decision = classify(&registry, &catalog, "blog.entry", &by_admin).await;
		assert_eq!(decision, Decision::Skip(SkipReason::Superuser));

		let mut staff = test::actor(2, "staff");
		staff.is_staff = true;
		let by_staff = entry(1, 1).owned_by(staff.clone());
		let decision = classify(&registry, &catalog, "blog.entry", &by_staff).await;
		assert_eq!(decision, Decision::Skip(SkipReason::Staff));

		// Unfiltered rules record staff just fine
		let (registry, catalog) = setup(&[rule("blog.entry")]);
		let decision = classify(&registry, &catalog, "blog.entry", &entry(1, 1).owned_by(staff)).await;
		assert!(matches!(decision, Decision::Upsert(_)));
	}

	#[tokio::test]
	async fn test_collection_membership() {
		let mut config = rule("blog.entry");
		config.manager = Some("published".to_string());
		let (registry, catalog) = setup(&[config]);

		catalog.set_member("blog.entry", "published", 1, true);
		let decision = classify(&registry, &catalog, "blog.entry", &entry(1, 1)).await;
		assert!(matches!(decision, Decision::Upsert(_)));

		catalog.set_member("blog.entry", "published", 1, false);
		let decision = classify(&registry, &catalog, "blog.entry", &entry(1, 1)).await;
		assert_eq!(decision, Decision::Delete(test::identity("blog.entry", 1)));
	}
}
