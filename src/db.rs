//! The persisted set of activity records.

mod install;

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::*;
use sea_orm::{prelude::*, sea_query::*, *};
use thiserror::Error;

use crate::{
	activity::ActivityRecord,
	core::{Actor, ContentType, Identity},
	entity::activity,
};


#[derive(Clone)]
pub struct Database {
	path: PathBuf,
	orm: DatabaseConnection,
}

pub struct Transaction(pub(crate) sea_orm::DatabaseTransaction);

#[derive(Debug, Error)]
pub enum Error {
	#[error("database error: {0}")]
	OrmError(#[from] sea_orm::DbErr),
	/// An activity record for the identity already exists.
	#[error("an activity record already exists for {0}")]
	DuplicateIdentity(Identity),
	#[error("invalid content type {0:?} found in database")]
	InvalidContentType(String),
	#[error("timestamp {0} found in database is out of range")]
	InvalidTimestamp(i64),
}

pub type Result<T> = std::result::Result<T, self::Error>;

/// The values an activity record gets created or refreshed with.
#[derive(Clone, Debug, PartialEq)]
pub struct NewActivity {
	pub identity: Identity,
	pub actor: Actor,
	pub verb: Option<String>,
	pub override_string: Option<String>,
	pub timestamp: DateTime<Utc>,
	/// Display string of the watched entity at the time of the change.
	pub target: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
	#[default]
	NewestFirst,
	OldestFirst,
}

/// Filters for loading activity records. Kinds are given either as a full
/// `namespace.kind` label, or as a bare kind name that matches any namespace.
#[derive(Clone, Debug, Default)]
pub struct ActivityQuery {
	pub since: Option<DateTime<Utc>>,
	pub until: Option<DateTime<Utc>>,
	pub actor_id: Option<i64>,
	pub actor_name: Option<String>,
	pub include_kinds: Vec<String>,
	pub exclude_kinds: Vec<String>,
	pub order: SortOrder,
	pub limit: Option<u64>,
	pub offset: Option<u64>,
}


fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
	Utc.timestamp_millis_opt(millis)
		.single()
		.ok_or(Error::InvalidTimestamp(millis))
}

fn kind_condition(kind: &str) -> SimpleExpr {
	let kind = kind.trim().to_ascii_lowercase();
	if kind.contains('.') {
		activity::Column::ContentType.eq(kind)
	} else {
		Expr::cust_with_values(
			"substr(content_type, instr(content_type, '.') + 1) = ?",
			[kind],
		)
	}
}

fn identity_condition(identity: &Identity) -> Condition {
	Condition::all()
		.add(activity::Column::ContentType.eq(identity.content_type.label()))
		.add(activity::Column::ObjectId.eq(identity.object_id))
}


impl ActivityQuery {
	pub fn new() -> Self { Self::default() }

	pub fn since(mut self, moment: DateTime<Utc>) -> Self {
		self.since = Some(moment);
		self
	}

	pub fn until(mut self, moment: DateTime<Utc>) -> Self {
		self.until = Some(moment);
		self
	}

	pub fn between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
		self.since(start).until(end)
	}

	pub fn by_actor(mut self, actor_id: i64) -> Self {
		self.actor_id = Some(actor_id);
		self
	}

	pub fn by_actor_name(mut self, name: impl Into<String>) -> Self {
		self.actor_name = Some(name.into());
		self
	}

	pub fn include<S: Into<String>>(mut self, kinds: impl IntoIterator<Item = S>) -> Self {
		self.include_kinds.extend(kinds.into_iter().map(Into::into));
		self
	}

	pub fn exclude<S: Into<String>>(mut self, kinds: impl IntoIterator<Item = S>) -> Self {
		self.exclude_kinds.extend(kinds.into_iter().map(Into::into));
		self
	}

	pub fn oldest_first(mut self) -> Self {
		self.order = SortOrder::OldestFirst;
		self
	}

	pub fn limit(mut self, limit: u64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn offset(mut self, offset: u64) -> Self {
		self.offset = Some(offset);
		self
	}

	fn condition(&self) -> Condition {
		let mut condition = Condition::all();
		if let Some(since) = &self.since {
			condition = condition.add(activity::Column::Timestamp.gte(since.timestamp_millis()));
		}
		if let Some(until) = &self.until {
			condition = condition.add(activity::Column::Timestamp.lte(until.timestamp_millis()));
		}
		if let Some(actor_id) = self.actor_id {
			condition = condition.add(activity::Column::ActorId.eq(actor_id));
		}
		if let Some(name) = &self.actor_name {
			condition = condition.add(activity::Column::ActorName.eq(name.as_str()));
		}
		if self.include_kinds.len() > 0 {
			let mut any = Condition::any();
			for kind in &self.include_kinds {
				any = any.add(kind_condition(kind));
			}
			condition = condition.add(any);
		}
		for kind in &self.exclude_kinds {
			condition = condition.add(kind_condition(kind).not());
		}
		condition
	}
}

impl TryFrom<activity::Model> for ActivityRecord {
	type Error = self::Error;

	fn try_from(model: activity::Model) -> Result<Self> {
		let content_type = ContentType::parse(&model.content_type)
			.map_err(|_| Error::InvalidContentType(model.content_type.clone()))?;
		Ok(ActivityRecord::new(
			model.id,
			model.actor_id,
			model.actor_name.unwrap_or_default(),
			model.verb,
			model.override_string,
			model.target.unwrap_or_default(),
			timestamp_from_millis(model.timestamp)?,
			Identity::new(content_type, model.object_id),
		))
	}
}


#[async_trait]
pub trait PersistenceHandle {
	type Inner: ConnectionTrait;

	fn inner(&self) -> &Self::Inner;

	fn backend(&self) -> DatabaseBackend { self.inner().get_database_backend() }

	async fn find_activity(&self, identity: &Identity) -> Result<Option<ActivityRecord>> {
		let result = activity::Entity::find()
			.filter(identity_condition(identity))
			.one(self.inner())
			.await?;
		result.map(ActivityRecord::try_from).transpose()
	}

	/// Inserts a new record. Fails with `Error::DuplicateIdentity` if a record
	/// for the same identity exists.
	async fn create_activity(&self, new: &NewActivity) -> Result<ActivityRecord> {
		let record = activity::ActiveModel {
			id: NotSet,
			actor_id: Set(new.actor.id),
			actor_name: Set(Some(new.actor.name.clone())),
			verb: Set(new.verb.clone()),
			override_string: Set(new.override_string.clone()),
			target: Set(Some(new.target.clone())),
			timestamp: Set(new.timestamp.timestamp_millis()),
			content_type: Set(new.identity.content_type.label()),
			object_id: Set(new.identity.object_id),
		};
		match record.insert(self.inner()).await {
			Ok(model) => ActivityRecord::try_from(model),
			Err(e) => match e.sql_err() {
				Some(SqlErr::UniqueConstraintViolation(_)) =>
					Err(Error::DuplicateIdentity(new.identity.clone())),
				_ => Err(e.into()),
			},
		}
	}

	/// Refreshes the actor, verb, override string and timestamp of an existing
	/// record. The display snapshots are only filled in if they are blank.
	async fn update_activity(
		&self, existing: &ActivityRecord, new: &NewActivity,
	) -> Result<ActivityRecord> {
		let mut record = <activity::ActiveModel as ActiveModelTrait>::default();
		record.id = Set(existing.id);
		record.actor_id = Set(new.actor.id);
		record.verb = Set(new.verb.clone());
		record.override_string = Set(new.override_string.clone());
		record.timestamp = Set(new.timestamp.timestamp_millis());
		if existing.actor_name.is_empty() {
			record.actor_name = Set(Some(new.actor.name.clone()));
		}
		if existing.target.is_empty() {
			record.target = Set(Some(new.target.clone()));
		}
		let model = activity::Entity::update(record)
			.exec(self.inner())
			.await?;
		ActivityRecord::try_from(model)
	}

	/// Deletes the record of the identity, if any. Returns whether there was
	/// one.
	async fn delete_activity(&self, identity: &Identity) -> Result<bool> {
		let result = activity::Entity::delete_many()
			.filter(identity_condition(identity))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}

	async fn load_activities(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>> {
		let order = match query.order {
			SortOrder::NewestFirst => Order::Desc,
			SortOrder::OldestFirst => Order::Asc,
		};
		let mut select = activity::Entity::find()
			.filter(query.condition())
			.order_by(activity::Column::Timestamp, order.clone())
			.order_by(activity::Column::Id, order);
		if let Some(limit) = query.limit {
			select = select.limit(limit);
		}
		if let Some(offset) = query.offset {
			select = select.offset(offset);
		}

		let results = select.all(self.inner()).await?;
		let mut records = Vec::with_capacity(results.len());
		for model in results {
			records.push(ActivityRecord::try_from(model)?);
		}
		Ok(records)
	}

	async fn count_activities_since(&self, moment: DateTime<Utc>) -> Result<u64> {
		let count = activity::Entity::find()
			.filter(activity::Column::Timestamp.gte(moment.timestamp_millis()))
			.count(self.inner())
			.await?;
		Ok(count)
	}

	/// The time the newest record of the given kind was made, or the UNIX
	/// epoch if there are none.
	async fn find_last_update_of_kind(&self, content_type: &ContentType) -> Result<DateTime<Utc>> {
		let result = activity::Entity::find()
			.filter(activity::Column::ContentType.eq(content_type.label()))
			.order_by_desc(activity::Column::Timestamp)
			.one(self.inner())
			.await?;
		match result {
			Some(model) => timestamp_from_millis(model.timestamp),
			None => timestamp_from_millis(0),
		}
	}
}


impl Database {
	pub async fn load(path: PathBuf) -> Result<Self> {
		let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
		opts.idle_timeout(Duration::from_secs(10));
		opts.acquire_timeout(Duration::from_secs(1));
		let orm = sea_orm::Database::connect(opts).await?;

		let db = Self { path, orm };
		if !db.is_installed().await? {
			info!("Installing database at {}...", db.path.display());
			db.install().await?;
		}
		Ok(db)
	}

	async fn is_installed(&self) -> Result<bool> {
		let stat = Statement::from_sql_and_values(
			DatabaseBackend::Sqlite,
			"SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
			["version".into()],
		);
		Ok(self.orm.query_one(stat).await?.is_some())
	}

	async fn install(&self) -> Result<()> {
		let tx = self.orm.begin().await?;
		for statement in install::QUERY.split(';') {
			let statement = statement.trim();
			if statement.len() > 0 {
				tx.execute_unprepared(statement).await?;
			}
		}
		tx.commit().await?;
		Ok(())
	}

	pub fn path(&self) -> &Path { &self.path }

	pub async fn transaction(&self) -> Result<Transaction> {
		let tx = self.orm.begin().await?;
		Ok(Transaction(tx))
	}

	pub async fn close(self) -> Result<()> {
		self.orm.close().await?;
		Ok(())
	}
}

impl PersistenceHandle for Database {
	type Inner = sea_orm::DatabaseConnection;

	fn inner(&self) -> &Self::Inner { &self.orm }
}

impl PersistenceHandle for Transaction {
	type Inner = sea_orm::DatabaseTransaction;

	fn inner(&self) -> &Self::Inner { &self.0 }
}

impl Transaction {
	pub async fn commit(self) -> Result<()> {
		self.0.commit().await?;
		Ok(())
	}
}
