//! Reacts to entity mutations by keeping their activity records up to date.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;

use crate::{
	activity::{ActivityRecord, ResolvedActivity},
	classifier::{self, Classifier, Decision, SkipReason},
	config::Config,
	core::*,
	db::{self, Database, NewActivity, PersistenceHandle},
	registry::{ConfigError, Registry},
	watched::{CatalogError, EntityCatalog, WatchedEntity},
};


#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid watch list: {0}")]
	Config(#[from] ConfigError),
	#[error("{0}")]
	Classifier(#[from] classifier::Error),
	#[error("activity store failure: {0}")]
	Store(#[from] db::Error),
	#[error("unable to load {0}: {1}")]
	Catalog(Identity, CatalogError),
}

pub type Result<T> = std::result::Result<T, self::Error>;

/// What reacting to a mutation did to the activity records.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
	Skipped(SkipReason),
	/// Whether there was a record to delete.
	Deleted(bool),
	Created(ActivityRecord),
	Updated(ActivityRecord),
}

/// Holds everything needed to record activity: the watch list, the activity
/// store and the host's catalog of entities.
pub struct Monitor {
	registry: Registry,
	db: Database,
	catalog: Arc<dyn EntityCatalog>,
}


impl Monitor {
	pub fn new(registry: Registry, db: Database, catalog: Arc<dyn EntityCatalog>) -> Self {
		Self {
			registry,
			db,
			catalog,
		}
	}

	/// Builds the registry from the configured watch list. Fails if any of
	/// the watched models can't be resolved.
	pub fn load(config: &Config, db: Database, catalog: Arc<dyn EntityCatalog>) -> Result<Self> {
		let registry = Registry::build(&config.watch, &*catalog)?;
		Ok(Self::new(registry, db, catalog))
	}

	pub fn registry(&self) -> &Registry { &self.registry }

	pub fn db(&self) -> &Database { &self.db }

	pub fn catalog(&self) -> &dyn EntityCatalog { &*self.catalog }

	/// To be called by the host after every save or delete of any entity that
	/// may be watched.
	///
	/// Errors are logged before being returned. The caller should not let
	/// them undo the mutation itself.
	pub async fn on_entity_mutated(
		&self, content_type: &ContentType, instance: &dyn WatchedEntity, is_delete: bool,
	) -> Result<Outcome> {
		self.on_entity_mutated_at(content_type, instance, is_delete, Utc::now())
			.await
	}

	pub async fn on_entity_mutated_at(
		&self, content_type: &ContentType, instance: &dyn WatchedEntity, is_delete: bool,
		now: DateTime<Utc>,
	) -> Result<Outcome> {
		let result = self
			.react(content_type, instance, is_delete, now)
			.await;

		if let Err(e) = &result {
			error!(
				"Unable to record activity of {}#{}: {}",
				content_type,
				instance.object_id(),
				e
			);
		}
		result
	}

	async fn react(
		&self, content_type: &ContentType, instance: &dyn WatchedEntity, is_delete: bool,
		now: DateTime<Utc>,
	) -> Result<Outcome> {
		let decision = Classifier::new(&self.registry, &*self.catalog)
			.classify_at(content_type, instance, is_delete, now)
			.await?;
		self.apply(decision).await
	}

	/// Carries out a decision against the activity store.
	pub async fn apply(&self, decision: Decision) -> Result<Outcome> {
		match decision {
			Decision::Skip(reason) => Ok(Outcome::Skipped(reason)),
			Decision::Delete(identity) => {
				let deleted = self.db.delete_activity(&identity).await?;
				if deleted {
					debug!("Deleted activity record of {}.", &identity);
				}
				Ok(Outcome::Deleted(deleted))
			}
			Decision::Upsert(new) => self.upsert(&new).await,
		}
	}

	async fn upsert(&self, new: &NewActivity) -> Result<Outcome> {
		match self.try_upsert(new).await {
			// Someone else created the record in the meantime, so update theirs.
			Err(Error::Store(db::Error::DuplicateIdentity(identity))) => {
				debug!("Activity record of {} was created concurrently, updating it.", identity);
				self.try_upsert(new).await
			}
			other => other,
		}
	}

	async fn try_upsert(&self, new: &NewActivity) -> Result<Outcome> {
		// Dropping the transaction on an error rolls it back.
		let tx = self.db.transaction().await?;
		let outcome = match tx.find_activity(&new.identity).await? {
			Some(existing) => Outcome::Updated(tx.update_activity(&existing, new).await?),
			None => Outcome::Created(tx.create_activity(new).await?),
		};
		tx.commit().await?;

		match &outcome {
			Outcome::Created(r) => debug!("Created activity record {} for {}.", r.id, &new.identity),
			Outcome::Updated(r) => debug!("Updated activity record {} for {}.", r.id, &new.identity),
			_ => {}
		}
		Ok(outcome)
	}

	/// Removes the activity record of an entity that is gone.
	pub async fn remove_orphans(&self, content_type: &ContentType, object_id: i64) -> Result<bool> {
		let content_type = match self.registry.find(content_type, &*self.catalog) {
			Some((_, kind)) => kind.content_type.clone(),
			None => content_type.clone(),
		};
		let identity = Identity::new(content_type, object_id);
		Ok(self.db.delete_activity(&identity).await?)
	}

	/// Pairs the record with the entity it refers to. Returns `None` when the
	/// entity no longer exists.
	pub async fn resolve(&self, record: ActivityRecord) -> Result<Option<ResolvedActivity>> {
		let content = self
			.catalog
			.load_entity(&record.identity)
			.await
			.map_err(|e| Error::Catalog(record.identity.clone(), e))?;
		let content = match content {
			Some(c) => c,
			None => {
				warn!("Activity record {} refers to missing {}.", record.id, &record.identity);
				return Ok(None);
			}
		};
		let kind = self.catalog.resolve_kind(record.content_type());
		Ok(Some(ResolvedActivity::new(record, kind, content)))
	}

	/// Resolves every record, leaving out those whose entity is gone.
	pub async fn resolve_all(&self, records: Vec<ActivityRecord>) -> Result<Vec<ResolvedActivity>> {
		let mut resolved = Vec::with_capacity(records.len());
		for record in records {
			if let Some(r) = self.resolve(record).await? {
				resolved.push(r);
			}
		}
		Ok(resolved)
	}
}
