//! The interfaces the host application implements so that its entities can be
//! watched.

use async_trait::async_trait;

use crate::core::*;


/// Errors raised by host-supplied collaborators.
pub type CatalogError = Box<dyn std::error::Error + Send + Sync>;


/// An entity instance as seen by the monitor.
pub trait WatchedEntity: Send + Sync {
	fn object_id(&self) -> i64;

	/// Reads a field by name. `None` means the entity has no such field.
	fn field(&self, name: &str) -> Option<FieldValue>;

	/// The entity itself as an actor, for user and profile kinds.
	fn as_actor(&self) -> Option<Actor> { None }

	/// The actor to fall back on when no user field is configured.
	fn owner(&self) -> Option<Actor> { None }

	/// The display string of this entity.
	fn render(&self) -> String;

	fn absolute_url(&self) -> Option<String> { None }

	/// An image picked explicitly as representative. Takes precedence over
	/// `image`.
	fn representative_image(&self) -> Option<ImageRef> { None }

	fn image(&self) -> Option<ImageRef> { None }

	/// The entity this one is attached to, if any (e.g. a comment's subject).
	fn wrapped(&self) -> Option<&dyn WatchedEntity> { None }
}

pub trait KindResolver: Send + Sync {
	fn resolve_kind(&self, content_type: &ContentType) -> Option<Kind>;
}

#[async_trait]
pub trait EntityCatalog: KindResolver {
	/// Whether the instance is currently part of the named collection of its
	/// kind. The collection `all` contains every existing instance.
	async fn qualifies(
		&self, kind: &Kind, collection: &str, object_id: i64,
	) -> Result<bool, CatalogError>;

	/// Loads the entity a stored reference points to, if it still exists.
	async fn load_entity(
		&self, identity: &Identity,
	) -> Result<Option<Box<dyn WatchedEntity>>, CatalogError>;
}
