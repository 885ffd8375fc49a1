//! One row per watched entity: the latest qualifying change made to it.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "activity")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	pub actor_id: i64,
	/// Display name of the actor, taken when the record was created
	pub actor_name: Option<String>,
	pub verb: Option<String>,
	pub override_string: Option<String>,
	/// Display string of the watched entity, taken when the record was created
	pub target: Option<String>,
	/// UNIX time in milliseconds
	pub timestamp: i64,
	/// Unique together with `object_id`
	pub content_type: String,
	pub object_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
