//! The set of watched kinds and the rules to record their activity by.

use std::collections::HashMap;

use log::*;
use thiserror::Error;

use crate::{config::WatchRuleConfig, core::*, watched::KindResolver};


/// The collection containing every instance of a kind.
pub const DEFAULT_COLLECTION: &str = "all";
pub const DEFAULT_DATE_FIELD: &str = "created";


#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("model {0:?} is not of the form \"namespace.kind\"")]
	MalformedModel(String),
	#[error("model {0} does not resolve to a known kind")]
	UnresolvableModel(ContentType),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WatchRule {
	pub content_type: ContentType,
	/// A boolean field that withdraws the activity when false.
	pub check_field: Option<String>,
	/// The collection an instance must be part of to have an activity.
	pub collection: String,
	pub date_field: String,
	pub user_field: Option<String>,
	pub verb: Option<String>,
	pub override_string: Option<String>,
	pub filter_superuser: bool,
	pub filter_staff: bool,
}

struct Entry {
	rule: WatchRule,
	kind: Kind,
}

/// Read-only after startup. Rules keep the order they were registered in.
#[derive(Default)]
pub struct Registry {
	entries: Vec<Entry>,
	index: HashMap<ContentType, usize>,
}


impl WatchRule {
	pub fn new(content_type: ContentType) -> Self {
		Self {
			content_type,
			check_field: None,
			collection: DEFAULT_COLLECTION.to_string(),
			date_field: DEFAULT_DATE_FIELD.to_string(),
			user_field: None,
			verb: None,
			override_string: None,
			filter_superuser: false,
			filter_staff: false,
		}
	}

	pub fn from_config(config: &WatchRuleConfig) -> Result<Self, ConfigError> {
		let mut rule = Self::new(ContentType::parse(&config.model)?);
		rule.check_field = config.check.clone();
		if let Some(manager) = &config.manager {
			rule.collection = manager.clone();
		}
		if let Some(date_field) = &config.date_field {
			rule.date_field = date_field.clone();
		}
		rule.user_field = config.user_field.clone();
		rule.verb = config.verb.clone();
		rule.override_string = config.override_string.clone();
		rule.filter_superuser = config.filter_superuser;
		rule.filter_staff = config.filter_staff;
		Ok(rule)
	}
}

impl Registry {
	pub fn new() -> Self { Self::default() }

	/// Builds the registry from the configured watch list. Any malformed or
	/// unknown model stops the build.
	pub fn build<R: KindResolver + ?Sized>(
		configs: &[WatchRuleConfig], resolver: &R,
	) -> Result<Self, ConfigError> {
		let mut registry = Self::new();
		for config in configs {
			registry.register(WatchRule::from_config(config)?, resolver)?;
		}
		info!("Watching {} kind(s) for activity.", registry.len());
		Ok(registry)
	}

	/// Adds the rule, or replaces the rule registered for the same content
	/// type while keeping its position.
	pub fn register<R: KindResolver + ?Sized>(
		&mut self, rule: WatchRule, resolver: &R,
	) -> Result<(), ConfigError> {
		let kind = resolver
			.resolve_kind(&rule.content_type)
			.ok_or_else(|| ConfigError::UnresolvableModel(rule.content_type.clone()))?;

		match self.index.get(&rule.content_type) {
			Some(&i) => {
				debug!("Replacing watch rule for {}.", &rule.content_type);
				self.entries[i] = Entry { rule, kind };
			}
			None => {
				self.index
					.insert(rule.content_type.clone(), self.entries.len());
				self.entries.push(Entry { rule, kind });
			}
		}
		Ok(())
	}

	pub fn lookup(&self, content_type: &ContentType) -> Option<&WatchRule> {
		self.index
			.get(content_type)
			.map(|&i| &self.entries[i].rule)
	}

	pub fn resolve<R: KindResolver + ?Sized>(
		&self, content_type: &ContentType, resolver: &R,
	) -> Option<Kind> {
		resolver.resolve_kind(content_type)
	}

	/// Finds the rule that applies to entities of the given content type. A
	/// rule registered for the content type itself applies first; otherwise
	/// the first rule, in registration order, whose kind is the same concrete
	/// kind the content type resolves to.
	pub fn find<R: KindResolver + ?Sized>(
		&self, content_type: &ContentType, resolver: &R,
	) -> Option<(&WatchRule, &Kind)> {
		if let Some(&i) = self.index.get(content_type) {
			let entry = &self.entries[i];
			return Some((&entry.rule, &entry.kind));
		}

		let kind = self.resolve(content_type, resolver)?;
		self.entries
			.iter()
			.find(|e| e.kind == kind)
			.map(|e| (&e.rule, &e.kind))
	}

	pub fn iter(&self) -> impl Iterator<Item = (&WatchRule, &Kind)> {
		self.entries.iter().map(|e| (&e.rule, &e.kind))
	}

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
