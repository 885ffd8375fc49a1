use std::{fs, io, path::Path};

use serde::*;
use thiserror::Error;


/// The file path of the configuration file
#[cfg(target_family = "unix")]
pub const CONFIG_FILE_PATH: &str = "/etc/activity-monitor/config.toml";
#[cfg(target_family = "windows")]
pub const CONFIG_FILE_PATH: &str = "C:\\Program Files\\activity-monitor\\config.toml";

pub const DEFAULT_NEW_ACTIVITY_CAP: u64 = 1000;

#[derive(Debug, Error)]
pub enum Error {
	#[error("unable to read config file: {0}")]
	Io(#[from] io::Error),
	#[error("unable to parse config file: {0}")]
	Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
	pub database_path: String,
	pub new_activity_cap: Option<u64>,

	/// The kinds to watch, in order of precedence.
	#[serde(default)]
	pub watch: Vec<WatchRuleConfig>,
}

/// One entry of the `[[watch]]` list.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WatchRuleConfig {
	pub model: String,
	pub check: Option<String>,
	pub manager: Option<String>,
	pub date_field: Option<String>,
	pub user_field: Option<String>,
	pub verb: Option<String>,
	pub override_string: Option<String>,
	#[serde(default)]
	pub filter_superuser: bool,
	#[serde(default)]
	pub filter_staff: bool,
}


impl Config {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
		let content = fs::read_to_string(path)?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self, Error> { Ok(toml::from_str(content)?) }

	pub fn new_activity_cap(&self) -> u64 {
		self.new_activity_cap.unwrap_or(DEFAULT_NEW_ACTIVITY_CAP)
	}
}
