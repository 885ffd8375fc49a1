pub mod activity;
pub mod classifier;
pub mod config;
pub mod core;
pub mod db;
pub mod entity;
pub mod feed;
pub mod recorder;
pub mod registry;
pub mod watched;

pub use recorder::{Monitor, Outcome};
