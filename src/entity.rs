pub mod activity;

pub mod prelude {
	pub use super::activity::Entity as Activity;
}
