pub const QUERY: &'static str = r#"
	CREATE TABLE version (
		major INTEGER NOT NULL,
		minor INTEGER NOT NULL
	);
	INSERT INTO version VALUES (0, 1);

	CREATE TABLE activity (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		actor_id INTEGER NOT NULL,
		actor_name TEXT,
		verb TEXT,
		override_string TEXT,
		target TEXT,
		timestamp INTEGER NOT NULL,
		content_type TEXT NOT NULL,
		object_id INTEGER NOT NULL,
		UNIQUE(content_type, object_id)
	);
	CREATE INDEX activity_timestamp ON activity(timestamp);
	CREATE INDEX activity_actor ON activity(actor_id);
"#;
