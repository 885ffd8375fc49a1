use std::{
	env, fmt,
	path::{Path, PathBuf},
	process,
};

use activity_monitor::{
	activity::ActivityRecord,
	config::{self, Config},
	db::{ActivityQuery, Database, PersistenceHandle},
	feed::{self, Period},
	registry::WatchRule,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::*;


/// Archive listings show at most this many records.
const ARCHIVE_PAGE_SIZE: u64 = 100;

enum Command {
	Today,
	Day(NaiveDate),
	Month(Option<(i32, u32)>),
	Archive(Option<String>),
	/// Activity since the given day, or since the start of today.
	New(Option<NaiveDate>),
	Count,
}


fn initialize_logging() {
	let result = env::var_os("SYSTEM_LOG_FILE").map(|os| PathBuf::from(os));

	if let Some(filename) = result {
		simple_logging::log_to_file(filename, LevelFilter::Debug)
			.expect("unable to initialize logger")
	} else {
		env_logger::init()
	}
}

fn load_config<P>(path: P) -> Option<Config>
where
	P: AsRef<Path> + fmt::Debug,
{
	let config = match Config::load(&path) {
		Ok(c) => c,
		Err(e) => {
			error!("Unable to load config file {:?}: {}", path, e);
			return None;
		}
	};

	// Whether the models resolve is up to the host, but they have to be
	// well-formed regardless.
	for entry in &config.watch {
		if let Err(e) = WatchRule::from_config(entry) {
			error!("Invalid entry in watch list: {}", e);
			return None;
		}
	}
	Some(config)
}

async fn load_database(config: &Config) -> Option<Database> {
	let db_path = PathBuf::from(&config.database_path);
	if let Some(parent) = db_path.parent() {
		if let Err(e) = tokio::fs::create_dir_all(parent).await {
			error!("Unable to create database folder {}: {}", parent.display(), e);
			return None;
		}
	}

	match Database::load(db_path).await {
		Ok(db) => Some(db),
		Err(e) => {
			error!("Unable to load database: {}", e);
			None
		}
	}
}

fn parse_month(string: &str) -> Option<(i32, u32)> {
	let (year, month) = string.split_once('-')?;
	Some((year.parse().ok()?, month.parse().ok()?))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
	match args.first().map(|s| s.as_str()) {
		None | Some("today") => Ok(Command::Today),
		Some("day") => {
			let string = args.get(1).ok_or("missing date")?;
			NaiveDate::parse_from_str(string, "%Y-%m-%d")
				.map(Command::Day)
				.map_err(|e| format!("invalid date {:?}: {}", string, e))
		}
		Some("month") => match args.get(1) {
			None => Ok(Command::Month(None)),
			Some(string) => parse_month(string)
				.map(|m| Command::Month(Some(m)))
				.ok_or_else(|| format!("invalid month {:?}, expected YYYY-MM", string)),
		},
		Some("archive") => Ok(Command::Archive(args.get(1).cloned())),
		Some("new") => match args.get(1) {
			None => Ok(Command::New(None)),
			Some(string) => NaiveDate::parse_from_str(string, "%Y-%m-%d")
				.map(|d| Command::New(Some(d)))
				.map_err(|e| format!("invalid date {:?}: {}", string, e)),
		},
		Some("count") => Ok(Command::Count),
		Some(other) => Err(format!("unknown command {:?}", other)),
	}
}

fn is_command(arg: &str) -> bool {
	matches!(arg, "today" | "day" | "month" | "archive" | "new" | "count")
}

fn print_grouped(records: Vec<ActivityRecord>, now: DateTime<Utc>) {
	let grouped = feed::group_activities(records, now);
	if grouped.is_empty() {
		println!("  No activity.");
	}
	for group in grouped.iter() {
		println!(
			"{} {} {} {}",
			if group.is_current { "*" } else { " " },
			group.actors_string(),
			group.verb.as_deref().unwrap_or_default(),
			group.target()
		);
	}
}

async fn print_period(db: &Database, period: Period) -> activity_monitor::db::Result<()> {
	let now = Utc::now();
	let query = match period.query(now) {
		Some(q) => q,
		None => {
			error!("Period {:?} does not exist.", period);
			return Ok(());
		}
	};

	println!("{}", period.title(now));
	print_grouped(db.load_activities(&query).await?, now);

	if let Period::Day(day) = period {
		let (previous, next) = feed::adjacent_days(day, now.date_naive());
		if let Some(previous) = previous {
			println!("Previous day: {}", previous);
		}
		if let Some(next) = next {
			println!("Next day: {}", next);
		}
	}
	Ok(())
}

async fn run(config: &Config, db: &Database, command: Command) -> activity_monitor::db::Result<()> {
	match command {
		Command::Today => print_period(db, Period::Today).await,
		Command::Day(day) => print_period(db, Period::Day(day)).await,
		Command::Month(month) => {
			let period = match month {
				Some((year, month)) => Period::Month { year, month },
				None => feed::this_month(Utc::now()),
			};
			print_period(db, period).await
		}
		Command::Archive(actor) => {
			let mut query = ActivityQuery::new().limit(ARCHIVE_PAGE_SIZE);
			if let Some(actor) = actor {
				query = query.by_actor_name(actor);
			}
			for record in db.load_activities(&query).await? {
				println!(
					"{}  {}  ({})",
					record.timestamp.format("%Y-%m-%d %H:%M"),
					record.short_action_string(),
					record
				);
			}
			Ok(())
		}
		Command::New(since) => {
			let now = Utc::now();
			let last_seen = since.map(|d| d.and_time(NaiveTime::MIN).and_utc());
			let records =
				feed::new_activity(db, last_seen, &[], &[], config.new_activity_cap(), now).await?;
			print_grouped(records, now);
			Ok(())
		}
		Command::Count => {
			let count = feed::activity_count(db, None, Utc::now()).await?;
			println!("{}", count);
			Ok(())
		}
	}
}

#[tokio::main]
async fn main() {
	initialize_logging();

	let mut args: Vec<String> = env::args().skip(1).collect();
	let config_path = if args.first().map(|a| !is_command(a)).unwrap_or(false) {
		PathBuf::from(args.remove(0))
	} else {
		PathBuf::from(config::CONFIG_FILE_PATH)
	};

	let command = match parse_command(&args) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("{}", e);
			eprintln!(
				"usage: activity-monitor [config-path] [today|day YYYY-MM-DD|month [YYYY-MM]|archive \
				 [actor]|new [YYYY-MM-DD]|count]"
			);
			process::exit(2);
		}
	};

	let config = match load_config(&config_path) {
		Some(c) => c,
		None => process::exit(1),
	};
	let db = match load_database(&config).await {
		Some(db) => db,
		None => process::exit(1),
	};

	let result = run(&config, &db, command).await;
	if let Err(e) = db.close().await {
		warn!("Unable to close database: {}", e);
	}
	if let Err(e) = result {
		error!("Unable to load activity: {}", e);
		process::exit(1);
	}
}
