//! Turns activity records into what a feed shows: groups of actors per
//! target, counts and day-by-day periods.

use std::{
	collections::{HashMap, HashSet},
	vec,
};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{
	activity::ActivityRecord,
	db::{self, ActivityQuery, PersistenceHandle},
};


/// Activity within this many hours counts as current.
pub const CURRENT_HOURS: i64 = 24;


/// All records with the same target, collapsed into one feed entry.
#[derive(Clone, Debug)]
pub struct GroupedActivity {
	/// The first record seen for the target.
	pub item: ActivityRecord,
	/// Actor names in the order they were first seen.
	pub actors: Vec<String>,
	/// The number of actors besides the first, as in "Joe and 2 others".
	pub actor_count: usize,
	pub verb: Option<String>,
	pub last_modified: DateTime<Utc>,
	pub is_current: bool,
	known_actors: HashSet<String>,
}

/// Groups keyed by target, in the order their target first appeared.
#[derive(Clone, Debug, Default)]
pub struct GroupedFeed {
	groups: Vec<GroupedActivity>,
	index: HashMap<String, usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Period {
	/// The trailing 24 hours.
	Today,
	Day(NaiveDate),
	Month { year: i32, month: u32 },
	Year(i32),
}


fn start_of(day: NaiveDate) -> DateTime<Utc> { day.and_time(NaiveTime::MIN).and_utc() }

/// The last representable moment of the day.
fn end_of(day: NaiveDate) -> Option<DateTime<Utc>> {
	Some(start_of(day.succ_opt()?) - Duration::milliseconds(1))
}

/// Groups the records by their target. The records are expected to be in
/// descending time order, so the first record of each group is its most
/// recent one.
pub fn group_activities<I>(records: I, now: DateTime<Utc>) -> GroupedFeed
where
	I: IntoIterator<Item = ActivityRecord>,
{
	let current_since = now - Duration::hours(CURRENT_HOURS);
	let mut feed = GroupedFeed::default();
	for record in records {
		match feed.index.get(&record.target) {
			Some(&i) => {
				let group = &mut feed.groups[i];
				if group.known_actors.insert(record.actor_name.clone()) {
					group.actors.push(record.actor_name.clone());
					group.actor_count += 1;
				}
				if record.timestamp > group.last_modified {
					group.last_modified = record.timestamp;
				}
			}
			None => {
				let group = GroupedActivity {
					actors: vec![record.actor_name.clone()],
					actor_count: 0,
					verb: record.display_verb().map(str::to_string),
					last_modified: record.timestamp,
					is_current: record.timestamp >= current_since,
					known_actors: HashSet::from([record.actor_name.clone()]),
					item: record,
				};
				feed.index
					.insert(group.item.target.clone(), feed.groups.len());
				feed.groups.push(group);
			}
		}
	}
	feed
}

/// Joins the strings with commas, except for the last two which are joined
/// with "and".
pub fn join_and<S: AsRef<str>>(values: &[S]) -> String {
	match values {
		[] => String::new(),
		[only] => only.as_ref().to_string(),
		[init @ .., last] => {
			let init: Vec<&str> = init.iter().map(|s| s.as_ref()).collect();
			format!("{} and {}", init.join(", "), last.as_ref())
		}
	}
}

/// Counts the activity since the given moment, or within the last day.
pub async fn activity_count<H>(
	db: &H, since: Option<DateTime<Utc>>, now: DateTime<Utc>,
) -> db::Result<u64>
where
	H: PersistenceHandle + Sync,
{
	let since = since.unwrap_or(now - Duration::hours(CURRENT_HOURS));
	db.count_activities_since(since).await
}

/// The newest activity, at most `count` records.
pub async fn recent_activity<H>(db: &H, count: u64) -> db::Result<Vec<ActivityRecord>>
where
	H: PersistenceHandle + Sync,
{
	db.load_activities(&ActivityQuery::new().limit(count))
		.await
}

/// Activity since a user was last seen, or since the start of today.
/// Inclusion of kinds is applied before exclusion.
pub async fn new_activity<H>(
	db: &H, last_seen: Option<DateTime<Utc>>, include: &[String], exclude: &[String], cap: u64,
	now: DateTime<Utc>,
) -> db::Result<Vec<ActivityRecord>>
where
	H: PersistenceHandle + Sync,
{
	let since = last_seen.unwrap_or_else(|| start_of(now.date_naive()));
	let query = ActivityQuery::new()
		.since(since)
		.include(include.iter().cloned())
		.exclude(exclude.iter().cloned())
		.limit(cap);
	db.load_activities(&query).await
}


impl GroupedActivity {
	pub fn target(&self) -> &str { &self.item.target }

	/// The actors as a sentence, e.g. "Joe, Ann and Bob".
	pub fn actors_string(&self) -> String { join_and(&self.actors) }
}

impl GroupedFeed {
	pub fn get(&self, target: &str) -> Option<&GroupedActivity> {
		self.index.get(target).map(|&i| &self.groups[i])
	}

	pub fn iter(&self) -> impl Iterator<Item = &GroupedActivity> { self.groups.iter() }

	pub fn targets(&self) -> impl Iterator<Item = &str> { self.groups.iter().map(|g| g.target()) }

	pub fn len(&self) -> usize { self.groups.len() }

	pub fn is_empty(&self) -> bool { self.groups.is_empty() }
}

impl IntoIterator for GroupedFeed {
	type IntoIter = vec::IntoIter<GroupedActivity>;
	type Item = GroupedActivity;

	fn into_iter(self) -> Self::IntoIter { self.groups.into_iter() }
}

impl Period {
	/// The inclusive time range covered by the period. Returns `None` for
	/// dates that don't exist.
	pub fn range(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
		match *self {
			Self::Today => Some((now - Duration::hours(CURRENT_HOURS), now)),
			Self::Day(day) => Some((start_of(day), end_of(day)?)),
			Self::Month { year, month } => {
				let first = NaiveDate::from_ymd_opt(year, month, 1)?;
				let next = if month == 12 {
					NaiveDate::from_ymd_opt(year + 1, 1, 1)?
				} else {
					NaiveDate::from_ymd_opt(year, month + 1, 1)?
				};
				Some((start_of(first), end_of(next.pred_opt()?)?))
			}
			Self::Year(year) => {
				let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
				let last = NaiveDate::from_ymd_opt(year, 12, 31)?;
				Some((start_of(first), end_of(last)?))
			}
		}
	}

	/// The newest-first query for all activity within the period.
	pub fn query(&self, now: DateTime<Utc>) -> Option<ActivityQuery> {
		let (start, end) = self.range(now)?;
		Some(ActivityQuery::new().between(start, end))
	}

	/// A heading for the period, like "August 25 2014" or "August 2014".
	pub fn title(&self, now: DateTime<Utc>) -> String {
		match *self {
			Self::Today => now.format("%B %d %Y").to_string(),
			Self::Day(day) => day.format("%B %d %Y").to_string(),
			Self::Month { year, month } => match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single() {
				Some(first) => first.format("%B %Y").to_string(),
				None => format!("{}-{:02}", year, month),
			},
			Self::Year(year) => year.to_string(),
		}
	}
}

/// The days before and after the visible day. There is no next day when the
/// visible day is today.
pub fn adjacent_days(visible: NaiveDate, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
	let previous = visible.pred_opt();
	let next = if visible == today {
		None
	} else {
		visible.succ_opt()
	};
	(previous, next)
}

/// The period of the calendar day `now` falls in.
pub fn this_day(now: DateTime<Utc>) -> Period { Period::Day(now.date_naive()) }

/// The period of the calendar month `now` falls in.
pub fn this_month(now: DateTime<Utc>) -> Period {
	Period::Month {
		year: now.year(),
		month: now.month(),
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::{core::*, test};

	fn record(target: &str, actor: &str, timestamp: DateTime<Utc>) -> ActivityRecord {
		ActivityRecord::new(
			0,
			0,
			actor.to_string(),
			Some("commented on".to_string()),
			None,
			target.to_string(),
			timestamp,
			Identity::new(ContentType::parse("blog.comment").unwrap(), 0),
		)
	}

	#[test]
	fn test_grouping() {
		let now = test::now();
		let at = |hours: i64| now - Duration::hours(hours);
		let feed = group_activities(
			vec![
				record("A", "x", at(1)),
				record("B", "y", at(2)),
				record("A", "z", at(3)),
				record("A", "x", at(4)),
			],
			now,
		);

		assert_eq!(feed.targets().collect::<Vec<_>>(), ["A", "B"]);
		let a = feed.get("A").unwrap();
		assert_eq!(a.actors, ["x", "z"]);
		assert_eq!(a.actor_count, 1);
		assert_eq!(a.last_modified, at(1));
		assert_eq!(a.actors_string(), "x and z");
		let b = feed.get("B").unwrap();
		assert_eq!(b.actors, ["y"]);
		assert_eq!(b.actor_count, 0);
		assert_eq!(b.last_modified, at(2));
	}

	#[test]
	fn test_grouping_keeps_first_seen_item() {
		let now = test::now();
		let mut later = record("A", "y", now - Duration::hours(1));
		later.override_string = Some("replied to".to_string());
		let feed = group_activities(vec![record("A", "x", now - Duration::hours(30)), later], now);

		let a = feed.get("A").unwrap();
		// Only the actors and the last modified time follow later records
		assert_eq!(a.item.actor_name, "x");
		assert_eq!(a.verb.as_deref(), Some("commented on"));
		assert!(!a.is_current);
		assert_eq!(a.last_modified, now - Duration::hours(1));
		assert_eq!(a.actors, ["x", "y"]);
	}

	#[test]
	fn test_grouping_empty() {
		let feed = group_activities(Vec::new(), test::now());
		assert!(feed.is_empty());
		assert!(feed.get("A").is_none());
	}

	#[test]
	fn test_join_and() {
		assert_eq!(join_and::<&str>(&[]), "");
		assert_eq!(join_and(&["apples"]), "apples");
		assert_eq!(join_and(&["apples", "pears"]), "apples and pears");
		assert_eq!(join_and(&["apples", "oranges", "pears"]), "apples, oranges and pears");
	}

	#[test]
	fn test_period_ranges() {
		let now = Utc.with_ymd_and_hms(2024, 2, 10, 15, 30, 0).unwrap();

		let (start, end) = Period::Today.range(now).unwrap();
		assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 9, 15, 30, 0).unwrap());
		assert_eq!(end, now);

		let (start, end) = this_month(now).range(now).unwrap();
		assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
		assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() - Duration::milliseconds(1));

		let (start, end) = Period::Month { year: 2023, month: 12 }.range(now).unwrap();
		assert_eq!(start, Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
		assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() - Duration::milliseconds(1));

		let (start, end) = this_day(now).range(now).unwrap();
		assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap());
		assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 11, 0, 0, 0).unwrap() - Duration::milliseconds(1));

		let (start, _) = Period::Year(2023).range(now).unwrap();
		assert_eq!(start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());

		assert!(Period::Month { year: 2024, month: 13 }.range(now).is_none());
		assert_eq!(this_month(now).title(now), "February 2024");
	}

	#[test]
	fn test_adjacent_days() {
		let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
		let yesterday = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();

		assert_eq!(adjacent_days(today, today), (Some(yesterday), None));
		assert_eq!(
			adjacent_days(yesterday, today),
			(NaiveDate::from_ymd_opt(2024, 2, 8), Some(today))
		);
	}

	#[tokio::test]
	async fn test_new_activity_and_count() {
		let db = test::load_database("feed-new-activity").await;
		let now = test::now();
		let alice = test::actor(1, "alice");
		let new = |label: &str, id: i64, hours_ago: i64| db::NewActivity {
			identity: Identity::new(ContentType::parse(label).unwrap(), id),
			actor: alice.clone(),
			verb: None,
			override_string: None,
			timestamp: now - Duration::hours(hours_ago),
			target: format!("{} {}", label, id),
		};
		db.create_activity(&new("blog.entry", 1, 1)).await.unwrap();
		db.create_activity(&new("blog.comment", 1, 2)).await.unwrap();
		db.create_activity(&new("blog.comment", 2, 3)).await.unwrap();
		db.create_activity(&new("auth.user", 1, 30)).await.unwrap();

		assert_eq!(activity_count(&db, None, now).await.unwrap(), 3);
		assert_eq!(
			activity_count(&db, Some(now - Duration::hours(48)), now)
				.await
				.unwrap(),
			4
		);

		let last_seen = Some(now - Duration::hours(48));
		let all = new_activity(&db, last_seen, &[], &[], 1000, now).await.unwrap();
		assert_eq!(all.len(), 4);
		let capped = new_activity(&db, last_seen, &[], &[], 2, now).await.unwrap();
		assert_eq!(capped.len(), 2);
		assert_eq!(capped[0].target, "blog.entry 1");

		let comments = new_activity(&db, last_seen, &["comment".to_string()], &[], 1000, now)
			.await
			.unwrap();
		assert_eq!(comments.len(), 2);
		let no_comments = new_activity(&db, last_seen, &[], &["comment".to_string()], 1000, now)
			.await
			.unwrap();
		assert_eq!(no_comments.len(), 2);

		let recent = recent_activity(&db, 1).await.unwrap();
		assert_eq!(recent[0].target, "blog.entry 1");
	}
}
