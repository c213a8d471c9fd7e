//! Task filter composition.
//!
//! A [`FilterSet`] plus a [`Scope`] composes into a [`QuerySpec`]: a flat
//! conjunction of predicates, newest first. Backends evaluate the query; no
//! caller filters results again after the fact.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DayZone;
use crate::error::{Error, Result};
use crate::guard::Viewer;
use crate::task::{Priority, Task, TaskStatus};

/// One selected value, or no constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice<T> {
    All,
    Only(T),
}

impl<T> Default for Choice<T> {
    fn default() -> Self {
        Choice::All
    }
}

impl<T> Choice<T> {
    pub fn only(&self) -> Option<&T> {
        match self {
            Choice::All => None,
            Choice::Only(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Choice<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Choice::Only(value),
            None => Choice::All,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Calendar day on which the task was created.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Choice<Priority>,
    #[serde(default)]
    pub status: Choice<TaskStatus>,
    /// Owner filter; only meaningful for the all-users scope.
    #[serde(default)]
    pub user: Choice<Uuid>,
}

/// Base set of rows a query may touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scope {
    Own(Uuid),
    AllUsers,
    Members(Vec<Uuid>),
}

impl Scope {
    /// Admins see everything; everyone else sees their own rows.
    pub fn for_viewer(viewer: &Viewer) -> Scope {
        if viewer.is_admin() {
            Scope::AllUsers
        } else {
            Scope::Own(viewer.user_id())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Predicate {
    Id { value: Uuid },
    OwnedBy { user_id: Uuid },
    OwnerIn { user_ids: Vec<Uuid> },
    Status { value: TaskStatus },
    Priority { value: Priority },
    /// Inclusive on both ends.
    CreatedBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Predicate {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Predicate::Id { value } => task.id == *value,
            Predicate::OwnedBy { user_id } => task.user_id == *user_id,
            Predicate::OwnerIn { user_ids } => user_ids.contains(&task.user_id),
            Predicate::Status { value } => task.status == *value,
            Predicate::Priority { value } => task.priority == *value,
            Predicate::CreatedBetween { start, end } => {
                task.created_at >= *start && task.created_at <= *end
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    CreatedAtDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub predicates: Vec<Predicate>,
    pub order: Order,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn by_id(task_id: Uuid) -> Self {
        Self {
            predicates: vec![Predicate::Id { value: task_id }],
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(task))
    }

    /// Filter, order and limit a set of rows.
    pub fn select<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Vec<Task> {
        let mut selected: Vec<Task> = tasks
            .into_iter()
            .filter(|task| self.matches(task))
            .cloned()
            .collect();
        match self.order {
            Order::CreatedAtDesc => {
                selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Compose using the machine's local time zone for the date filter.
pub fn compose(filters: &FilterSet, scope: &Scope) -> Result<QuerySpec> {
    compose_in(filters, scope, &Local)
}

pub fn compose_zoned(filters: &FilterSet, scope: &Scope, zone: DayZone) -> Result<QuerySpec> {
    match zone {
        DayZone::Local => compose_in(filters, scope, &Local),
        DayZone::Fixed(offset) => compose_in(filters, scope, &offset),
    }
}

pub fn compose_in<Tz: TimeZone>(filters: &FilterSet, scope: &Scope, tz: &Tz) -> Result<QuerySpec> {
    let mut predicates = Vec::new();

    match scope {
        // The owner filter cannot widen an own-rows scope.
        Scope::Own(user_id) => predicates.push(Predicate::OwnedBy { user_id: *user_id }),
        Scope::AllUsers => {
            if let Choice::Only(user_id) = filters.user {
                predicates.push(Predicate::OwnedBy { user_id });
            }
        }
        Scope::Members(user_ids) => {
            predicates.push(Predicate::OwnerIn {
                user_ids: user_ids.clone(),
            });
            if let Choice::Only(user_id) = filters.user {
                predicates.push(Predicate::OwnedBy { user_id });
            }
        }
    }

    if let Choice::Only(value) = filters.status {
        predicates.push(Predicate::Status { value });
    }
    if let Choice::Only(value) = filters.priority {
        predicates.push(Predicate::Priority { value });
    }
    if let Some(day) = filters.date {
        let (start, end) = day_bounds(day, tz)?;
        predicates.push(Predicate::CreatedBetween { start, end });
    }

    Ok(QuerySpec {
        predicates,
        order: Order::CreatedAtDesc,
        limit: None,
    })
}

/// First and last millisecond of `day` in `tz`, as UTC instants.
pub fn day_bounds<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next_day = day
        .succ_opt()
        .ok_or_else(|| Error::InvalidArgument(format!("date out of range: {day}")))?;
    let start = start_of_day(day, tz)?;
    let end = start_of_day(next_day, tz)? - Duration::milliseconds(1);
    Ok((start, end))
}

fn start_of_day<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("date out of range: {day}")))?;
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => Ok(start.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Midnight falls in a DST gap: the day starts at the transition,
            // i.e. midnight read with the offset in force just before it.
            let before = midnight - Duration::hours(1);
            let offset = tz
                .offset_from_local_datetime(&before)
                .earliest()
                .ok_or_else(|| Error::InvalidArgument(format!("no local midnight on {day}")))?
                .fix();
            let utc = midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
            Ok(Utc.from_utc_datetime(&utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn task(user_id: Uuid, created_at: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id,
            title: "t".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            due_date: None,
            created_at,
            remarks: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn all_choices_equal_empty_filters() {
        let scope = Scope::AllUsers;
        let explicit = FilterSet {
            date: None,
            priority: Choice::All,
            status: Choice::All,
            user: Choice::All,
        };
        assert_eq!(
            compose(&explicit, &scope).unwrap(),
            compose(&FilterSet::default(), &scope).unwrap()
        );
    }

    #[test]
    fn own_scope_ignores_user_filter() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let filters = FilterSet {
            user: Choice::Only(other),
            ..FilterSet::default()
        };
        let query = compose(&filters, &Scope::Own(me)).unwrap();
        assert_eq!(query.predicates, vec![Predicate::OwnedBy { user_id: me }]);
    }

    #[test]
    fn day_bounds_are_inclusive_in_fixed_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let (start, end) = day_bounds(date(2024, 3, 10), &tz).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 3, 10, 21, 59, 59).unwrap() + Duration::milliseconds(999)
        );

        let owner = Uuid::new_v4();
        let filters = FilterSet {
            date: Some(date(2024, 3, 10)),
            ..FilterSet::default()
        };
        let query = compose_in(&filters, &Scope::Own(owner), &tz).unwrap();
        assert!(query.matches(&task(owner, end)));
        assert!(query.matches(&task(owner, start)));
        assert!(!query.matches(&task(owner, end + Duration::milliseconds(1))));
        assert!(!query.matches(&task(owner, start - Duration::milliseconds(1))));
    }

    #[test]
    fn select_orders_newest_first_and_limits() {
        let owner = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let tasks: Vec<Task> = (0..5)
            .map(|i| task(owner, base + Duration::minutes(i)))
            .collect();
        let query = QuerySpec::default().with_limit(3);
        let selected = query.select(&tasks);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].created_at, base + Duration::minutes(4));
        assert_eq!(selected[2].created_at, base + Duration::minutes(2));
    }

    #[test]
    fn members_scope_intersects_user_filter() {
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let filters = FilterSet {
            user: Choice::Only(outsider),
            ..FilterSet::default()
        };
        let query = compose(&filters, &Scope::Members(vec![member])).unwrap();
        assert!(!query.matches(&task(outsider, Utc::now())));
        assert!(!query.matches(&task(member, Utc::now())));
    }

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn day_starting_in_dst_gap_begins_at_transition() {
        let tz = chrono_tz::America::Santiago;
        // Clocks jump from 00:00 -04 to 01:00 -03 on 2024-09-08.
        let (start, end) = day_bounds(ymd(2024, 9, 8), &tz).unwrap();
        assert_eq!(start, utc(2024, 9, 8, 4));
        assert_eq!(end + Duration::milliseconds(1), utc(2024, 9, 9, 3));

        let (_, previous_end) = day_bounds(ymd(2024, 9, 7), &tz).unwrap();
        assert_eq!(previous_end + Duration::milliseconds(1), start);
    }

    #[test]
    fn days_tile_across_fall_back() {
        let tz = chrono_tz::America::Santiago;
        // 2024-04-07 00:00 -03 becomes 2024-04-06 23:00 -04.
        let (start, end) = day_bounds(ymd(2024, 4, 6), &tz).unwrap();
        let (next_start, _) = day_bounds(ymd(2024, 4, 7), &tz).unwrap();
        assert_eq!(start, utc(2024, 4, 6, 3));
        assert_eq!(next_start, utc(2024, 4, 7, 4));
        assert_eq!(end + Duration::milliseconds(1), next_start);
        assert_eq!(next_start - start, Duration::hours(25));
    }
}
