//! Period dashboard: calories in, calories out (active + basal) and balance.
//!
//! Everything here is a pure function of the snapshot and the wall-clock time
//! it is evaluated at. Invalid input degrades to zeros, never to an error.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::debug;

use crate::models::{ActivityLogEntry, ConsumptionLogEntry, Gender, Profile, StateSnapshot};

/// Reporting period selectable on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// Days of basal expenditure counted in the period total.
    ///
    /// Month and year both use a flat 30 regardless of the calendar.
    pub fn bmr_days(&self) -> f64 {
        match self {
            Period::Day => 1.0,
            Period::Week => 7.0,
            Period::Month | Period::Year => 30.0,
        }
    }

    fn bucket_index(&self, at: NaiveDateTime) -> usize {
        match self {
            Period::Day => 0,
            Period::Week => at.weekday().num_days_from_monday() as usize,
            Period::Month => at.day0() as usize,
            Period::Year => at.month0() as usize,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

/// Language of the bucket labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    English,
    German,
}

impl Locale {
    fn today(&self) -> &'static str {
        match self {
            Locale::English => "Today",
            Locale::German => "Heute",
        }
    }

    fn weekdays(&self) -> [&'static str; 7] {
        match self {
            Locale::English => ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"],
            Locale::German => ["Mo", "Di", "Mi", "Do", "Fr", "Sa", "So"],
        }
    }

    fn months(&self) -> [&'static str; 12] {
        match self {
            Locale::English => [
                "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
            ],
            Locale::German => [
                "Jan", "Feb", "Mär", "Apr", "Mai", "Jun", "Jul", "Aug", "Sep", "Okt", "Nov", "Dez",
            ],
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::English),
            "de" | "german" | "deutsch" => Ok(Locale::German),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Inclusive instant range of a period with its bucket labels.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub labels: Vec<String>,
}

impl PeriodRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Resolves `period` around `now`. `None` only at the edges of the calendar.
pub fn resolve_period(period: Period, now: NaiveDateTime, locale: Locale) -> Option<PeriodRange> {
    let today = now.date();
    let (first, next, labels): (NaiveDate, NaiveDate, Vec<String>) = match period {
        Period::Day => (today, today.succ_opt()?, vec![locale.today().to_string()]),
        Period::Week => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            let labels = locale.weekdays().iter().map(|d| d.to_string()).collect();
            (monday, monday + Duration::days(7), labels)
        }
        Period::Month => {
            let first = today.with_day(1)?;
            let next = if today.month() == 12 {
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)?
            };
            let days = (next - first).num_days();
            (first, next, (1..=days).map(|d| d.to_string()).collect())
        }
        Period::Year => {
            let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
            let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?;
            let labels = locale.months().iter().map(|m| m.to_string()).collect();
            (first, next, labels)
        }
    };

    Some(PeriodRange {
        start: first.and_time(NaiveTime::MIN),
        end: next.and_time(NaiveTime::MIN) - Duration::milliseconds(1),
        labels,
    })
}

/// Everything the dashboard cards and chart need for one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardResult {
    pub labels: Vec<String>,
    pub calories_in: Vec<i64>,
    pub calories_out_active: Vec<i64>,
    pub calories_out_bmr: Vec<i64>,
    pub details_in: Vec<Vec<String>>,
    pub details_out: Vec<Vec<String>>,
    pub total_in: i64,
    pub total_out_active: i64,
    pub total_out_bmr: i64,
    pub total_out: i64,
    pub balance: i64,
    pub balance_goal: i64,
}

/// Daily basal metabolic rate in kcal (Mifflin-St Jeor variant).
///
/// Zero when gender is neither male nor female or when age, height or weight
/// is missing or not positive.
pub fn basal_metabolic_rate(profile: &Profile) -> f64 {
    let (Some(gender), Some(age), Some(height_cm), Some(weight_kg)) = (
        profile.gender,
        profile.age,
        profile.height_cm,
        profile.weight_kg,
    ) else {
        return 0.0;
    };

    if age <= 0 || height_cm <= 0.0 || weight_kg <= 0.0 {
        return 0.0;
    }

    let age = age as f64;
    match gender {
        Gender::Female => 655.1 + 9.6 * weight_kg + 1.8 * height_cm - 4.7 * age,
        Gender::Male => 66.47 + 13.7 * weight_kg + 5.0 * height_cm - 6.8 * age,
        Gender::Unspecified => 0.0,
    }
}

/// Nearest integer, ties toward positive infinity.
pub fn round_kcal(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

trait CalorieLog {
    fn logged_at(&self) -> NaiveDateTime;
    fn calories(&self) -> f64;
    fn name(&self) -> &str;
}

impl CalorieLog for ConsumptionLogEntry {
    fn logged_at(&self) -> NaiveDateTime {
        self.log_date
    }

    fn calories(&self) -> f64 {
        self.calories
    }

    fn name(&self) -> &str {
        &self.food_name
    }
}

impl CalorieLog for ActivityLogEntry {
    fn logged_at(&self) -> NaiveDateTime {
        self.log_date
    }

    fn calories(&self) -> f64 {
        self.calories
    }

    fn name(&self) -> &str {
        &self.exercise_name
    }
}

struct Buckets {
    values: Vec<i64>,
    details: Vec<Vec<String>>,
}

fn bucket_logs<L: CalorieLog>(logs: &[L], period: Period, range: &PeriodRange) -> Buckets {
    let count = range.labels.len();
    let mut sums = vec![0.0_f64; count];
    let mut details = vec![Vec::new(); count];

    for log in logs.iter().filter(|log| range.contains(log.logged_at())) {
        let idx = period.bucket_index(log.logged_at());
        if idx >= count {
            continue;
        }
        sums[idx] += log.calories();
        details[idx].push(format!("{}: {} kcal", log.name(), round_kcal(log.calories())));
    }

    Buckets {
        values: sums.into_iter().map(round_kcal).collect(),
        details,
    }
}

/// Dashboard for `period` as of now.
pub fn build_dashboard(period: &str, snapshot: &StateSnapshot, locale: Locale) -> DashboardResult {
    build_dashboard_at(period, snapshot, Local::now().naive_local(), locale)
}

/// Dashboard for `period` as of `now`. Unknown periods yield an empty result.
pub fn build_dashboard_at(
    period: &str,
    snapshot: &StateSnapshot,
    now: NaiveDateTime,
    locale: Locale,
) -> DashboardResult {
    match period.parse::<Period>() {
        Ok(period) => aggregate(period, snapshot, now, locale),
        Err(err) => {
            debug!("{err}; returning empty dashboard");
            DashboardResult::default()
        }
    }
}

pub fn aggregate(
    period: Period,
    snapshot: &StateSnapshot,
    now: NaiveDateTime,
    locale: Locale,
) -> DashboardResult {
    let Some(range) = resolve_period(period, now, locale) else {
        return DashboardResult::default();
    };

    let intake = bucket_logs(&snapshot.consumption_logs, period, &range);
    let active = bucket_logs(&snapshot.activity_logs, period, &range);

    let daily_bmr = basal_metabolic_rate(&snapshot.user_profile);
    let calories_out_bmr = vec![round_kcal(daily_bmr); range.labels.len()];

    let total_in: i64 = intake.values.iter().sum();
    let total_out_active: i64 = active.values.iter().sum();
    let total_out_bmr = round_kcal(daily_bmr * period.bmr_days());
    let total_out = total_out_active + total_out_bmr;

    DashboardResult {
        labels: range.labels,
        calories_in: intake.values,
        calories_out_active: active.values,
        calories_out_bmr,
        details_in: intake.details,
        details_out: active.details,
        total_in,
        total_out_active,
        total_out_bmr,
        total_out,
        balance: total_in - total_out,
        balance_goal: snapshot.user_profile.balance_goal_kcal.unwrap_or(0),
    }
}
