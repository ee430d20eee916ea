use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Entity identifier, normalized to its string form.
///
/// The backend emits integer ids while ids typed in by hand or restored from
/// older caches may be strings, so both deserialize to the same value and
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Float(f64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => EntityId::from(n),
            RawId::Float(n) if n.fract() == 0.0 => EntityId::from(n as i64),
            RawId::Float(n) => EntityId(n.to_string()),
            RawId::Text(s) => EntityId::new(s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unspecified => "unspecified",
        }
    }
}

impl FromStr for Gender {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => Gender::Unspecified,
        })
    }
}

impl Serialize for Gender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse::<Gender>().unwrap_or_default())
    }
}

/// User profile. Every field is optional on the wire; an absent profile is
/// `Profile::default()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Age in years
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub tracking_start_date: Option<NaiveDate>,
    /// Target balance for the period (negative for a deficit)
    #[serde(default)]
    pub balance_goal_kcal: Option<i64>,
}

/// A food with its energy density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: EntityId,
    pub name: String,
    pub calories_per_100g: f64,
}

/// A kind of exercise with its hourly energy expenditure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseType {
    pub id: EntityId,
    pub name: String,
    pub calories_per_hour: f64,
}

/// One logged consumption. `calories` and `food_name` are filled in by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionLogEntry {
    pub id: EntityId,
    #[serde(with = "local_datetime")]
    pub log_date: NaiveDateTime,
    pub food_id: EntityId,
    pub amount_g: f64,
    pub calories: f64,
    #[serde(default)]
    pub food_name: String,
}

/// One logged activity. `calories` and `exercise_name` are filled in by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: EntityId,
    #[serde(with = "local_datetime")]
    pub log_date: NaiveDateTime,
    pub exercise_type_id: EntityId,
    pub duration_min: f64,
    pub calories: f64,
    #[serde(default)]
    pub exercise_name: String,
}

/// Response of `GET /api/tracking-data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackingData {
    #[serde(default)]
    pub foods: Vec<FoodItem>,
    #[serde(default)]
    pub exercise_types: Vec<ExerciseType>,
    #[serde(default)]
    pub consumption_logs: Vec<ConsumptionLogEntry>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityLogEntry>,
    #[serde(default)]
    pub user_profile: Option<Profile>,
}

/// Everything tracked for the active session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub foods: Vec<FoodItem>,
    #[serde(default)]
    pub exercise_types: Vec<ExerciseType>,
    #[serde(default)]
    pub consumption_logs: Vec<ConsumptionLogEntry>,
    #[serde(default)]
    pub activity_logs: Vec<ActivityLogEntry>,
    #[serde(default)]
    pub user_profile: Profile,
}

impl From<TrackingData> for StateSnapshot {
    fn from(data: TrackingData) -> Self {
        Self {
            foods: data.foods,
            exercise_types: data.exercise_types,
            consumption_logs: data.consumption_logs,
            activity_logs: data.activity_logs,
            user_profile: data.user_profile.unwrap_or_default(),
        }
    }
}

impl StateSnapshot {
    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Foods => self.foods.len(),
            Collection::ExerciseTypes => self.exercise_types.len(),
            Collection::ConsumptionLogs => self.consumption_logs.len(),
            Collection::ActivityLogs => self.activity_logs.len(),
        }
    }
}

/// Named entity collections of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Foods,
    ExerciseTypes,
    ConsumptionLogs,
    ActivityLogs,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Foods,
        Collection::ExerciseTypes,
        Collection::ConsumptionLogs,
        Collection::ActivityLogs,
    ];

    /// Key of the collection inside the snapshot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Foods => "foods",
            Collection::ExerciseTypes => "exercise_types",
            Collection::ConsumptionLogs => "consumption_logs",
            Collection::ActivityLogs => "activity_logs",
        }
    }

    /// Path segment of the collection's REST resource.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Collection::Foods => "foods",
            Collection::ExerciseTypes => "exercisetypes",
            Collection::ConsumptionLogs => "consumptionlogs",
            Collection::ActivityLogs => "activitylogs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.endpoint() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// A stored entity type with its home collection in the snapshot.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> &EntityId;
    fn items(snapshot: &StateSnapshot) -> &Vec<Self>;
    fn items_mut(snapshot: &mut StateSnapshot) -> &mut Vec<Self>;
}

macro_rules! impl_entity {
    ($ty:ty, $collection:expr, $field:ident) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn items(snapshot: &StateSnapshot) -> &Vec<Self> {
                &snapshot.$field
            }

            fn items_mut(snapshot: &mut StateSnapshot) -> &mut Vec<Self> {
                &mut snapshot.$field
            }
        }
    };
}

impl_entity!(FoodItem, Collection::Foods, foods);
impl_entity!(ExerciseType, Collection::ExerciseTypes, exercise_types);
impl_entity!(ConsumptionLogEntry, Collection::ConsumptionLogs, consumption_logs);
impl_entity!(ActivityLogEntry, Collection::ActivityLogs, activity_logs);

/// A create/update payload for one entity type.
pub trait Draft: Serialize {
    type Entity: Entity;

    /// Checks required fields before anything is sent.
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FoodDraft {
    pub name: String,
    pub calories_per_100g: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExerciseTypeDraft {
    pub name: String,
    pub calories_per_hour: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumptionLogDraft {
    #[serde(with = "local_datetime::option")]
    pub log_date: Option<NaiveDateTime>,
    pub food_id: Option<EntityId>,
    pub amount_g: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityLogDraft {
    #[serde(with = "local_datetime::option")]
    pub log_date: Option<NaiveDateTime>,
    pub exercise_type_id: Option<EntityId>,
    pub duration_min: Option<f64>,
}

fn require_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    Ok(())
}

fn require_amount(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        None => Err(ValidationError::MissingField(field)),
        Some(v) if v.is_nan() => Err(ValidationError::MissingField(field)),
        Some(v) if v < 0.0 => Err(ValidationError::Negative(field)),
        Some(_) => Ok(()),
    }
}

fn require<T>(field: &'static str, value: &Option<T>) -> Result<(), ValidationError> {
    value
        .as_ref()
        .map(|_| ())
        .ok_or(ValidationError::MissingField(field))
}

impl Draft for FoodDraft {
    type Entity = FoodItem;

    fn validate(&self) -> Result<(), ValidationError> {
        require_name(&self.name)?;
        require_amount("calories_per_100g", self.calories_per_100g)
    }
}

impl Draft for ExerciseTypeDraft {
    type Entity = ExerciseType;

    fn validate(&self) -> Result<(), ValidationError> {
        require_name(&self.name)?;
        require_amount("calories_per_hour", self.calories_per_hour)
    }
}

impl Draft for ConsumptionLogDraft {
    type Entity = ConsumptionLogEntry;

    fn validate(&self) -> Result<(), ValidationError> {
        require("log_date", &self.log_date)?;
        require("food_id", &self.food_id)?;
        require_amount("amount_g", self.amount_g)
    }
}

impl Draft for ActivityLogDraft {
    type Entity = ActivityLogEntry;

    fn validate(&self) -> Result<(), ValidationError> {
        require("log_date", &self.log_date)?;
        require("exercise_type_id", &self.exercise_type_id)?;
        require_amount("duration_min", self.duration_min)
    }
}

/// Payload of `PUT /api/profile`. Empty form fields are sent as `null`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    pub gender: Option<Gender>,
    pub age: Option<i64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub tracking_start_date: Option<NaiveDate>,
    pub balance_goal_kcal: Option<i64>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if matches!(self.height_cm, Some(v) if v < 0.0) {
            return Err(ValidationError::Negative("height_cm"));
        }
        if matches!(self.weight_kg, Some(v) if v < 0.0) {
            return Err(ValidationError::Negative("weight_kg"));
        }
        Ok(())
    }
}

impl From<&Profile> for ProfileUpdate {
    fn from(profile: &Profile) -> Self {
        Self {
            gender: profile.gender,
            age: profile.age,
            height_cm: profile.height_cm,
            weight_kg: profile.weight_kg,
            tracking_start_date: profile.tracking_start_date,
            balance_goal_kcal: profile.balance_goal_kcal,
        }
    }
}

/// Log timestamps in local wall-clock time.
///
/// The backend sends naive date-times; offset-qualified RFC 3339 strings are
/// converted to the local zone.
pub mod local_datetime {
    use chrono::{DateTime, Local, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
    const ACCEPTED: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Local).naive_local());
        }
        ACCEPTED
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn entity_id_accepts_numbers_and_strings() {
        let a: EntityId = serde_json::from_value(json!(7)).unwrap();
        let b: EntityId = serde_json::from_value(json!("7")).unwrap();
        let c: EntityId = serde_json::from_value(json!(7.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.as_str(), "7");
    }

    #[test]
    fn gender_parses_case_insensitively() {
        let profile: Profile = serde_json::from_value(json!({
            "gender": "Female",
            "age": 30
        }))
        .unwrap();
        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.height_cm, None);

        let other: Profile = serde_json::from_value(json!({ "gender": "divers" })).unwrap();
        assert_eq!(other.gender, Some(Gender::Unspecified));
    }

    #[test]
    fn tracking_data_defaults_missing_parts() {
        let data: TrackingData = serde_json::from_value(json!({
            "foods": [{ "id": 1, "name": "Apple", "calories_per_100g": 52 }],
            "user_profile": null
        }))
        .unwrap();
        let snapshot = StateSnapshot::from(data);
        assert_eq!(snapshot.foods.len(), 1);
        assert!(snapshot.consumption_logs.is_empty());
        assert_eq!(snapshot.user_profile, Profile::default());
    }

    #[test]
    fn log_entry_parses_naive_and_short_timestamps() {
        let entry: ConsumptionLogEntry = serde_json::from_value(json!({
            "id": 3,
            "log_date": "2026-03-14T08:30",
            "food_id": 1,
            "amount_g": 150,
            "calories": 78.0,
            "food_name": "Apple"
        }))
        .unwrap();
        assert_eq!(
            entry.log_date,
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap()
        );

        let long = local_datetime::parse("2026-03-14T08:30:15.250").unwrap();
        assert_eq!(long.nanosecond(), 250_000_000);
        assert!(local_datetime::parse("yesterday").is_none());
    }

    #[test]
    fn collection_names_resolve_both_ways() {
        assert_eq!("exercise_types".parse::<Collection>(), Ok(Collection::ExerciseTypes));
        assert_eq!("activitylogs".parse::<Collection>(), Ok(Collection::ActivityLogs));
        assert!("users".parse::<Collection>().is_err());
    }

    #[test]
    fn drafts_report_first_missing_field() {
        let draft = ConsumptionLogDraft {
            log_date: None,
            food_id: Some(EntityId::from(1)),
            amount_g: Some(100.0),
        };
        assert_eq!(draft.validate(), Err(ValidationError::MissingField("log_date")));

        let food = FoodDraft {
            name: "  ".into(),
            calories_per_100g: Some(10.0),
        };
        assert_eq!(food.validate(), Err(ValidationError::MissingField("name")));

        let exercise = ExerciseTypeDraft {
            name: "Rowing".into(),
            calories_per_hour: Some(-1.0),
        };
        assert_eq!(
            exercise.validate(),
            Err(ValidationError::Negative("calories_per_hour"))
        );
    }
}
