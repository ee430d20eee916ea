use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::client::DataApi;
use crate::dashboard::{build_dashboard, DashboardResult, Locale};
use crate::error::ApiResult;
use crate::models::*;

static EMPTY_PROFILE: Profile = Profile {
    gender: None,
    age: None,
    height_cm: None,
    weight_kg: None,
    tracking_start_date: None,
    balance_goal_kcal: None,
};

/// The session's single source of truth for tracked entities and the profile.
///
/// Reads are served from memory. Every local mutation is committed to the
/// cache; if a commit fails the store keeps working from memory alone until
/// it is cleared.
pub struct StateStore<A, C> {
    api: A,
    cache: C,
    locale: Locale,
    state: Option<StateSnapshot>,
    persist: bool,
}

impl<A: DataApi, C: SnapshotCache> StateStore<A, C> {
    pub fn new(api: A, cache: C) -> Self {
        Self {
            api,
            cache,
            locale: Locale::default(),
            state: None,
            persist: true,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Restores the snapshot from the cache, or fetches it from the backend
    /// when nothing is cached.
    ///
    /// An expired session clears the store before the error is returned.
    pub async fn initialize(&mut self) -> ApiResult<StateSnapshot> {
        match self.cache.load() {
            Ok(Some(snapshot)) => {
                info!("state initialized from cache");
                self.state = Some(snapshot.clone());
                return Ok(snapshot);
            }
            Ok(None) => {}
            Err(err) => warn!("ignoring unreadable state cache: {err:#}"),
        }

        let result = self.api.fetch_tracking_data().await;
        let data = match self.check(result) {
            Ok(data) => data,
            Err(err) => {
                warn!("could not fetch initial tracking data: {err}");
                return Err(err);
            }
        };

        let snapshot = StateSnapshot::from(data);
        self.state = Some(snapshot.clone());
        self.commit();
        info!(
            foods = snapshot.foods.len(),
            consumption_logs = snapshot.consumption_logs.len(),
            activity_logs = snapshot.activity_logs.len(),
            "state fetched from server"
        );
        Ok(snapshot)
    }

    /// Drops the snapshot and the cached copy.
    pub fn clear(&mut self) {
        self.state = None;
        self.persist = true;
        if let Err(err) = self.cache.clear() {
            warn!("failed to clear state cache: {err:#}");
        }
        info!("state and cache cleared");
    }

    /// An independent copy of the current snapshot.
    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.state.clone()
    }

    /// Items of the collection selected by the entity type, e.g.
    /// `collection::<FoodItem>()` for `foods`.
    pub fn collection<E: Entity>(&self) -> &[E] {
        self.state
            .as_ref()
            .map(|state| E::items(state).as_slice())
            .unwrap_or(&[])
    }

    pub fn collection_len(&self, collection: Collection) -> usize {
        self.state
            .as_ref()
            .map(|state| state.len_of(collection))
            .unwrap_or(0)
    }

    pub fn profile(&self) -> &Profile {
        self.state
            .as_ref()
            .map(|state| &state.user_profile)
            .unwrap_or(&EMPTY_PROFILE)
    }

    pub fn add_item<E: Entity>(&mut self, item: E) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        E::items_mut(state).push(item);
        self.commit();
    }

    /// Replaces the entry with the same id. Unknown ids are ignored.
    pub fn update_item<E: Entity>(&mut self, item: E) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let items = E::items_mut(state);
        let Some(slot) = items.iter_mut().find(|existing| existing.id() == item.id()) else {
            debug!("no {} entry with id {}", E::COLLECTION, item.id());
            return;
        };
        *slot = item;
        self.commit();
    }

    /// Removes the entry with `id`, if present.
    pub fn delete_item<E: Entity>(&mut self, id: &EntityId) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        E::items_mut(state).retain(|item| item.id() != id);
        self.commit();
    }

    pub fn update_profile(&mut self, profile: Profile) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.user_profile = profile;
        self.commit();
    }

    /// Creates an entity on the backend and appends the stored version locally.
    pub async fn create<D: Draft>(&mut self, draft: &D) -> ApiResult<D::Entity> {
        draft.validate()?;
        let result = self.api.create_item(draft).await;
        let saved = self.check(result)?;
        self.add_item(saved.clone());
        Ok(saved)
    }

    /// Updates an entity on the backend and replaces the local copy.
    pub async fn update<D: Draft>(&mut self, id: &EntityId, draft: &D) -> ApiResult<D::Entity> {
        draft.validate()?;
        let result = self.api.update_item(id, draft).await;
        let saved = self.check(result)?;
        self.update_item(saved.clone());
        Ok(saved)
    }

    /// Deletes an entity on the backend, then locally.
    pub async fn remove<E: Entity>(&mut self, id: &EntityId) -> ApiResult<()> {
        let result = self.api.delete_item(E::COLLECTION, id).await;
        self.check(result)?;
        self.delete_item::<E>(id);
        Ok(())
    }

    pub async fn save_profile(&mut self, update: &ProfileUpdate) -> ApiResult<Profile> {
        update.validate()?;
        let result = self.api.update_profile(update).await;
        let saved = self.check(result)?;
        self.update_profile(saved.clone());
        Ok(saved)
    }

    /// Dashboard over the current snapshot, as of now.
    pub fn dashboard(&self, period: &str) -> DashboardResult {
        match self.state.as_ref() {
            Some(state) => build_dashboard(period, state, self.locale),
            None => build_dashboard(period, &StateSnapshot::default(), self.locale),
        }
    }

    fn check<T>(&mut self, result: ApiResult<T>) -> ApiResult<T> {
        if matches!(&result, Err(err) if err.is_auth_expired()) {
            warn!("session expired, clearing local state");
            self.clear();
        }
        result
    }

    fn commit(&mut self) {
        if !self.persist {
            return;
        }
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if let Err(err) = self.cache.save(state) {
            warn!("state cache write failed, continuing in memory only: {err:#}");
            self.persist = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoCache};
    use crate::error::{ApiError, ValidationError};
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeApi {
        data: TrackingData,
        fail_status: Option<u16>,
        calls: AtomicUsize,
        next_id: AtomicI64,
    }

    impl FakeApi {
        fn with_data(data: TrackingData) -> Self {
            Self {
                data,
                next_id: AtomicI64::new(100),
                ..Default::default()
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome(&self) -> ApiResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_status {
                Some(401) => Err(ApiError::AuthenticationExpired),
                Some(status) => Err(ApiError::Api {
                    status,
                    message: "Internal Server Error".into(),
                }),
                None => Ok(()),
            }
        }

        // Echoes the draft back the way the backend stores it.
        fn stored<D: Draft>(&self, id: EntityId, draft: &D) -> ApiResult<D::Entity> {
            let mut value = serde_json::to_value(draft)?;
            if let Value::Object(map) = &mut value {
                map.insert("id".into(), json!(id));
                map.insert("calories".into(), json!(250.0));
            }
            Ok(serde_json::from_value(value)?)
        }
    }

    impl DataApi for FakeApi {
        async fn fetch_tracking_data(&self) -> ApiResult<TrackingData> {
            self.outcome()?;
            Ok(self.data.clone())
        }

        async fn create_item<D: Draft>(&self, draft: &D) -> ApiResult<D::Entity> {
            self.outcome()?;
            let id = EntityId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.stored(id, draft)
        }

        async fn update_item<D: Draft>(&self, id: &EntityId, draft: &D) -> ApiResult<D::Entity> {
            self.outcome()?;
            self.stored(id.clone(), draft)
        }

        async fn delete_item(&self, _collection: Collection, _id: &EntityId) -> ApiResult<()> {
            self.outcome()
        }

        async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<Profile> {
            self.outcome()?;
            Ok(serde_json::from_value(serde_json::to_value(update)?)?)
        }
    }

    /// Cache whose writes always fail.
    #[derive(Clone, Default)]
    struct BrokenCache {
        saves: Arc<AtomicUsize>,
    }

    impl SnapshotCache for BrokenCache {
        fn load(&self) -> anyhow::Result<Option<StateSnapshot>> {
            Ok(None)
        }

        fn save(&self, _snapshot: &StateSnapshot) -> anyhow::Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("quota exceeded"))
        }

        fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn food(id: i64, name: &str) -> FoodItem {
        FoodItem {
            id: EntityId::from(id),
            name: name.into(),
            calories_per_100g: 100.0,
        }
    }

    fn tracking_data() -> TrackingData {
        TrackingData {
            foods: vec![food(1, "Rice"), food(2, "Beans"), food(3, "Tofu")],
            exercise_types: vec![ExerciseType {
                id: EntityId::from(1),
                name: "Walking".into(),
                calories_per_hour: 280.0,
            }],
            user_profile: Some(Profile {
                age: Some(40),
                balance_goal_kcal: Some(-300),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn ready_store() -> StateStore<FakeApi, MemoryCache> {
        let mut store = StateStore::new(FakeApi::with_data(tracking_data()), MemoryCache::new());
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn initialize_fetches_once_then_restores_from_cache() {
        let cache = MemoryCache::new();
        let mut store = StateStore::new(FakeApi::with_data(tracking_data()), cache.clone());
        let snapshot = store.initialize().await.unwrap();
        assert_eq!(snapshot.foods.len(), 3);
        assert_eq!(store.api().calls(), 1);
        assert!(cache.raw().is_some());

        let mut reloaded = StateStore::new(FakeApi::failing(500), cache);
        let restored = reloaded.initialize().await.unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(reloaded.api().calls(), 0);
    }

    #[tokio::test]
    async fn unreadable_cache_falls_back_to_fetch() {
        let cache = MemoryCache::new();
        cache.put_raw("][").unwrap();
        let mut store = StateStore::new(FakeApi::with_data(tracking_data()), cache);
        assert_eq!(store.initialize().await.unwrap().foods.len(), 3);
        assert_eq!(store.api().calls(), 1);
    }

    #[tokio::test]
    async fn expired_session_clears_state_and_cache() {
        let cache = MemoryCache::new();
        let mut store = StateStore::new(FakeApi::failing(401), cache.clone());
        let err = store.initialize().await.unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.is_initialized());
        assert!(cache.raw().is_none());
    }

    #[tokio::test]
    async fn negative_age_still_hydrates_with_zero_bmr() {
        let data: TrackingData = serde_json::from_value(json!({
            "foods": [],
            "user_profile": {
                "gender": "male",
                "age": -3,
                "height_cm": 170.0,
                "weight_kg": 55.0
            }
        }))
        .unwrap();
        let mut store = StateStore::new(FakeApi::with_data(data), NoCache);
        let snapshot = store.initialize().await.unwrap();
        assert_eq!(snapshot.user_profile.age, Some(-3));

        let result = store.dashboard("day");
        assert_eq!(result.calories_out_bmr, vec![0]);
        assert_eq!(result.total_out_bmr, 0);
    }

    #[tokio::test]
    async fn general_failures_propagate() {
        let mut store = StateStore::new(FakeApi::failing(503), NoCache);
        match store.initialize().await {
            Err(ApiError::Api { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(store.snapshot().is_none());
    }

    #[tokio::test]
    async fn snapshot_is_an_independent_copy() {
        let store = ready_store().await;
        let mut first = store.snapshot().unwrap();
        let second = store.snapshot().unwrap();
        assert_eq!(first, second);

        first.foods.clear();
        first.user_profile.age = None;
        assert_eq!(store.collection::<FoodItem>().len(), 3);
        assert_eq!(store.profile().age, Some(40));
    }

    #[tokio::test]
    async fn uninitialized_store_reads_empty_and_ignores_writes() {
        let mut store = StateStore::new(FakeApi::default(), MemoryCache::new());
        store.add_item(food(9, "Kale"));
        store.update_profile(Profile {
            age: Some(20),
            ..Default::default()
        });
        assert!(store.snapshot().is_none());
        assert!(store.collection::<FoodItem>().is_empty());
        assert_eq!(store.collection_len(Collection::ActivityLogs), 0);
        assert_eq!(store.profile(), &Profile::default());
    }

    #[tokio::test]
    async fn delete_matches_ids_across_representations() {
        let mut store = ready_store().await;
        store.delete_item::<FoodItem>(&EntityId::from(42));
        assert_eq!(store.collection::<FoodItem>().len(), 3);

        store.delete_item::<FoodItem>(&EntityId::from("2"));
        let names: Vec<&str> = store
            .collection::<FoodItem>()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["Rice", "Tofu"]);
    }

    #[tokio::test]
    async fn update_replaces_only_the_matching_entry() {
        let mut store = ready_store().await;
        let before = store.collection::<FoodItem>().to_vec();

        store.update_item(FoodItem {
            id: EntityId::from(2),
            name: "Black beans".into(),
            calories_per_100g: 132.0,
        });
        store.update_item(food(77, "Ghost"));

        let after = store.collection::<FoodItem>();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].name, "Black beans");
        assert_eq!(after[2], before[2]);
    }

    #[tokio::test]
    async fn mutations_are_committed_to_the_cache() {
        let cache = MemoryCache::new();
        let mut store = StateStore::new(FakeApi::with_data(tracking_data()), cache.clone());
        store.initialize().await.unwrap();
        store.add_item(food(4, "Lentils"));
        store.update_profile(Profile {
            balance_goal_kcal: Some(250),
            ..Default::default()
        });

        let cached = cache.load().unwrap().unwrap();
        assert_eq!(cached.foods.len(), 4);
        assert_eq!(cached.user_profile.balance_goal_kcal, Some(250));
    }

    #[tokio::test]
    async fn failed_commit_degrades_to_memory_only() {
        let cache = BrokenCache::default();
        let mut store = StateStore::new(FakeApi::with_data(tracking_data()), cache.clone());
        store.initialize().await.unwrap();
        store.add_item(food(4, "Lentils"));
        store.delete_item::<FoodItem>(&EntityId::from(1));

        assert_eq!(cache.saves.load(Ordering::SeqCst), 1);
        let names: Vec<&str> = store
            .collection::<FoodItem>()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["Beans", "Tofu", "Lentils"]);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let mut store = ready_store().await;
        store.clear();
        store.clear();
        assert!(!store.is_initialized());
        assert!(store.collection::<FoodItem>().is_empty());
    }

    #[tokio::test]
    async fn create_validates_before_calling_the_backend() {
        let mut store = ready_store().await;
        let err = store
            .create(&FoodDraft {
                name: String::new(),
                calories_per_100g: Some(50.0),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::MissingField("name"))
        ));
        assert_eq!(store.api().calls(), 1);
        assert_eq!(store.collection::<FoodItem>().len(), 3);
    }

    #[tokio::test]
    async fn write_flows_merge_confirmed_results() {
        let mut store = ready_store().await;
        let logged_at = NaiveDate::from_ymd_opt(2026, 10, 21)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        let entry = store
            .create(&ConsumptionLogDraft {
                log_date: Some(logged_at),
                food_id: Some(EntityId::from(1)),
                amount_g: Some(200.0),
            })
            .await
            .unwrap();
        assert_eq!(entry.id, EntityId::from(100));
        assert_eq!(store.collection::<ConsumptionLogEntry>(), &[entry.clone()]);

        let updated = store
            .update(
                &entry.id,
                &ConsumptionLogDraft {
                    log_date: Some(logged_at),
                    food_id: Some(EntityId::from(1)),
                    amount_g: Some(300.0),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.collection::<ConsumptionLogEntry>()[0].amount_g, 300.0);
        assert_eq!(updated.id, entry.id);

        store.remove::<ConsumptionLogEntry>(&entry.id).await.unwrap();
        assert!(store.collection::<ConsumptionLogEntry>().is_empty());

        let profile = store
            .save_profile(&ProfileUpdate {
                gender: Some(Gender::Female),
                age: Some(30),
                height_cm: Some(170.0),
                weight_kg: Some(65.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.profile(), &profile);
        assert_eq!(store.dashboard("day").calories_out_bmr, vec![1444]);
    }

    #[tokio::test]
    async fn expired_session_during_write_logs_out() {
        let mut store = ready_store().await;
        store.api.fail_status = Some(401);
        let err = store
            .remove::<FoodItem>(&EntityId::from(1))
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.is_initialized());
    }
}
