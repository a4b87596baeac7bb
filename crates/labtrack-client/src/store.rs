//! Client sync store
//!
//! [`SyncStore`] mirrors the four collections held by the record store
//! service. It derives `status` before writes, keeps the cache fresh by
//! polling while anything is subscribed, and rebuilds the calendar
//! projection whenever tasks, metal tests or work closures are refreshed.
//!
//! One poller serves every collection. It starts with the first
//! subscription (to any collection) and stops when the last one is dropped.
//! Each tick refreshes the collections that currently have subscribers;
//! ticks may overlap, and whichever response arrives last wins.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use labtrack_core::record::to_payload;
use labtrack_core::status::{prepare_create, prepare_update};
use labtrack_core::{
    calendar, CalendarEvent, DocumentTracking, DocumentTrackingUpdate, MetalTracking,
    MetalTrackingUpdate, NewDocumentTracking, NewMetalTracking, NewTask, NewWorkClosure,
    RecordKind, SyncConfig, Task, TaskUpdate, TrackedRecord, WorkClosure, WorkClosureUpdate,
};

use crate::api::RecordApi;
use crate::error::SyncError;
use crate::http::HttpApi;

type Listener<R> = Arc<dyn Fn(&[R]) + Send + Sync>;

struct Collection<R> {
    records: Vec<R>,
    /// Bumped on every store, so a late delivery can tell it was superseded
    generation: u64,
    listeners: Vec<(u64, Listener<R>)>,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            generation: 0,
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Cache {
    tasks: Collection<Task>,
    metal_tracking: Collection<MetalTracking>,
    work_closures: Collection<WorkClosure>,
    document_tracking: Collection<DocumentTracking>,
    calendar: Vec<CalendarEvent>,
    next_listener: u64,
}

impl Cache {
    fn listener_count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Tasks => self.tasks.listeners.len(),
            RecordKind::MetalTracking => self.metal_tracking.listeners.len(),
            RecordKind::WorkClosures => self.work_closures.listeners.len(),
            RecordKind::DocumentTracking => self.document_tracking.listeners.len(),
        }
    }

    fn total_listeners(&self) -> usize {
        RecordKind::ALL
            .iter()
            .map(|kind| self.listener_count(*kind))
            .sum()
    }

    fn rebuild_calendar(&mut self) {
        self.calendar = calendar::build(
            &self.tasks.records,
            &self.metal_tracking.records,
            &self.work_closures.records,
        );
    }
}

/// A record type with a slot in the cache
trait Cached: TrackedRecord {
    fn slot(cache: &Cache) -> &Collection<Self>;
    fn slot_mut(cache: &mut Cache) -> &mut Collection<Self>;
}

macro_rules! cached {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn slot(cache: &Cache) -> &Collection<Self> {
                &cache.$field
            }
            fn slot_mut(cache: &mut Cache) -> &mut Collection<Self> {
                &mut cache.$field
            }
        }
    };
}

cached!(Task, tasks);
cached!(MetalTracking, metal_tracking);
cached!(WorkClosure, work_closures);
cached!(DocumentTracking, document_tracking);

/// Handle returned by the `subscribe_to_*` methods
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) removes the
/// callback. Removing the last callback across all collections stops polling.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Inner<A> {
    api: A,
    config: SyncConfig,
    cache: Mutex<Cache>,
    /// Per-collection delivery locks, indexed by `RecordKind::index`
    delivery: [Mutex<()>; 4],
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_starts: AtomicUsize,
    connected: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A: RecordApi> Inner<A> {
    fn cache(&self) -> MutexGuard<'_, Cache> {
        lock(&self.cache)
    }

    /// Start the shared poller unless it is already running
    fn ensure_polling(self: &Arc<Self>) {
        let mut poller = lock(&self.poller);
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let period = self.config.poll_interval();
        *poller = Some(tokio::spawn(poll_loop(Arc::downgrade(self), period)));
        let starts = self.poll_starts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Started polling every {:?} (start #{})", period, starts);
    }

    fn remove_listener<R: Cached>(&self, id: u64) {
        // Poller lock first so a concurrent subscribe cannot miss the restart
        let mut poller = lock(&self.poller);
        let remaining = {
            let mut cache = self.cache();
            R::slot_mut(&mut cache)
                .listeners
                .retain(|(listener_id, _)| *listener_id != id);
            cache.total_listeners()
        };
        if remaining == 0 {
            if let Some(handle) = poller.take() {
                handle.abort();
                tracing::debug!("Stopped polling, no subscribers left");
            }
        }
    }

    /// List a collection; a failure reads as an empty collection
    async fn fetch<R: Cached>(&self) -> Vec<R> {
        match self.api.list(R::KIND).await {
            Ok(values) => {
                self.connected.store(true, Ordering::SeqCst);
                decode_all(R::KIND, values)
            }
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                tracing::warn!("Failed to fetch {}: {}", R::KIND, err);
                Vec::new()
            }
        }
    }

    /// Replace a cached collection, returning its new generation
    fn store_records<R: Cached>(&self, records: Vec<R>) -> u64 {
        let mut cache = self.cache();
        let slot = R::slot_mut(&mut cache);
        slot.records = records;
        slot.generation += 1;
        let generation = slot.generation;
        if R::KIND.on_calendar() {
            cache.rebuild_calendar();
        }
        generation
    }

    /// Notify subscribers of the records stored as `generation`
    ///
    /// Deliveries for one collection run one at a time, and a generation
    /// that has already been replaced is dropped, so the last delivery a
    /// subscriber sees always matches the cache.
    fn deliver<R: Cached>(&self, generation: u64) {
        let _delivery = lock(&self.delivery[R::KIND.index()]);
        let (records, listeners) = {
            let cache = self.cache();
            let slot = R::slot(&cache);
            if slot.generation != generation {
                return;
            }
            let listeners: Vec<Listener<R>> = slot
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (slot.records.clone(), listeners)
        };
        for listener in listeners {
            listener(&records);
        }
    }

    /// Hand the current cached collection to one new subscriber
    fn deliver_to<R: Cached>(&self, listener: &Listener<R>) {
        let _delivery = lock(&self.delivery[R::KIND.index()]);
        let records = R::slot(&self.cache()).records.clone();
        listener(&records);
    }

    async fn refresh_collection<R: Cached>(&self) {
        let records = self.fetch::<R>().await;
        let generation = self.store_records(records);
        self.deliver::<R>(generation);
    }

    async fn refresh(&self, kind: RecordKind) {
        match kind {
            RecordKind::Tasks => self.refresh_collection::<Task>().await,
            RecordKind::MetalTracking => self.refresh_collection::<MetalTracking>().await,
            RecordKind::WorkClosures => self.refresh_collection::<WorkClosure>().await,
            RecordKind::DocumentTracking => {
                self.refresh_collection::<DocumentTracking>().await
            }
        }
    }

    /// One tick: refresh every collection that has subscribers, in order
    async fn poll_once(&self) {
        let kinds: Vec<RecordKind> = {
            let cache = self.cache();
            RecordKind::ALL
                .into_iter()
                .filter(|kind| cache.listener_count(*kind) > 0)
                .collect()
        };
        for kind in kinds {
            self.refresh(kind).await;
        }
    }
}

async fn poll_loop<A: RecordApi>(inner: Weak<Inner<A>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; subscribers fetch on their own
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        // Not awaited: a slow tick must not hold back the next one
        tokio::spawn(async move { inner.poll_once().await });
    }
}

fn decode_all<R: Cached>(kind: RecordKind, values: Vec<Value>) -> Vec<R> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<R>(value) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("Skipping malformed {} record: {}", kind, err);
                None
            }
        })
        .collect()
}

/// Cached mirror of the record store service
pub struct SyncStore<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for SyncStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SyncStore<HttpApi> {
    /// Sync store talking to the service at `config.base_url`
    pub fn connect(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let api = HttpApi::new(&config)?;
        Self::new(api, config)
    }
}

impl<A: RecordApi> SyncStore<A> {
    /// Build a store over `api`; fails if `config` does not validate
    pub fn new(api: A, config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                api,
                config,
                cache: Mutex::new(Cache::default()),
                delivery: Default::default(),
                poller: Mutex::new(None),
                poll_starts: AtomicUsize::new(0),
                connected: AtomicBool::new(false),
            }),
        })
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ==================== Reads ====================

    pub fn tasks(&self) -> Vec<Task> {
        self.records::<Task>()
    }

    pub fn metal_tracking(&self) -> Vec<MetalTracking> {
        self.records::<MetalTracking>()
    }

    pub fn work_closures(&self) -> Vec<WorkClosure> {
        self.records::<WorkClosure>()
    }

    pub fn document_tracking(&self) -> Vec<DocumentTracking> {
        self.records::<DocumentTracking>()
    }

    /// Calendar events as of the last refresh of a calendar collection
    pub fn calendar_events(&self) -> Vec<CalendarEvent> {
        self.inner.cache().calendar.clone()
    }

    /// Whether the last fetch reached the service
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// How many times the poller has been started
    pub fn poll_starts(&self) -> usize {
        self.inner.poll_starts.load(Ordering::SeqCst)
    }

    /// Fetch one collection now and notify its subscribers
    pub async fn refresh(&self, kind: RecordKind) {
        self.inner.refresh(kind).await;
    }

    fn records<R: Cached>(&self) -> Vec<R> {
        R::slot(&self.inner.cache()).records.clone()
    }

    // ==================== Tasks ====================

    pub async fn add_task(&self, task: NewTask) -> Result<Task, SyncError> {
        self.add::<Task>(&task).await
    }

    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task, SyncError> {
        self.update::<Task>(id, &update).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Task>(id).await
    }

    pub async fn subscribe_to_tasks<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Task]) + Send + Sync + 'static,
    {
        self.subscribe(callback).await
    }

    // ==================== Metal tracking ====================

    pub async fn add_metal_tracking(
        &self,
        metal: NewMetalTracking,
    ) -> Result<MetalTracking, SyncError> {
        self.add::<MetalTracking>(&metal).await
    }

    pub async fn update_metal_tracking(
        &self,
        id: &str,
        update: MetalTrackingUpdate,
    ) -> Result<MetalTracking, SyncError> {
        self.update::<MetalTracking>(id, &update).await
    }

    pub async fn delete_metal_tracking(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<MetalTracking>(id).await
    }

    pub async fn subscribe_to_metal_tracking<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[MetalTracking]) + Send + Sync + 'static,
    {
        self.subscribe(callback).await
    }

    // ==================== Work closures ====================

    pub async fn add_work_closure(&self, work: NewWorkClosure) -> Result<WorkClosure, SyncError> {
        self.add::<WorkClosure>(&work).await
    }

    pub async fn update_work_closure(
        &self,
        id: &str,
        update: WorkClosureUpdate,
    ) -> Result<WorkClosure, SyncError> {
        self.update::<WorkClosure>(id, &update).await
    }

    pub async fn delete_work_closure(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<WorkClosure>(id).await
    }

    pub async fn subscribe_to_work_closures<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[WorkClosure]) + Send + Sync + 'static,
    {
        self.subscribe(callback).await
    }

    // ==================== Document tracking ====================

    pub async fn add_document_tracking(
        &self,
        document: NewDocumentTracking,
    ) -> Result<DocumentTracking, SyncError> {
        self.add::<DocumentTracking>(&document).await
    }

    /// Update a tracked document
    ///
    /// A status change is checked against the cached record, if there is one.
    pub async fn update_document_tracking(
        &self,
        id: &str,
        update: DocumentTrackingUpdate,
    ) -> Result<DocumentTracking, SyncError> {
        if let Some(target) = update.status {
            let current = self
                .inner
                .cache()
                .document_tracking
                .records
                .iter()
                .find(|document| document.id == id)
                .map(|document| document.status);
            if let Some(current) = current.filter(|current| !current.can_transition_to(&target)) {
                let err = SyncError::InvalidTransition {
                    from: current,
                    to: target,
                };
                tracing::error!("Failed to update {} {}: {}", RecordKind::DocumentTracking, id, err);
                return Err(err);
            }
        }
        self.update::<DocumentTracking>(id, &update).await
    }

    pub async fn delete_document_tracking(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<DocumentTracking>(id).await
    }

    pub async fn subscribe_to_document_tracking<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[DocumentTracking]) + Send + Sync + 'static,
    {
        self.subscribe(callback).await
    }

    // ==================== Generic plumbing ====================

    async fn add<R: Cached>(&self, draft: &R::Draft) -> Result<R, SyncError> {
        let result = async {
            let mut payload = to_payload(draft)?;
            prepare_create(R::KIND, &mut payload, Utc::now())?;
            let created = self.inner.api.create(R::KIND, payload).await?;
            Ok::<R, SyncError>(serde_json::from_value(created)?)
        }
        .await;
        self.finish_write(R::KIND, "add", result).await
    }

    async fn update<R: Cached>(&self, id: &str, update: &R::Update) -> Result<R, SyncError> {
        let result = async {
            let mut payload = to_payload(update)?;
            prepare_update(R::KIND, &mut payload, Utc::now())?;
            let updated = self.inner.api.update(R::KIND, id, payload).await?;
            Ok::<R, SyncError>(serde_json::from_value(updated)?)
        }
        .await;
        self.finish_write(R::KIND, "update", result).await
    }

    async fn delete<R: Cached>(&self, id: &str) -> Result<(), SyncError> {
        let result = self.inner.api.delete(R::KIND, id).await;
        self.finish_write(R::KIND, "delete", result).await
    }

    /// Log a failed write, or refresh after a successful one when configured
    async fn finish_write<T>(
        &self,
        kind: RecordKind,
        action: &str,
        result: Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        match result {
            Err(err) => {
                tracing::error!("Failed to {} {}: {}", action, kind, err);
                Err(err)
            }
            Ok(value) => {
                if self.inner.config.refresh_on_write {
                    self.inner.refresh(kind).await;
                }
                Ok(value)
            }
        }
    }

    async fn subscribe<R, F>(&self, callback: F) -> Subscription
    where
        R: Cached,
        F: Fn(&[R]) + Send + Sync + 'static,
    {
        let listener: Listener<R> = Arc::new(callback);
        let id = {
            let mut cache = self.inner.cache();
            let id = cache.next_listener;
            cache.next_listener += 1;
            R::slot_mut(&mut cache)
                .listeners
                .push((id, Arc::clone(&listener)));
            id
        };

        // Built before the first await so a cancelled subscribe cleans up
        let weak = Arc::downgrade(&self.inner);
        let subscription = Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove_listener::<R>(id);
                }
            })),
        };

        self.inner.ensure_polling();

        let records = self.inner.fetch::<R>().await;
        self.inner.store_records(records);
        self.inner.deliver_to(&listener);

        subscription
    }
}

impl<A> std::fmt::Debug for SyncStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = lock(&self.inner.cache);
        f.debug_struct("SyncStore")
            .field("base_url", &self.inner.config.base_url)
            .field("tasks", &cache.tasks.records.len())
            .field("metal_tracking", &cache.metal_tracking.records.len())
            .field("work_closures", &cache.work_closures.records.len())
            .field("document_tracking", &cache.document_tracking.records.len())
            .field("calendar", &cache.calendar.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LocalApi;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use labtrack_core::{DocumentStatus, Priority, Status, TestType};
    use serde_json::Map;

    fn fast_config() -> SyncConfig {
        SyncConfig {
            poll_interval_ms: 20,
            ..SyncConfig::default()
        }
    }

    fn refreshing_config() -> SyncConfig {
        SyncConfig {
            refresh_on_write: true,
            ..fast_config()
        }
    }

    fn past() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    fn future() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(30)
    }

    fn new_task(title: &str, due: DateTime<Utc>) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            priority: Priority::Low,
            assignee_id: "1".to_string(),
            created_by: "1".to_string(),
            due_date: due,
        }
    }

    fn new_metal(due: DateTime<Utc>) -> NewMetalTracking {
        NewMetalTracking {
            factory: "North".to_string(),
            diameter: "530".to_string(),
            thickness: "10".to_string(),
            melt: "M-1".to_string(),
            test_type: TestType::DpTension,
            samples_count: 3,
            test_end_date: due,
        }
    }

    fn new_work(due: DateTime<Utc>) -> NewWorkClosure {
        NewWorkClosure {
            factory: "South".to_string(),
            diameter: "720".to_string(),
            thickness: "12".to_string(),
            melt: "M-2".to_string(),
            start_date: past(),
            end_date: due,
        }
    }

    fn new_document() -> NewDocumentTracking {
        NewDocumentTracking {
            factory: "West".to_string(),
            diameter: "1020".to_string(),
            thickness: "14".to_string(),
            melt: "M-3".to_string(),
        }
    }

    /// Local API that fails every call while `failing` is set
    #[derive(Clone, Default)]
    struct FlakyApi {
        local: LocalApi,
        failing: Arc<AtomicBool>,
        creates: Arc<AtomicUsize>,
    }

    impl FlakyApi {
        fn check(&self) -> Result<(), SyncError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(SyncError::Network("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl RecordApi for FlakyApi {
        async fn list(&self, kind: RecordKind) -> Result<Vec<Value>, SyncError> {
            self.check()?;
            self.local.list(kind).await
        }

        async fn create(
            &self,
            kind: RecordKind,
            payload: Map<String, Value>,
        ) -> Result<Value, SyncError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.local.create(kind, payload).await
        }

        async fn update(
            &self,
            kind: RecordKind,
            id: &str,
            payload: Map<String, Value>,
        ) -> Result<Value, SyncError> {
            self.check()?;
            self.local.update(kind, id, payload).await
        }

        async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), SyncError> {
            self.check()?;
            self.local.delete(kind, id).await
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_poller_shared_across_collections() {
        let store = SyncStore::new(LocalApi::default(), fast_config()).unwrap();
        assert!(!store.is_polling());
        assert_eq!(store.poll_starts(), 0);

        let a = store.subscribe_to_tasks(|_| {}).await;
        let b = store.subscribe_to_metal_tracking(|_| {}).await;
        let c = store.subscribe_to_tasks(|_| {}).await;
        assert!(store.is_polling());
        assert_eq!(store.poll_starts(), 1);

        a.unsubscribe();
        b.unsubscribe();
        assert!(store.is_polling());

        c.unsubscribe();
        assert!(!store.is_polling());

        let d = store.subscribe_to_document_tracking(|_| {}).await;
        assert!(store.is_polling());
        assert_eq!(store.poll_starts(), 2);

        drop(d);
        assert!(!store.is_polling());
        assert_eq!(store.poll_starts(), 2);
    }

    #[tokio::test]
    async fn test_subscriber_sees_initial_and_polled_collections() {
        let store = SyncStore::new(LocalApi::default(), fast_config()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::<usize>::new()));

        let sink = Arc::clone(&seen);
        let _subscription = store
            .subscribe_to_tasks(move |tasks| sink.lock().unwrap().push(tasks.len()))
            .await;
        assert_eq!(seen.lock().unwrap().first(), Some(&0));

        store.add_task(new_task("Calibrate", future())).await.unwrap();
        assert!(eventually(|| seen.lock().unwrap().last() == Some(&1)).await);
        assert_eq!(store.tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_initial_fetch_yields_empty_collection() {
        let api = FlakyApi::default();
        api.local
            .store()
            .write()
            .await
            .create(RecordKind::DocumentTracking, serde_json::json!({ "factory": "West" }))
            .unwrap();
        api.failing.store(true, Ordering::SeqCst);

        let store = SyncStore::new(api.clone(), SyncConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _subscription = store
            .subscribe_to_document_tracking(move |docs| *sink.lock().unwrap() = Some(docs.len()))
            .await;
        assert_eq!(*seen.lock().unwrap(), Some(0));
        assert!(!store.is_connected());

        api.failing.store(false, Ordering::SeqCst);
        store.refresh(RecordKind::DocumentTracking).await;
        assert!(store.is_connected());
        assert_eq!(*seen.lock().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_calendar_rebuilt_without_documents() {
        let store = SyncStore::new(LocalApi::default(), refreshing_config()).unwrap();
        let task = store.add_task(new_task("Report", future())).await.unwrap();
        let metal = store.add_metal_tracking(new_metal(past())).await.unwrap();
        let work = store.add_work_closure(new_work(future())).await.unwrap();
        let document = store.add_document_tracking(new_document()).await.unwrap();

        let events = store.calendar_events();
        assert_eq!(events.len(), 3);
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&format!("task-{}", task.id).as_str()));
        assert!(ids.contains(&format!("metal-{}", metal.id).as_str()));
        assert!(ids.contains(&format!("work-{}", work.id).as_str()));
        assert!(events.iter().all(|e| e.source_id != document.id));

        let metal_event = events.iter().find(|e| e.source_id == metal.id).unwrap();
        assert_eq!(metal_event.date, metal.test_end_date);
        assert_eq!(metal_event.status, Status::Overdue);

        store.delete_task(&task.id).await.unwrap();
        assert_eq!(store.calendar_events().len(), 2);
    }

    #[tokio::test]
    async fn test_status_derived_before_write() {
        let store = SyncStore::new(LocalApi::default(), SyncConfig::default()).unwrap();
        let late = store.add_task(new_task("Late", past())).await.unwrap();
        assert_eq!(late.status, Status::Overdue);
        let fresh = store.add_task(new_task("Fresh", future())).await.unwrap();
        assert_eq!(fresh.status, Status::Working);

        let done = store
            .update_task(
                &late.id,
                TaskUpdate {
                    status: Some(Status::Completed),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, Status::Completed);

        let renamed = store
            .update_task(
                &late.id,
                TaskUpdate {
                    title: Some("Late, renamed".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.status, Status::Completed);

        let rescheduled = store
            .update_task(
                &late.id,
                TaskUpdate {
                    due_date: Some(future()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rescheduled.status, Status::Working);
    }

    #[tokio::test]
    async fn test_document_starts_working_and_rejects_reopen() {
        let store = SyncStore::new(LocalApi::default(), refreshing_config()).unwrap();
        let document = store.add_document_tracking(new_document()).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Working);

        let completed = store
            .update_document_tracking(
                &document.id,
                DocumentTrackingUpdate {
                    status: Some(DocumentStatus::Completed),
                    ..DocumentTrackingUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.status, DocumentStatus::Completed);

        let err = store
            .update_document_tracking(
                &document.id,
                DocumentTrackingUpdate {
                    status: Some(DocumentStatus::Signing),
                    ..DocumentTrackingUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: DocumentStatus::Completed,
                to: DocumentStatus::Signing
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_retried() {
        let api = FlakyApi::default();
        api.failing.store(true, Ordering::SeqCst);
        let store = SyncStore::new(api.clone(), refreshing_config()).unwrap();

        let err = store.add_task(new_task("Lost", future())).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);
        assert!(store.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = SyncStore::new(LocalApi::default(), SyncConfig::default()).unwrap();
        let err = store.delete_work_closure("ghost").await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 404, .. }));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SyncConfig {
            poll_interval_ms: 0,
            ..SyncConfig::default()
        };
        let err = SyncStore::new(LocalApi::default(), config.clone()).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Config(labtrack_core::ConfigError::OutOfRange(_))
        ));
        assert!(matches!(
            SyncStore::connect(config),
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_date_change_overrides_completion() {
        let store = SyncStore::new(LocalApi::default(), SyncConfig::default()).unwrap();
        let task = store.add_task(new_task("Report", future())).await.unwrap();

        let updated = store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(Status::Completed),
                    due_date: Some(past()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, Status::Overdue);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_refreshes_end_on_latest() {
        let store = SyncStore::new(LocalApi::default(), SyncConfig::default()).unwrap();
        let history = Arc::new(Mutex::new(Vec::<usize>::new()));
        let slow = Arc::new(AtomicBool::new(false));
        let entered = Arc::new(AtomicBool::new(false));

        let _subscription = store
            .subscribe_to_tasks({
                let (history, slow, entered) =
                    (Arc::clone(&history), Arc::clone(&slow), Arc::clone(&entered));
                move |tasks| {
                    if slow.load(Ordering::SeqCst) && tasks.is_empty() {
                        entered.store(true, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(200));
                    }
                    history.lock().unwrap().push(tasks.len());
                }
            })
            .await;
        slow.store(true, Ordering::SeqCst);

        // First refresh reads the empty collection and stalls in the callback
        let stale = tokio::spawn({
            let store = store.clone();
            async move { store.refresh(RecordKind::Tasks).await }
        });
        assert!(eventually(|| entered.load(Ordering::SeqCst)).await);

        store.add_task(new_task("Late", future())).await.unwrap();
        store.refresh(RecordKind::Tasks).await;
        stale.await.unwrap();

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(history.lock().unwrap().last(), Some(&1));
    }
}
