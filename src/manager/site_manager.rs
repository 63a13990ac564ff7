use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::{ChanError, Result};
use crate::domain::{ChanSiteData, DescriptorInterner, SiteDescriptor, SiteUserSettings};
use crate::fetcher::Fetcher;
use crate::site::{Site, SiteKind};
use crate::store::Store;
use crate::sync::{Debouncer, LatestSignal, RendezvousExecutor, SuspendableInitializer};

const TAG: &str = "SiteManager";

#[derive(Default)]
struct SitesState {
    site_data: HashMap<SiteDescriptor, ChanSiteData>,
    sites: HashMap<SiteDescriptor, Arc<Site>>,
    orders: Vec<SiteDescriptor>,
}

impl SitesState {
    fn check_consistency(&self) -> Result<()> {
        let (data, sites, orders) = (self.site_data.len(), self.sites.len(), self.orders.len());
        if data != sites || sites != orders {
            return Err(ChanError::Consistency(format!(
                "site data ({}), sites ({}) and orders ({}) differ in size",
                data, sites, orders
            )));
        }
        Ok(())
    }

    fn records_ordered(&self) -> Vec<ChanSiteData> {
        self.orders
            .iter()
            .filter_map(|descriptor| self.site_data.get(descriptor).cloned())
            .collect()
    }

    fn is_active(&self, descriptor: &SiteDescriptor) -> bool {
        let active = self.site_data.get(descriptor).map_or(false, |data| data.active);
        let enabled = self.sites.get(descriptor).map_or(false, |site| site.enabled());
        active && enabled
    }
}

/// Registry of all known sites, their user-controlled order and activation.
pub struct SiteManager {
    interner: Arc<DescriptorInterner>,
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    state: RwLock<SitesState>,
    initializer: SuspendableInitializer<()>,
    persist_debouncer: Debouncer,
    persist_debounce: Duration,
    changes_executor: RendezvousExecutor,
    changes: LatestSignal,
}

impl SiteManager {
    /// Must be called from within a tokio runtime.
    pub fn new(
        interner: Arc<DescriptorInterner>,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        persist_debounce: Duration,
    ) -> Self {
        Self {
            interner,
            store,
            fetcher,
            state: RwLock::new(SitesState::default()),
            initializer: SuspendableInitializer::new(TAG),
            persist_debouncer: Debouncer::new(),
            persist_debounce,
            changes_executor: RendezvousExecutor::new("sites-changed"),
            changes: LatestSignal::new(),
        }
    }

    /// Starts loading sites in the background. Completion is observed through
    /// [`SiteManager::await_until_initialized`].
    pub fn load(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let result = this.load_sites();
            match &result {
                Ok(count) => info!("Loaded {} sites", count),
                Err(e) => error!("Failed to load sites: {}", e),
            }
            this.initializer.init_with_result(result.map(|_| ()));
        })
    }

    fn load_sites(&self) -> Result<usize> {
        let descriptors: Vec<SiteDescriptor> = SiteKind::ALL
            .iter()
            .map(|kind| self.interner.get_or_create(kind.site_name()))
            .collect();

        let mut records = self.store.initialize_sites(&descriptors)?;
        records.sort_by_key(|record| record.order);

        let mut state = SitesState::default();
        for (position, mut record) in records.into_iter().enumerate() {
            let Some(kind) = SiteKind::by_name(record.site.site_name()) else {
                warn!("No implementation for stored site {}", record.site);
                continue;
            };

            let site = kind.instantiate(
                record.site.clone(),
                record.user_settings.clone(),
                self.fetcher.clone(),
            )?;

            record.order = position;
            state.orders.push(record.site.clone());
            state.sites.insert(record.site.clone(), Arc::new(site));
            state.site_data.insert(record.site.clone(), record);
        }

        if cfg!(debug_assertions) {
            state.check_consistency()?;
        }

        let count = state.orders.len();
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
        Ok(count)
    }

    pub async fn await_until_initialized(&self) -> Result<()> {
        self.initializer.await_until_initialized().await
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.initializer.is_initialized() {
            Ok(())
        } else {
            Err(ChanError::NotReady(TAG))
        }
    }

    fn read_ready(&self) -> Result<RwLockReadGuard<'_, SitesState>> {
        self.ensure_ready()?;
        Ok(self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn is_site_active(&self, descriptor: &SiteDescriptor) -> Result<bool> {
        Ok(self.read_ready()?.is_active(descriptor))
    }

    pub fn by_site_descriptor(&self, descriptor: &SiteDescriptor) -> Result<Option<Arc<Site>>> {
        Ok(self.read_ready()?.sites.get(descriptor).cloned())
    }

    pub fn site_data(&self, descriptor: &SiteDescriptor) -> Result<Option<ChanSiteData>> {
        Ok(self.read_ready()?.site_data.get(descriptor).cloned())
    }

    /// Visits every site in user order until `visitor` returns `false`.
    pub fn view_sites_ordered<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&ChanSiteData, &Site) -> bool,
    {
        let state = self.read_ready()?;
        for descriptor in &state.orders {
            let (Some(data), Some(site)) = (state.site_data.get(descriptor), state.sites.get(descriptor))
            else {
                continue;
            };
            if !visitor(data, site) {
                break;
            }
        }
        Ok(())
    }

    pub fn view_active_sites_ordered<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&ChanSiteData, &Site) -> bool,
    {
        self.view_sites_ordered(|data, site| {
            if data.active && site.enabled() {
                visitor(data, site)
            } else {
                true
            }
        })
    }

    pub fn first_active_site(&self) -> Result<Option<Arc<Site>>> {
        let state = self.read_ready()?;
        Ok(state
            .orders
            .iter()
            .find(|descriptor| state.is_active(descriptor))
            .and_then(|descriptor| state.sites.get(descriptor).cloned()))
    }

    pub fn map_first_active_site<T, F>(&self, mapper: F) -> Result<Option<T>>
    where
        F: FnOnce(&ChanSiteData, &Site) -> T,
    {
        let mut mapper = Some(mapper);
        let mut result = None;

        self.view_active_sites_ordered(|data, site| {
            if let Some(mapper) = mapper.take() {
                result = Some(mapper(data, site));
            }
            false
        })?;

        Ok(result)
    }

    /// Whether at least one site is active.
    pub fn are_sites_setup(&self) -> Result<bool> {
        let state = self.read_ready()?;
        Ok(state.orders.iter().any(|descriptor| state.is_active(descriptor)))
    }

    pub fn sites_ordered(&self) -> Result<Vec<Arc<Site>>> {
        let state = self.read_ready()?;
        Ok(state
            .orders
            .iter()
            .filter_map(|descriptor| state.sites.get(descriptor).cloned())
            .collect())
    }

    pub fn site_data_ordered(&self) -> Result<Vec<ChanSiteData>> {
        Ok(self.read_ready()?.records_ordered())
    }

    /// Resolves a user-typed site name.
    pub fn find_by_name(&self, name: &str) -> Result<Arc<Site>> {
        let state = self.read_ready()?;
        state
            .orders
            .iter()
            .find(|descriptor| descriptor.site_name().eq_ignore_ascii_case(name.trim()))
            .and_then(|descriptor| state.sites.get(descriptor).cloned())
            .ok_or_else(|| ChanError::SiteNotFound(name.to_string()))
    }

    /// Returns `false` when the site already had the requested state.
    pub fn activate(self: &Arc<Self>, descriptor: &SiteDescriptor, active: bool) -> Result<bool> {
        let record = {
            self.ensure_ready()?;
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let data = state
                .site_data
                .get_mut(descriptor)
                .ok_or_else(|| ChanError::SiteNotFound(descriptor.to_string()))?;

            if data.active == active {
                return Ok(false);
            }

            data.active = active;
            data.clone()
        };

        if let Err(e) = self.store.persist_site(&record) {
            error!("Failed to persist site {}: {}", descriptor, e);
        }

        self.sites_changed();
        Ok(true)
    }

    /// Moves the site at `from` to `to`. Fails when `from` does not hold `descriptor`.
    pub fn move_site(self: &Arc<Self>, descriptor: &SiteDescriptor, from: usize, to: usize) -> Result<bool> {
        {
            self.ensure_ready()?;
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

            if state.orders.get(from) != Some(descriptor) || to >= state.orders.len() {
                return Ok(false);
            }

            let moved = state.orders.remove(from);
            state.orders.insert(to, moved);

            let SitesState { site_data, orders, .. } = &mut *state;
            for (position, site) in orders.iter().enumerate() {
                if let Some(data) = site_data.get_mut(site) {
                    data.order = position;
                }
            }
        }

        self.persist_all_debounced();
        self.sites_changed();
        Ok(true)
    }

    /// Replaces the settings of an active site. Returns `false` when nothing changed.
    pub fn update_user_settings(
        self: &Arc<Self>,
        descriptor: &SiteDescriptor,
        settings: SiteUserSettings,
    ) -> Result<bool> {
        {
            self.ensure_ready()?;
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

            if !state.is_active(descriptor) {
                return Ok(false);
            }

            let Some(data) = state.site_data.get_mut(descriptor) else {
                return Ok(false);
            };
            if data.user_settings == settings {
                return Ok(false);
            }
            data.user_settings = settings.clone();

            if let Some(site) = state.sites.get(descriptor) {
                site.update_settings(settings);
            }
        }

        self.persist_all_debounced();
        self.sites_changed();
        Ok(true)
    }

    /// Writes pending order and settings changes now instead of after the
    /// debounce window.
    pub fn flush(&self) -> Result<()> {
        self.persist_debouncer.cancel();
        let records = self.read_ready()?.records_ordered();
        self.store.persist_sites(&records)
    }

    pub fn listen_for_sites_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn persist_all_debounced(self: &Arc<Self>) {
        let this = self.clone();

        self.persist_debouncer.post(self.persist_debounce, move || async move {
            let records = this
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .records_ordered();

            match this.store.persist_sites(&records) {
                Ok(()) => debug!("Persisted {} sites", records.len()),
                Err(e) => error!("Failed to persist sites: {}", e),
            }
        });
    }

    /// Re-validates the registry and wakes listeners. Changes made while a
    /// validation runs are dropped; the running one reads the newest state.
    fn sites_changed(self: &Arc<Self>) {
        let this = self.clone();

        self.changes_executor.post(move || async move {
            if cfg!(debug_assertions) {
                this.state
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .check_consistency()?;
            }
            this.changes.notify();
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChanBoard, ChanFilter, ThreadBookmark, ThreadDescriptor};
    use crate::fetcher::mock::MockFetcher;
    use crate::store::SqliteStore;
    use serde_json::Value;

    /// Returns the first site record twice, as a corrupted table would.
    struct DuplicatingStore(SqliteStore);

    impl Store for DuplicatingStore {
        fn initialize_sites(&self, sites: &[SiteDescriptor]) -> Result<Vec<ChanSiteData>> {
            let mut records = self.0.initialize_sites(sites)?;
            if let Some(first) = records.first().cloned() {
                records.push(first);
            }
            Ok(records)
        }
        fn persist_site(&self, site: &ChanSiteData) -> Result<()> {
            self.0.persist_site(site)
        }
        fn persist_sites(&self, sites: &[ChanSiteData]) -> Result<()> {
            self.0.persist_sites(sites)
        }
        fn get_boards(&self, site: &SiteDescriptor) -> Result<Vec<ChanBoard>> {
            self.0.get_boards(site)
        }
        fn upsert_boards(&self, boards: &[ChanBoard]) -> Result<usize> {
            self.0.upsert_boards(boards)
        }
        fn get_all_bookmarks(&self, interner: &DescriptorInterner) -> Result<Vec<ThreadBookmark>> {
            self.0.get_all_bookmarks(interner)
        }
        fn upsert_bookmarks(&self, bookmarks: &[ThreadBookmark]) -> Result<()> {
            self.0.upsert_bookmarks(bookmarks)
        }
        fn delete_bookmark(&self, thread: &ThreadDescriptor) -> Result<bool> {
            self.0.delete_bookmark(thread)
        }
        fn get_all_filters(&self) -> Result<Vec<ChanFilter>> {
            self.0.get_all_filters()
        }
        fn add_filter(&self, filter: &ChanFilter) -> Result<i64> {
            self.0.add_filter(filter)
        }
        fn set_filter_enabled(&self, id: i64, enabled: bool) -> Result<()> {
            self.0.set_filter_enabled(id, enabled)
        }
        fn delete_filter(&self, id: i64) -> Result<()> {
            self.0.delete_filter(id)
        }
    }

    async fn loaded() -> (Arc<SiteManager>, Arc<SqliteStore>, Arc<DescriptorInterner>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let interner = Arc::new(DescriptorInterner::new());
        let manager = Arc::new(SiteManager::new(
            interner.clone(),
            store.clone(),
            Arc::new(MockFetcher::new()),
            Duration::from_millis(500),
        ));

        manager.load();
        manager.await_until_initialized().await.unwrap();
        (manager, store, interner)
    }

    #[tokio::test]
    async fn test_queries_fail_before_load() {
        let manager = SiteManager::new(
            Arc::new(DescriptorInterner::new()),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(MockFetcher::new()),
            Duration::from_millis(500),
        );

        assert!(matches!(manager.sites_ordered(), Err(ChanError::NotReady(_))));
        assert!(matches!(manager.are_sites_setup(), Err(ChanError::NotReady(_))));
    }

    #[test]
    fn test_consistency_check_detects_size_mismatch() {
        let interner = DescriptorInterner::new();
        let four = interner.get_or_create("4chan");

        let mut state = SitesState::default();
        assert!(state.check_consistency().is_ok());

        state.orders.push(four.clone());
        state.site_data.insert(four.clone(), ChanSiteData::new(four, 0));
        assert!(matches!(state.check_consistency(), Err(ChanError::Consistency(_))));
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn test_inconsistent_load_fails_the_init_gate() {
        let manager = Arc::new(SiteManager::new(
            Arc::new(DescriptorInterner::new()),
            Arc::new(DuplicatingStore(SqliteStore::in_memory().unwrap())),
            Arc::new(MockFetcher::new()),
            Duration::from_millis(500),
        ));

        manager.load().await.unwrap();

        let err = manager.await_until_initialized().await.unwrap_err();
        assert!(matches!(err, ChanError::InitFailed(_, ref m) if m.contains("differ in size")));
        assert!(matches!(manager.sites_ordered(), Err(ChanError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_load_registers_every_kind() {
        let (manager, _, _) = loaded().await;

        let sites = manager.sites_ordered().unwrap();
        assert_eq!(sites.len(), SiteKind::ALL.len());
        assert!(manager.are_sites_setup().unwrap());
        assert_eq!(manager.first_active_site().unwrap().unwrap().name(), "4chan");
    }

    #[tokio::test]
    async fn test_activate_is_idempotent_and_notifies() {
        let (manager, store, interner) = loaded().await;
        let bbw = interner.get_or_create("bbwchan");
        let mut changes = manager.listen_for_sites_changes();

        assert!(!manager.activate(&bbw, false).unwrap());
        assert!(manager.activate(&bbw, true).unwrap());
        assert!(manager.is_site_active(&bbw).unwrap());

        changes.changed().await.unwrap();

        let persisted = store.initialize_sites(&[bbw.clone()]).unwrap();
        assert!(persisted[0].active);
    }

    #[tokio::test]
    async fn test_map_first_active_site_visits_in_order() {
        let (manager, _, interner) = loaded().await;
        let four = interner.get_or_create("4chan");
        manager.activate(&interner.get_or_create("Bbwchan"), true).unwrap();
        manager.activate(&four, false).unwrap();

        let first = manager.map_first_active_site(|data, _| data.site.clone()).unwrap();
        assert_eq!(first.unwrap().site_name(), "Bbwchan");

        let mut visited = Vec::new();
        manager
            .view_active_sites_ordered(|data, _| {
                visited.push(data.site.to_string());
                true
            })
            .unwrap();
        assert_eq!(visited, vec!["Bbwchan"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_site_requires_matching_position() {
        let (manager, store, interner) = loaded().await;
        let four = interner.get_or_create("4chan");

        assert!(!manager.move_site(&four, 1, 0).unwrap());
        assert!(!manager.move_site(&four, 0, 99).unwrap());
        assert!(manager.move_site(&four, 0, 2).unwrap());

        let names: Vec<String> = manager
            .site_data_ordered()
            .unwrap()
            .iter()
            .map(|data| data.site.to_string())
            .collect();
        assert_eq!(names.last().map(String::as_str), Some("4chan"));

        tokio::time::sleep(Duration::from_millis(600)).await;

        let descriptors: Vec<SiteDescriptor> = SiteKind::ALL
            .iter()
            .map(|kind| interner.get_or_create(kind.site_name()))
            .collect();
        let persisted = store.initialize_sites(&descriptors).unwrap();
        assert_eq!(persisted.last().unwrap().site.site_name(), "4chan");
    }

    #[tokio::test]
    async fn test_flush_persists_order_immediately() {
        let (manager, store, interner) = loaded().await;
        let four = interner.get_or_create("4chan");

        assert!(manager.move_site(&four, 0, 1).unwrap());
        manager.flush().unwrap();

        let descriptors: Vec<SiteDescriptor> = SiteKind::ALL
            .iter()
            .map(|kind| interner.get_or_create(kind.site_name()))
            .collect();
        let mut persisted = store.initialize_sites(&descriptors).unwrap();
        persisted.sort_by_key(|data| data.order);
        assert_eq!(persisted[1].site.site_name(), "4chan");
    }

    #[tokio::test]
    async fn test_update_user_settings_only_for_active_sites() {
        let (manager, _, interner) = loaded().await;
        let bbw = interner.get_or_create("Bbwchan");
        let four = interner.get_or_create("4chan");

        let mut settings = SiteUserSettings::new();
        settings.insert("pass_token".into(), Value::String("secret".into()));

        assert!(!manager.update_user_settings(&bbw, settings.clone()).unwrap());
        assert!(manager.update_user_settings(&four, settings.clone()).unwrap());
        assert!(!manager.update_user_settings(&four, settings).unwrap());

        let site = manager.by_site_descriptor(&four).unwrap().unwrap();
        assert_eq!(site.auth_state(), crate::site::AuthState::LoggedIn);
    }
}
