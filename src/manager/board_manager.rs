use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::app::{ChanError, Result};
use crate::domain::{BoardDescriptor, ChanBoard, SiteDescriptor};
use crate::store::Store;
use crate::sync::SuspendableInitializer;

/// Known boards per site, loaded from the store and refreshed from site board lists.
pub struct BoardManager {
    store: Arc<dyn Store>,
    initializer: SuspendableInitializer<()>,
    boards: RwLock<HashMap<SiteDescriptor, BTreeMap<String, ChanBoard>>>,
}

impl BoardManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            initializer: SuspendableInitializer::new("BoardManager"),
            boards: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self, sites: &[SiteDescriptor]) -> Result<()> {
        let result = self.load_inner(sites);
        if let Err(e) = &result {
            self.initializer.init_with_error(e);
        } else {
            self.initializer.init_with_value(());
        }
        result
    }

    fn load_inner(&self, sites: &[SiteDescriptor]) -> Result<()> {
        let mut loaded = HashMap::with_capacity(sites.len());
        let mut total = 0;

        for site in sites {
            let boards: BTreeMap<String, ChanBoard> = self
                .store
                .get_boards(site)?
                .into_iter()
                .map(|board| (board.code().to_string(), board))
                .collect();

            total += boards.len();
            loaded.insert(site.clone(), boards);
        }

        *self.boards.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        info!("Loaded {} boards for {} sites", total, sites.len());
        Ok(())
    }

    pub async fn await_until_initialized(&self) -> Result<()> {
        self.initializer.await_until_initialized().await
    }

    pub fn is_ready(&self) -> bool {
        self.initializer.is_initialized()
    }

    pub fn by_board_descriptor(&self, board: &BoardDescriptor) -> Option<ChanBoard> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&board.site)
            .and_then(|boards| boards.get(&board.board_code))
            .cloned()
    }

    pub fn require_board(&self, board: &BoardDescriptor) -> Result<ChanBoard> {
        self.by_board_descriptor(board)
            .ok_or_else(|| ChanError::BoardNotFound(board.to_string()))
    }

    pub fn boards_for_site(&self, site: &SiteDescriptor) -> Vec<ChanBoard> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(site)
            .map(|boards| boards.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn board_descriptors_for_site(&self, site: &SiteDescriptor) -> Vec<BoardDescriptor> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(site)
            .map(|boards| boards.values().map(|board| board.descriptor.clone()).collect())
            .unwrap_or_default()
    }

    /// Persists `boards` and merges them into the cache. User activation of
    /// already known boards is preserved.
    pub fn save_boards(&self, site: &SiteDescriptor, boards: Vec<ChanBoard>) -> Result<usize> {
        let merged: Vec<ChanBoard> = {
            let cache = self.boards.read().unwrap_or_else(PoisonError::into_inner);
            let known = cache.get(site);

            boards
                .into_iter()
                .map(|mut board| {
                    if let Some(existing) = known.and_then(|known| known.get(board.code())) {
                        board.active = existing.active;
                    }
                    board
                })
                .collect()
        };

        let saved = self.store.upsert_boards(&merged)?;

        let mut cache = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.entry(site.clone()).or_default();
        for board in merged {
            entry.insert(board.code().to_string(), board);
        }

        debug!("Saved {} boards for {}", saved, site);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DescriptorInterner;
    use crate::store::SqliteStore;

    fn setup() -> (BoardManager, SiteDescriptor) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let site = DescriptorInterner::new().get_or_create("4chan");
        store.initialize_sites(&[site.clone()]).unwrap();
        (BoardManager::new(store), site)
    }

    #[tokio::test]
    async fn test_save_and_lookup() {
        let (manager, site) = setup();
        manager.load(&[site.clone()]).unwrap();
        manager.await_until_initialized().await.unwrap();

        manager
            .save_boards(
                &site,
                vec![
                    ChanBoard::new(site.board("g"), "Technology"),
                    ChanBoard::new(site.board("a"), "Anime"),
                ],
            )
            .unwrap();

        assert_eq!(manager.by_board_descriptor(&site.board("g")).unwrap().name, "Technology");
        assert!(manager.require_board(&site.board("zz")).is_err());
        assert_eq!(manager.board_descriptors_for_site(&site).len(), 2);
    }

    #[test]
    fn test_reload_from_store() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let site = DescriptorInterner::new().get_or_create("4chan");
        store.initialize_sites(&[site.clone()]).unwrap();

        let first = BoardManager::new(store.clone());
        first.load(&[site.clone()]).unwrap();
        first
            .save_boards(&site, vec![ChanBoard::new(site.board("g"), "Technology")])
            .unwrap();

        let second = BoardManager::new(store);
        second.load(&[site.clone()]).unwrap();
        assert!(second.is_ready());
        assert_eq!(second.boards_for_site(&site).len(), 1);
    }
}
