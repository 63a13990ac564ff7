use std::sync::{PoisonError, RwLock};

use tracing::info;
use url::Url;

use crate::app::{ChanError, Result};
use crate::domain::{
    ArchiveData, ArchiveDescriptor, ArchiveType, BoardDescriptor, SiteDescriptor,
    ThreadDescriptor,
};
use crate::sync::SuspendableInitializer;

const ARCHIVES_JSON: &str = include_str!("../../assets/archives.json");

/// Archived threads are only looked up for 4chan boards.
const ARCHIVED_SITES: [&str; 1] = ["4chan"];

/// Stable archive ids. Persisted references depend on them, never renumber.
const ARCHIVE_IDS: [(&str, u64); 11] = [
    ("archive.4plebs.org", 1),
    ("archive.nyafuu.org", 2),
    ("archive.rebeccablacktech.com", 3),
    ("warosu.org", 4),
    ("desuarchive.org", 5),
    ("boards.fireden.net", 6),
    ("arch.b4k.co", 7),
    ("archive.b-stats.org", 8),
    ("archived.moe", 9),
    ("thebarchive.com", 10),
    ("archiveofsins.com", 11),
];

fn archive_id(domain: &str) -> Option<u64> {
    ARCHIVE_IDS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(domain))
        .map(|(_, id)| *id)
}

/// Catalog of third-party archives and the boards each one mirrors.
pub struct ArchivesManager {
    gate: SuspendableInitializer<()>,
    archives: RwLock<Vec<ArchiveData>>,
}

impl Default for ArchivesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchivesManager {
    pub fn new() -> Self {
        Self {
            gate: SuspendableInitializer::new("ArchivesManager"),
            archives: RwLock::new(Vec::new()),
        }
    }

    /// Loads the bundled catalog.
    pub fn initialize(&self) -> Result<()> {
        self.initialize_from(ARCHIVES_JSON)
    }

    /// Loads `json` and opens the gate with the outcome. Readers waiting on
    /// the gate observe a failure too.
    pub fn initialize_from(&self, json: &str) -> Result<()> {
        match Self::load_archives(json) {
            Ok(archives) => {
                info!("Loaded {} archives", archives.len());
                *self.archives.write().unwrap_or_else(PoisonError::into_inner) = archives;
                self.gate.init_with_value(());
                Ok(())
            }
            Err(e) => {
                self.gate.init_with_error(&e);
                Err(e)
            }
        }
    }

    fn load_archives(json: &str) -> Result<Vec<ArchiveData>> {
        let mut archives: Vec<ArchiveData> = serde_json::from_str(json)?;

        for archive in &mut archives {
            let archive_id = archive_id(&archive.domain)
                .ok_or_else(|| ChanError::UnknownArchiveDomain(archive.domain.clone()))?;

            let descriptor = ArchiveDescriptor {
                archive_id,
                name: archive.name.clone(),
                domain: archive.domain.clone(),
                archive_type: ArchiveType::by_domain(&archive.domain),
            };

            archive.set_archive_descriptor(descriptor)?;
            archive.set_supported_sites(ARCHIVED_SITES);
        }

        Ok(archives)
    }

    async fn ready(&self) -> Result<()> {
        self.gate.await_until_initialized().await
    }

    /// Whether any enabled archive mirrors `board`.
    pub async fn supports(&self, board: &BoardDescriptor) -> Result<bool> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|archive| archive.is_enabled() && archive.supports(board)))
    }

    /// Enabled archives that may hold `thread`.
    pub async fn archives_for_thread(&self, thread: &ThreadDescriptor) -> Result<Vec<ArchiveDescriptor>> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|archive| archive.is_enabled() && archive.supports(&thread.board))
            .filter_map(|archive| archive.archive_descriptor().cloned())
            .collect())
    }

    /// Every archive mirroring `board`, disabled ones included.
    pub async fn by_board(&self, board: &BoardDescriptor) -> Result<Vec<ArchiveData>> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|archive| archive.supports(board))
            .cloned()
            .collect())
    }

    pub async fn all_archive_data(&self) -> Result<Vec<ArchiveData>> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    pub async fn all_archive_descriptors(&self) -> Result<Vec<ArchiveDescriptor>> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|archive| archive.archive_descriptor().cloned())
            .collect())
    }

    /// Whether `site` is one of the archives rather than a live imageboard.
    pub async fn is_site_archive(&self, site: &SiteDescriptor) -> Result<bool> {
        self.ready().await?;
        Ok(self
            .archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|archive| archive.domain.eq_ignore_ascii_case(site.site_name())))
    }

    /// FoolFuuka API link of `thread` on `archive`.
    pub async fn request_link_for_thread(
        &self,
        thread: &ThreadDescriptor,
        archive: &ArchiveDescriptor,
    ) -> Result<Url> {
        self.ready().await?;

        let mut url = Url::parse(&format!("https://{}/_/api/chan/thread/", archive.domain))?;
        url.query_pairs_mut()
            .append_pair("board", thread.board_code())
            .append_pair("num", &thread.thread_no.to_string());
        Ok(url)
    }
}
