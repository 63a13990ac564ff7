use std::collections::HashSet;

use serde::Deserialize;

use crate::app::{ChanError, Result};
use crate::domain::BoardDescriptor;

/// Archives that are known by domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveType {
    ForPlebs,
    Nyafuu,
    RebeccaBlackTech,
    Warosu,
    DesuArchive,
    Fireden,
    B4k,
    BStats,
    ArchivedMoe,
    TheBArchive,
    ArchiveOfSins,
}

impl ArchiveType {
    pub const ALL: [ArchiveType; 11] = [
        ArchiveType::ForPlebs,
        ArchiveType::Nyafuu,
        ArchiveType::RebeccaBlackTech,
        ArchiveType::Warosu,
        ArchiveType::DesuArchive,
        ArchiveType::Fireden,
        ArchiveType::B4k,
        ArchiveType::BStats,
        ArchiveType::ArchivedMoe,
        ArchiveType::TheBArchive,
        ArchiveType::ArchiveOfSins,
    ];

    pub fn domain(&self) -> &'static str {
        match self {
            ArchiveType::ForPlebs => "archive.4plebs.org",
            ArchiveType::Nyafuu => "archive.nyafuu.org",
            ArchiveType::RebeccaBlackTech => "archive.rebeccablacktech.com",
            ArchiveType::Warosu => "warosu.org",
            ArchiveType::DesuArchive => "desuarchive.org",
            ArchiveType::Fireden => "boards.fireden.net",
            ArchiveType::B4k => "arch.b4k.co",
            ArchiveType::BStats => "archive.b-stats.org",
            ArchiveType::ArchivedMoe => "archived.moe",
            ArchiveType::TheBArchive => "thebarchive.com",
            ArchiveType::ArchiveOfSins => "archiveofsins.com",
        }
    }

    pub fn by_domain(domain: &str) -> Option<ArchiveType> {
        Self::ALL
            .into_iter()
            .find(|archive_type| archive_type.domain().eq_ignore_ascii_case(domain))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveDescriptor {
    pub archive_id: u64,
    pub name: String,
    pub domain: String,
    pub archive_type: Option<ArchiveType>,
}

// Unusable archives: b-stats has an unknown state, warosu requires Cloudflare
// authentication and thebarchive answers 403 to non-browser clients.
const DISABLED_ARCHIVES: [&str; 3] = ["archive.b-stats.org", "warosu.org", "thebarchive.com"];

/// An entry of the bundled archive catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveData {
    #[serde(skip)]
    archive_descriptor: Option<ArchiveDescriptor>,
    #[serde(skip)]
    supported_sites: HashSet<String>,
    pub name: String,
    pub domain: String,
    #[serde(rename = "boards")]
    pub supported_boards: HashSet<String>,
    #[serde(rename = "files")]
    pub supported_files: HashSet<String>,
}

impl ArchiveData {
    pub fn is_enabled(&self) -> bool {
        !DISABLED_ARCHIVES.contains(&self.domain.as_str())
    }

    /// Links this record to its descriptor. Calling it twice is a bug.
    pub fn set_archive_descriptor(&mut self, descriptor: ArchiveDescriptor) -> Result<()> {
        if self.archive_descriptor.is_some() {
            return Err(ChanError::Consistency(format!(
                "double initialization of archive descriptor for {}",
                self.domain
            )));
        }

        self.archive_descriptor = Some(descriptor);
        Ok(())
    }

    pub fn archive_descriptor(&self) -> Option<&ArchiveDescriptor> {
        self.archive_descriptor.as_ref()
    }

    pub fn set_supported_sites<I, S>(&mut self, sites: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_sites = sites
            .into_iter()
            .map(|site| site.as_ref().to_ascii_lowercase())
            .collect();
    }

    pub fn supports(&self, board: &BoardDescriptor) -> bool {
        let site_name = board.site_name();
        let suitable_site = site_name.eq_ignore_ascii_case(&self.domain)
            || self
                .supported_sites
                .contains(&site_name.to_ascii_lowercase());

        suitable_site && self.supported_boards.contains(&board.board_code)
    }

    pub fn supports_file(&self, extension: &str) -> bool {
        self.supported_files
            .contains(&extension.trim_start_matches('.').to_ascii_lowercase())
    }
}
