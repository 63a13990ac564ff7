//! Site adapters.
//!
//! Every supported forum engine is a variant of the closed [`Site`] enum and
//! exposes its capabilities through [`SiteActions`]. [`SiteKind`] is the static
//! registry of known sites used to instantiate them at startup.

mod chan4;
mod foolfuuka;
mod json;
mod lynxchan;

pub use chan4::{Chan4, Chan4Reader};
pub use foolfuuka::{FoolFuukaReader, FoolFuukaSite};
pub use lynxchan::{LynxchanReader, LynxchanSite};

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::app::{ChanError, Result};
use crate::domain::{
    BoardDescriptor, BoardPages, ChanBoard, PostBuilder, SiteDescriptor, SiteUserSettings,
    ThreadDescriptor,
};
use crate::fetcher::{FetchRequest, FetchResult, Fetcher};
use crate::parser::CommentParser;

/// Outcome of a JSON API request.
#[derive(Debug)]
pub enum JsonResponse<T> {
    Success(T),
    ServerError(u16),
    UnknownServerError(ChanError),
    ParsingError(ChanError),
}

impl<T> JsonResponse<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            JsonResponse::Success(value) => Ok(value),
            JsonResponse::ServerError(status) => Err(ChanError::ServerError(status)),
            JsonResponse::UnknownServerError(e) | JsonResponse::ParsingError(e) => Err(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> JsonResponse<U> {
        match self {
            JsonResponse::Success(value) => JsonResponse::Success(f(value)),
            JsonResponse::ServerError(status) => JsonResponse::ServerError(status),
            JsonResponse::UnknownServerError(e) => JsonResponse::UnknownServerError(e),
            JsonResponse::ParsingError(e) => JsonResponse::ParsingError(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JsonResponse::Success(_))
    }
}

/// Converts an engine's raw JSON into post builders.
pub trait ChanReader: Send + Sync {
    fn read_thread(&self, thread: &ThreadDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>>;
    fn read_catalog(&self, board: &BoardDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>>;

    fn comment_parser(&self) -> CommentParser {
        CommentParser
    }
}

#[async_trait]
pub trait SiteActions: Send + Sync {
    async fn boards(&self) -> JsonResponse<Vec<ChanBoard>>;
    async fn pages(&self, board: &ChanBoard) -> JsonResponse<BoardPages>;
    async fn thread(&self, thread: &ThreadDescriptor) -> JsonResponse<Vec<PostBuilder>>;
    async fn catalog(&self, board: &BoardDescriptor) -> JsonResponse<Vec<PostBuilder>>;
    async fn search(&self, board: &BoardDescriptor, query: &str) -> JsonResponse<Vec<PostBuilder>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    LoggedIn,
}

/// State every site implementation carries.
pub struct SiteContext {
    pub descriptor: SiteDescriptor,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    settings: RwLock<SiteUserSettings>,
}

impl SiteContext {
    pub fn new(
        descriptor: SiteDescriptor,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        settings: SiteUserSettings,
    ) -> Self {
        Self {
            descriptor,
            fetcher,
            settings: RwLock::new(settings),
        }
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|value| value.as_str())
            .map(String::from)
    }

    pub fn set_settings(&self, settings: SiteUserSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub(crate) async fn fetch_json<T: Send>(
        &self,
        request: impl Into<FetchRequest>,
        parse: impl FnOnce(&[u8]) -> Result<T> + Send,
    ) -> JsonResponse<T> {
        let request = request.into();
        match self.fetcher.fetch(&request).await {
            Ok(FetchResult::Content { body }) => match parse(&body) {
                Ok(value) => JsonResponse::Success(value),
                Err(e) => JsonResponse::ParsingError(e),
            },
            Ok(FetchResult::ServerError { status }) => JsonResponse::ServerError(status),
            Err(e) => JsonResponse::UnknownServerError(e),
        }
    }
}

/// Static registry of supported sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    Chan4,
    ArchiveOfSins,
    Bbwchan,
}

impl SiteKind {
    pub const ALL: [SiteKind; 3] = [SiteKind::Chan4, SiteKind::ArchiveOfSins, SiteKind::Bbwchan];

    pub fn site_name(&self) -> &'static str {
        match self {
            SiteKind::Chan4 => chan4::SITE_NAME,
            SiteKind::ArchiveOfSins => foolfuuka::ARCHIVE_OF_SINS_NAME,
            SiteKind::Bbwchan => lynxchan::BBWCHAN_NAME,
        }
    }

    pub fn by_name(name: &str) -> Option<SiteKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.site_name().eq_ignore_ascii_case(name))
    }

    pub fn instantiate(
        &self,
        descriptor: SiteDescriptor,
        settings: SiteUserSettings,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Result<Site> {
        let ctx = SiteContext::new(descriptor, fetcher, settings);

        let site = match self {
            SiteKind::Chan4 => Site::Chan4(Chan4::new(ctx)),
            SiteKind::ArchiveOfSins => Site::FoolFuuka(FoolFuukaSite::archive_of_sins(ctx)?),
            SiteKind::Bbwchan => Site::Lynxchan(LynxchanSite::bbwchan(ctx)?),
        };

        Ok(site)
    }
}

pub enum Site {
    Chan4(Chan4),
    FoolFuuka(FoolFuukaSite),
    Lynxchan(LynxchanSite),
}

impl Site {
    fn ctx(&self) -> &SiteContext {
        match self {
            Site::Chan4(site) => &site.ctx,
            Site::FoolFuuka(site) => &site.ctx,
            Site::Lynxchan(site) => &site.ctx,
        }
    }

    pub fn kind(&self) -> SiteKind {
        match self {
            Site::Chan4(_) => SiteKind::Chan4,
            Site::FoolFuuka(_) => SiteKind::ArchiveOfSins,
            Site::Lynxchan(_) => SiteKind::Bbwchan,
        }
    }

    pub fn descriptor(&self) -> &SiteDescriptor {
        &self.ctx().descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor().site_name()
    }

    /// Whether the implementation is usable at all, independent of the
    /// user's activation choice.
    pub fn enabled(&self) -> bool {
        true
    }

    pub fn actions(&self) -> &dyn SiteActions {
        match self {
            Site::Chan4(site) => site as &dyn SiteActions,
            Site::FoolFuuka(site) => site as &dyn SiteActions,
            Site::Lynxchan(site) => site as &dyn SiteActions,
        }
    }

    pub fn reader(&self) -> Arc<dyn ChanReader> {
        match self {
            Site::Chan4(site) => site.reader.clone(),
            Site::FoolFuuka(site) => site.reader.clone(),
            Site::Lynxchan(site) => site.reader.clone(),
        }
    }

    pub fn auth_state(&self) -> AuthState {
        let key = match self {
            Site::Chan4(_) => chan4::PASS_TOKEN_SETTING,
            Site::FoolFuuka(_) => return AuthState::Anonymous,
            Site::Lynxchan(_) => lynxchan::LOGIN_HASH_SETTING,
        };

        match self.ctx().setting(key) {
            Some(token) if !token.is_empty() => AuthState::LoggedIn,
            _ => AuthState::Anonymous,
        }
    }

    pub fn update_settings(&self, settings: SiteUserSettings) {
        self.ctx().set_settings(settings);
    }
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("kind", &self.kind())
            .field("descriptor", self.descriptor())
            .finish()
    }
}
