use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::app::{ChanError, Result};
use crate::domain::{
    BoardDescriptor, BoardPage, BoardPages, ChanBoard, PostBuilder, PostImage,
    ThreadDescriptor, ThreadNoTimeModPair,
};
use crate::fetcher::FetchRequest;
use crate::site::json::{lenient_bool, non_empty};
use crate::site::{ChanReader, JsonResponse, SiteActions, SiteContext};

pub const SITE_NAME: &str = "4chan";
pub const PASS_TOKEN_SETTING: &str = "pass_token";

const API_ROOT: &str = "https://a.4cdn.org";
const MEDIA_ROOT: &str = "https://i.4cdn.org";

#[derive(Deserialize)]
struct ThreadJson {
    posts: Vec<PostJson>,
}

#[derive(Deserialize)]
struct PostJson {
    no: u64,
    #[serde(default)]
    resto: u64,
    #[serde(default)]
    time: i64,
    #[serde(default, deserialize_with = "non_empty")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    trip: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    id: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    sub: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    tim: Option<u64>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    fsize: u64,
    #[serde(default)]
    w: u32,
    #[serde(default)]
    h: u32,
    #[serde(default, deserialize_with = "lenient_bool")]
    spoiler: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    sticky: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    closed: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    archived: bool,
    #[serde(default)]
    replies: u32,
    #[serde(default)]
    images: u32,
    #[serde(default)]
    last_modified: i64,
}

#[derive(Deserialize)]
struct CatalogPageJson {
    threads: Vec<PostJson>,
}

#[derive(Deserialize)]
struct ThreadsPageJson {
    page: u32,
    threads: Vec<ThreadEntryJson>,
}

#[derive(Deserialize)]
struct ThreadEntryJson {
    no: u64,
    #[serde(default)]
    last_modified: i64,
}

#[derive(Deserialize)]
struct BoardsJson {
    boards: Vec<BoardJson>,
}

#[derive(Deserialize)]
struct BoardJson {
    board: String,
    title: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    ws_board: bool,
    #[serde(default)]
    per_page: Option<u32>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    bump_limit: Option<u32>,
    #[serde(default)]
    meta_description: Option<String>,
}

#[derive(Default)]
pub struct Chan4Reader;

impl Chan4Reader {
    fn to_builder(board: &BoardDescriptor, post: PostJson) -> PostBuilder {
        let mut builder = PostBuilder::new(board.clone(), post.no);
        builder.op = post.resto == 0;
        builder.op_no = if builder.op { post.no } else { post.resto };
        builder.subject = post.sub;
        builder.name = post.name;
        builder.tripcode = post.trip;
        builder.poster_id = post.id;
        builder.comment = post.com.unwrap_or_default();
        builder.timestamp = post.time;
        builder.sticky = post.sticky;
        builder.closed = post.closed;
        builder.archived = post.archived;
        builder.total_replies = post.replies;
        builder.thread_images = post.images;
        builder.last_modified = post.last_modified;

        if let (Some(tim), Some(ext)) = (post.tim, post.ext) {
            let extension = ext.trim_start_matches('.').to_string();
            builder.images.push(PostImage {
                server_filename: tim.to_string(),
                original_filename: post.filename,
                image_url: Some(format!("{}/{}/{}.{}", MEDIA_ROOT, board.board_code, tim, extension)),
                thumbnail_url: Some(format!("{}/{}/{}s.jpg", MEDIA_ROOT, board.board_code, tim)),
                extension: Some(extension),
                size: post.fsize,
                width: post.w,
                height: post.h,
                spoiler: post.spoiler,
            });
        }

        builder
    }

    fn read_pages(board: &BoardDescriptor, body: &[u8]) -> Result<BoardPages> {
        let raw: Vec<ThreadsPageJson> = serde_json::from_slice(body)?;
        let total_pages = raw.iter().map(|page| page.page).max().unwrap_or(0);

        let pages = raw
            .into_iter()
            .map(|page| BoardPage {
                current_page: page.page,
                total_pages,
                threads: page
                    .threads
                    .into_iter()
                    .map(|entry| ThreadNoTimeModPair {
                        thread: board.thread(entry.no),
                        modified: entry.last_modified,
                    })
                    .collect(),
            })
            .collect();

        Ok(BoardPages {
            board: board.clone(),
            pages,
        })
    }
}

impl ChanReader for Chan4Reader {
    fn read_thread(&self, thread: &ThreadDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let raw: ThreadJson = serde_json::from_slice(body)?;
        Ok(raw
            .posts
            .into_iter()
            .map(|post| Self::to_builder(&thread.board, post))
            .collect())
    }

    fn read_catalog(&self, board: &BoardDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let raw: Vec<CatalogPageJson> = serde_json::from_slice(body)?;
        Ok(raw
            .into_iter()
            .flat_map(|page| page.threads)
            .map(|post| Self::to_builder(board, post))
            .collect())
    }
}

pub struct Chan4 {
    pub(super) ctx: SiteContext,
    pub(super) reader: Arc<Chan4Reader>,
}

impl Chan4 {
    pub fn new(ctx: SiteContext) -> Self {
        Self {
            ctx,
            reader: Arc::new(Chan4Reader),
        }
    }

    /// Requests carry the pass cookie once a pass token is configured.
    fn request(&self, url: String) -> FetchRequest {
        let request = FetchRequest::get(url);
        match self.ctx.setting(PASS_TOKEN_SETTING) {
            Some(token) => request
                .with_cookie("pass_id", token)
                .with_cookie("pass_enabled", "1"),
            None => request,
        }
    }
}

#[async_trait]
impl SiteActions for Chan4 {
    async fn boards(&self) -> JsonResponse<Vec<ChanBoard>> {
        let site = self.ctx.descriptor.clone();
        let url = format!("{}/boards.json", API_ROOT);

        self.ctx
            .fetch_json(self.request(url), move |body| {
                let raw: BoardsJson = serde_json::from_slice(body)?;
                Ok(raw
                    .boards
                    .into_iter()
                    .map(|board| {
                        let mut chan_board = ChanBoard::new(site.board(board.board), board.title);
                        chan_board.work_safe = board.ws_board;
                        chan_board.description = board.meta_description;
                        chan_board.bump_limit = board.bump_limit;
                        if let Some(pages) = board.pages {
                            chan_board.page_count = pages;
                        }
                        if let Some(per_page) = board.per_page {
                            chan_board.threads_per_page = per_page;
                        }
                        chan_board
                    })
                    .collect())
            })
            .await
    }

    async fn pages(&self, board: &ChanBoard) -> JsonResponse<BoardPages> {
        let descriptor = board.descriptor.clone();
        let url = format!("{}/{}/threads.json", API_ROOT, board.code());

        self.ctx
            .fetch_json(self.request(url), move |body| Chan4Reader::read_pages(&descriptor, body))
            .await
    }

    async fn thread(&self, thread: &ThreadDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = format!(
            "{}/{}/thread/{}.json",
            API_ROOT,
            thread.board_code(),
            thread.thread_no
        );

        self.ctx
            .fetch_json(self.request(url), |body| self.reader.read_thread(thread, body))
            .await
    }

    async fn catalog(&self, board: &BoardDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = format!("{}/{}/catalog.json", API_ROOT, board.board_code);

        self.ctx
            .fetch_json(self.request(url), |body| self.reader.read_catalog(board, body))
            .await
    }

    async fn search(&self, _board: &BoardDescriptor, _query: &str) -> JsonResponse<Vec<PostBuilder>> {
        JsonResponse::UnknownServerError(ChanError::NotSupported("search", SITE_NAME.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DescriptorInterner, SiteUserSettings};
    use crate::fetcher::mock::MockFetcher;

    const THREAD: &str = r##"{"posts": [
        {"no": 100, "resto": 0, "time": 1600000000, "name": "Anonymous", "sub": "Desktop thread",
         "com": "Post your desktops", "tim": 1600000000123, "ext": ".png", "filename": "screen",
         "fsize": 2048, "w": 1920, "h": 1080, "sticky": 1, "replies": 1, "images": 1},
        {"no": 101, "resto": 100, "time": 1600000100, "name": "Anonymous", "trip": "!abc",
         "com": "<a href=\"#p100\" class=\"quotelink\">&gt;&gt;100</a><br>nice"}
    ]}"##;

    const THREADS: &str = r#"[
        {"page": 1, "threads": [{"no": 100, "last_modified": 5}, {"no": 200, "last_modified": 6}]},
        {"page": 2, "threads": [{"no": 300, "last_modified": 7}]}
    ]"#;

    fn site(fetcher: Arc<MockFetcher>) -> Chan4 {
        let descriptor = DescriptorInterner::new().get_or_create(SITE_NAME);
        Chan4::new(SiteContext::new(descriptor, fetcher, SiteUserSettings::new()))
    }

    #[test]
    fn test_read_thread() {
        let board = DescriptorInterner::new().get_or_create(SITE_NAME).board("g");
        let builders = Chan4Reader
            .read_thread(&board.thread(100), THREAD.as_bytes())
            .unwrap();

        assert_eq!(builders.len(), 2);
        let op = &builders[0];
        assert!(op.op);
        assert!(op.sticky);
        assert_eq!(op.subject.as_deref(), Some("Desktop thread"));
        assert_eq!(op.images.len(), 1);
        assert_eq!(
            op.images[0].image_url.as_deref(),
            Some("https://i.4cdn.org/g/1600000000123.png")
        );

        let reply = &builders[1];
        assert!(!reply.op);
        assert_eq!(reply.op_no, 100);
        assert_eq!(reply.tripcode.as_deref(), Some("!abc"));
        assert!(reply.images.is_empty());
    }

    #[test]
    fn test_read_thread_rejects_garbage() {
        let board = DescriptorInterner::new().get_or_create(SITE_NAME).board("g");
        assert!(Chan4Reader.read_thread(&board.thread(1), b"<html>").is_err());
    }

    #[tokio::test]
    async fn test_pages() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://a.4cdn.org/g/threads.json", THREADS);
        let site = site(fetcher);

        let board = ChanBoard::new(site.ctx.descriptor.board("g"), "Technology");
        let pages = site.pages(&board).await.into_result().unwrap();

        assert_eq!(pages.pages.len(), 2);
        assert_eq!(pages.find_page(300).unwrap().current_page, 2);
        assert!(pages.find_page(300).unwrap().is_on_last_page());
        assert!(!pages.find_page(100).unwrap().is_on_last_page());
    }

    #[tokio::test]
    async fn test_thread_not_found_is_server_error() {
        let fetcher = Arc::new(MockFetcher::new());
        let site = site(fetcher);
        let thread = site.ctx.descriptor.board("g").thread(1);

        assert!(matches!(site.thread(&thread).await, JsonResponse::ServerError(404)));
    }

    #[tokio::test]
    async fn test_malformed_response_is_parsing_error() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://a.4cdn.org/g/catalog.json", "{not json");
        let site = site(fetcher);

        let response = site.catalog(&site.ctx.descriptor.board("g")).await;
        assert!(matches!(response, JsonResponse::ParsingError(_)));
    }

    #[tokio::test]
    async fn test_boards() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            "https://a.4cdn.org/boards.json",
            r#"{"boards": [{"board": "g", "title": "Technology", "ws_board": 1, "per_page": 15, "pages": 10, "bump_limit": 310}]}"#,
        );
        let site = site(fetcher);

        let boards = site.boards().await.into_result().unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].code(), "g");
        assert!(boards[0].work_safe);
        assert_eq!(boards[0].bump_limit, Some(310));
    }

    #[tokio::test]
    async fn test_pass_token_is_sent_as_cookie() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = "https://a.4cdn.org/g/catalog.json";
        fetcher.respond(url, "[]");

        let anonymous = site(fetcher.clone());
        let board = anonymous.ctx.descriptor.board("g");
        anonymous.catalog(&board).await.into_result().unwrap();
        assert_eq!(fetcher.last_cookie(url), None);

        let mut settings = SiteUserSettings::new();
        settings.insert(PASS_TOKEN_SETTING.into(), "token".into());
        anonymous.ctx.set_settings(settings);
        anonymous.catalog(&board).await.into_result().unwrap();
        assert_eq!(
            fetcher.last_cookie(url).as_deref(),
            Some("pass_id=token; pass_enabled=1")
        );
    }
}
