use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use url::Url;

use crate::app::Result;
use crate::domain::{
    BoardDescriptor, BoardPage, BoardPages, ChanBoard, PostBuilder, PostImage, ThreadDescriptor,
    ThreadNoTimeModPair,
};
use crate::site::json::{lenient_bool, lenient_u32, lenient_u64, non_empty};
use crate::site::{ChanReader, JsonResponse, SiteActions, SiteContext};

pub const BBWCHAN_NAME: &str = "Bbwchan";
pub const LOGIN_HASH_SETTING: &str = "login_hash";
/// Overrides the default domain when set.
pub const SITE_DOMAIN_SETTING: &str = "site_domain";

const BBWCHAN_DEFAULT_DOMAIN: &str = "https://bbw-chan.nl/";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadJson {
    #[serde(deserialize_with = "lenient_u64")]
    thread_id: u64,
    #[serde(default, deserialize_with = "non_empty")]
    subject: Option<String>,
    #[serde(flatten)]
    body: PostBodyJson,
    #[serde(default, deserialize_with = "lenient_bool")]
    pinned: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    locked: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    archived: bool,
    #[serde(default)]
    posts: Vec<ReplyJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyJson {
    #[serde(deserialize_with = "lenient_u64")]
    post_id: u64,
    #[serde(default, deserialize_with = "non_empty")]
    subject: Option<String>,
    #[serde(flatten)]
    body: PostBodyJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostBodyJson {
    #[serde(default, deserialize_with = "non_empty")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    id: Option<String>,
    /// Rendered HTML; `message` holds the raw text.
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    creation: Option<String>,
    #[serde(default)]
    files: Vec<FileJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileJson {
    path: String,
    #[serde(default)]
    thumb: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    original_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    width: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    height: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntryJson {
    #[serde(deserialize_with = "lenient_u64")]
    thread_id: u64,
    #[serde(default, deserialize_with = "non_empty")]
    subject: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    thumb: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    post_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    file_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    page: u32,
    #[serde(default)]
    last_bump: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pinned: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    locked: bool,
}

#[derive(Deserialize)]
struct BoardsResponseJson {
    data: BoardsDataJson,
}

#[derive(Deserialize)]
struct BoardsDataJson {
    boards: Vec<BoardJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardJson {
    board_uri: String,
    board_name: String,
    #[serde(default)]
    board_description: Option<String>,
    #[serde(default)]
    special_settings: Vec<String>,
}

/// Lynxchan timestamps are RFC 3339; unparseable ones become zero.
fn parse_timestamp(raw: Option<&str>) -> i64 {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|date| date.timestamp())
        .unwrap_or(0)
}

pub struct LynxchanReader {
    root: Url,
}

impl LynxchanReader {
    fn new(root: Url) -> Self {
        Self { root }
    }

    fn media_url(&self, path: &str) -> Option<String> {
        self.root.join(path).ok().map(String::from)
    }

    fn to_image(&self, file: FileJson) -> PostImage {
        let server_filename = file
            .path
            .rsplit('/')
            .next()
            .unwrap_or(file.path.as_str())
            .to_string();
        let extension = server_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        PostImage {
            server_filename,
            original_filename: file.original_name,
            extension,
            size: file.size,
            width: file.width,
            height: file.height,
            image_url: self.media_url(&file.path),
            thumbnail_url: file.thumb.as_deref().and_then(|thumb| self.media_url(thumb)),
            spoiler: false,
        }
    }

    fn fill_body(&self, builder: &mut PostBuilder, body: PostBodyJson) {
        builder.name = body.name;
        builder.poster_id = body.id;
        builder.comment = body.markdown.or(body.message).unwrap_or_default();
        builder.timestamp = parse_timestamp(body.creation.as_deref());
        builder.images = body.files.into_iter().map(|file| self.to_image(file)).collect();
    }

    fn read_pages(
        board: &ChanBoard,
        body: &[u8],
    ) -> Result<BoardPages> {
        let raw: Vec<CatalogEntryJson> = serde_json::from_slice(body)?;
        let per_page = board.threads_per_page.max(1) as usize;

        let mut pages: Vec<BoardPage> = Vec::new();
        for (index, entry) in raw.into_iter().enumerate() {
            let page_no = if entry.page > 0 {
                entry.page
            } else {
                (index / per_page) as u32 + 1
            };

            let pair = ThreadNoTimeModPair {
                thread: board.descriptor.thread(entry.thread_id),
                modified: parse_timestamp(entry.last_bump.as_deref()),
            };

            match pages.iter_mut().find(|page| page.current_page == page_no) {
                Some(page) => page.threads.push(pair),
                None => pages.push(BoardPage {
                    current_page: page_no,
                    total_pages: 0,
                    threads: vec![pair],
                }),
            }
        }

        pages.sort_by_key(|page| page.current_page);
        let total_pages = pages.last().map(|page| page.current_page).unwrap_or(0);
        for page in &mut pages {
            page.total_pages = total_pages;
        }

        Ok(BoardPages {
            board: board.descriptor.clone(),
            pages,
        })
    }
}

impl ChanReader for LynxchanReader {
    fn read_thread(&self, thread: &ThreadDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let raw: ThreadJson = serde_json::from_slice(body)?;
        let op_no = raw.thread_id;

        let mut op = PostBuilder::new(thread.board.clone(), op_no).as_op();
        op.subject = raw.subject;
        op.sticky = raw.pinned;
        op.closed = raw.locked;
        op.archived = raw.archived;
        op.total_replies = raw.posts.len() as u32;
        self.fill_body(&mut op, raw.body);

        let mut builders = Vec::with_capacity(raw.posts.len() + 1);
        let mut thread_images = op.images.len() as u32;
        for reply in raw.posts {
            let mut builder = PostBuilder::new(thread.board.clone(), reply.post_id).reply_to(op_no);
            builder.subject = reply.subject;
            self.fill_body(&mut builder, reply.body);
            thread_images += builder.images.len() as u32;
            builders.push(builder);
        }

        op.thread_images = thread_images;
        builders.insert(0, op);
        Ok(builders)
    }

    fn read_catalog(&self, board: &BoardDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let raw: Vec<CatalogEntryJson> = serde_json::from_slice(body)?;

        Ok(raw
            .into_iter()
            .map(|entry| {
                let mut builder = PostBuilder::new(board.clone(), entry.thread_id).as_op();
                builder.subject = entry.subject;
                builder.comment = entry.markdown.or(entry.message).unwrap_or_default();
                builder.total_replies = entry.post_count;
                builder.thread_images = entry.file_count;
                builder.sticky = entry.pinned;
                builder.closed = entry.locked;
                builder.last_modified = parse_timestamp(entry.last_bump.as_deref());
                if let Some(thumb) = entry.thumb {
                    let image_url = self.media_url(&thumb);
                    builder.images.push(PostImage {
                        server_filename: thumb.rsplit('/').next().unwrap_or("").to_string(),
                        thumbnail_url: image_url,
                        ..Default::default()
                    });
                }
                builder
            })
            .collect())
    }
}

pub struct LynxchanSite {
    pub(super) ctx: SiteContext,
    pub(super) reader: Arc<LynxchanReader>,
    root: Url,
}

impl LynxchanSite {
    pub fn bbwchan(ctx: SiteContext) -> Result<Self> {
        let domain = ctx
            .setting(SITE_DOMAIN_SETTING)
            .filter(|domain| !domain.trim().is_empty())
            .unwrap_or_else(|| BBWCHAN_DEFAULT_DOMAIN.to_string());

        let mut root = Url::parse(domain.trim())?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        Ok(Self {
            ctx,
            reader: Arc::new(LynxchanReader::new(root.clone())),
            root,
        })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn url(&self, path: &str) -> String {
        match self.root.join(path) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{}", self.root, path),
        }
    }
}

#[async_trait]
impl SiteActions for LynxchanSite {
    async fn boards(&self) -> JsonResponse<Vec<ChanBoard>> {
        let site = self.ctx.descriptor.clone();
        let url = self.url("boards.js?json=1");

        self.ctx
            .fetch_json(&url, move |body| {
                let raw: BoardsResponseJson = serde_json::from_slice(body)?;
                Ok(raw
                    .data
                    .boards
                    .into_iter()
                    .map(|board| {
                        let work_safe = board.special_settings.iter().any(|s| s == "sfw");
                        let mut chan_board = ChanBoard::new(site.board(board.board_uri), board.board_name);
                        chan_board.description = board.board_description;
                        chan_board.work_safe = work_safe;
                        chan_board
                    })
                    .collect())
            })
            .await
    }

    async fn pages(&self, board: &ChanBoard) -> JsonResponse<BoardPages> {
        let url = self.url(&format!("{}/catalog.json", board.code()));

        self.ctx
            .fetch_json(&url, |body| LynxchanReader::read_pages(board, body))
            .await
    }

    async fn thread(&self, thread: &ThreadDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = self.url(&format!("{}/res/{}.json", thread.board_code(), thread.thread_no));

        self.ctx
            .fetch_json(&url, |body| self.reader.read_thread(thread, body))
            .await
    }

    async fn catalog(&self, board: &BoardDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = self.url(&format!("{}/catalog.json", board.board_code));

        self.ctx
            .fetch_json(&url, |body| self.reader.read_catalog(board, body))
            .await
    }

    async fn search(&self, _board: &BoardDescriptor, _query: &str) -> JsonResponse<Vec<PostBuilder>> {
        JsonResponse::UnknownServerError(crate::app::ChanError::NotSupported(
            "search",
            BBWCHAN_NAME.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DescriptorInterner, SiteUserSettings};
    use crate::fetcher::mock::MockFetcher;
    use serde_json::Value;

    const THREAD: &str = r#"{
        "threadId": 77, "subject": "Welcome", "name": "Anon", "message": "raw",
        "markdown": "<p>hello</p>", "creation": "2021-03-01T12:00:00.000Z",
        "pinned": true, "locked": false,
        "files": [{"path": "/.media/abc.png", "thumb": "/.media/t_abc", "originalName": "pic.png",
                   "size": 100, "width": 10, "height": 20}],
        "posts": [
            {"postId": 78, "name": "Anon", "markdown": "&gt;&gt;77 reply",
             "creation": "2021-03-01T12:05:00.000Z", "files": []}
        ]
    }"#;

    const CATALOG: &str = r#"[
        {"threadId": 1, "subject": "a", "page": 1, "lastBump": "2021-03-01T12:00:00Z"},
        {"threadId": 2, "page": 1},
        {"threadId": 3, "page": 2, "thumb": "/.media/t_x"}
    ]"#;

    fn site_with(settings: SiteUserSettings, fetcher: Arc<MockFetcher>) -> LynxchanSite {
        let descriptor = DescriptorInterner::new().get_or_create(BBWCHAN_NAME);
        LynxchanSite::bbwchan(SiteContext::new(descriptor, fetcher, settings)).unwrap()
    }

    #[test]
    fn test_domain_override() {
        let default = site_with(SiteUserSettings::new(), Arc::new(MockFetcher::new()));
        assert_eq!(default.root().as_str(), "https://bbw-chan.nl/");

        let mut settings = SiteUserSettings::new();
        settings.insert(SITE_DOMAIN_SETTING.into(), Value::String("https://mirror.example".into()));
        let mirrored = site_with(settings, Arc::new(MockFetcher::new()));
        assert_eq!(mirrored.url("b/catalog.json"), "https://mirror.example/b/catalog.json");
    }

    #[test]
    fn test_read_thread() {
        let reader = LynxchanReader::new(Url::parse(BBWCHAN_DEFAULT_DOMAIN).unwrap());
        let board = DescriptorInterner::new().get_or_create(BBWCHAN_NAME).board("b");
        let builders = reader.read_thread(&board.thread(77), THREAD.as_bytes()).unwrap();

        assert_eq!(builders.len(), 2);
        let op = &builders[0];
        assert!(op.op);
        assert!(op.sticky);
        assert_eq!(op.comment, "<p>hello</p>");
        assert_eq!(op.timestamp, 1614600000);
        assert_eq!(op.thread_images, 1);
        assert_eq!(
            op.images[0].image_url.as_deref(),
            Some("https://bbw-chan.nl/.media/abc.png")
        );
        assert_eq!(op.images[0].extension.as_deref(), Some("png"));

        assert_eq!(builders[1].op_no, 77);
        assert_eq!(builders[1].post_no, 78);
    }

    #[tokio::test]
    async fn test_pages_from_catalog() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://bbw-chan.nl/b/catalog.json", CATALOG);
        let site = site_with(SiteUserSettings::new(), fetcher);
        let board = ChanBoard::new(site.ctx.descriptor.board("b"), "Random");

        let pages = site.pages(&board).await.into_result().unwrap();
        assert_eq!(pages.pages.len(), 2);
        assert_eq!(pages.find_page(2).unwrap().current_page, 1);
        assert!(pages.find_page(3).unwrap().is_on_last_page());
    }

    #[test]
    fn test_pages_fall_back_to_position() {
        let board = ChanBoard {
            threads_per_page: 2,
            ..ChanBoard::new(
                DescriptorInterner::new().get_or_create(BBWCHAN_NAME).board("b"),
                "Random",
            )
        };
        let body = br#"[{"threadId": 1}, {"threadId": 2}, {"threadId": 3}]"#;

        let pages = LynxchanReader::read_pages(&board, body).unwrap();
        assert_eq!(pages.find_page(3).unwrap().current_page, 2);
        assert_eq!(pages.find_page(1).unwrap().total_pages, 2);
    }

    #[test]
    fn test_read_catalog() {
        let reader = LynxchanReader::new(Url::parse(BBWCHAN_DEFAULT_DOMAIN).unwrap());
        let board = DescriptorInterner::new().get_or_create(BBWCHAN_NAME).board("b");
        let builders = reader.read_catalog(&board, CATALOG.as_bytes()).unwrap();

        assert_eq!(builders.len(), 3);
        assert!(builders.iter().all(|b| b.op));
        assert_eq!(builders[2].images.len(), 1);
    }
}
