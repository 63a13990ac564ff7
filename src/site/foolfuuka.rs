use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::app::{ChanError, Result};
use crate::domain::{
    ArchiveType, BoardDescriptor, BoardPages, ChanBoard, PostBuilder, PostImage, ThreadDescriptor,
};
use crate::site::json::{lenient_bool, lenient_u32, lenient_u64, non_empty};
use crate::site::{ChanReader, JsonResponse, SiteActions, SiteContext};

pub const ARCHIVE_OF_SINS_NAME: &str = "archiveofsins.com";

const ARCHIVE_OF_SINS_BOARDS: [&str; 10] = ["h", "hc", "hm", "i", "lgbt", "r", "s", "soc", "t", "u"];

#[derive(Deserialize)]
struct ThreadEntryJson {
    op: Option<PostJson>,
    #[serde(default)]
    posts: Option<PostsJson>,
}

/// Thread pages key replies by post number, index pages list them.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostsJson {
    Keyed(BTreeMap<String, PostJson>),
    Listed(Vec<PostJson>),
}

impl PostsJson {
    fn into_vec(self) -> Vec<PostJson> {
        match self {
            PostsJson::Keyed(map) => map.into_values().collect(),
            PostsJson::Listed(list) => list,
        }
    }
}

#[derive(Deserialize)]
struct SearchJson {
    #[serde(default)]
    posts: Vec<PostJson>,
}

#[derive(Deserialize)]
struct PostJson {
    #[serde(deserialize_with = "lenient_u64")]
    num: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    thread_num: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    op: bool,
    #[serde(default)]
    timestamp: i64,
    #[serde(default, deserialize_with = "non_empty")]
    title: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    trip: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    poster_hash: Option<String>,
    #[serde(default)]
    comment_processed: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    sticky: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    locked: bool,
    #[serde(default)]
    media: Option<MediaJson>,
    #[serde(default)]
    board: Option<BoardRefJson>,
}

#[derive(Deserialize)]
struct BoardRefJson {
    shortname: String,
}

#[derive(Deserialize)]
struct MediaJson {
    #[serde(default, deserialize_with = "non_empty")]
    media_orig: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    media_filename: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    media_link: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    remote_media_link: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    thumb_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    media_size: u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    media_w: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    media_h: u32,
    #[serde(default, deserialize_with = "lenient_bool")]
    spoiler: bool,
}

impl MediaJson {
    fn into_image(self) -> Option<PostImage> {
        let server_filename = self.media_orig?;
        let extension = server_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        Some(PostImage {
            server_filename,
            original_filename: self.media_filename,
            extension,
            size: self.media_size,
            width: self.media_w,
            height: self.media_h,
            image_url: self.media_link.or(self.remote_media_link),
            thumbnail_url: self.thumb_link,
            spoiler: self.spoiler,
        })
    }
}

#[derive(Default)]
pub struct FoolFuukaReader;

impl FoolFuukaReader {
    fn to_builder(board: &BoardDescriptor, post: PostJson) -> PostBuilder {
        let op = post.op || post.num == post.thread_num;
        let board = match &post.board {
            Some(reference) if reference.shortname != board.board_code => {
                board.site.board(reference.shortname.clone())
            }
            _ => board.clone(),
        };

        let mut builder = PostBuilder::new(board, post.num);
        builder.op = op;
        builder.op_no = if op { post.num } else { post.thread_num };
        builder.subject = post.title;
        builder.name = post.name;
        builder.tripcode = post.trip;
        builder.poster_id = post.poster_hash;
        builder.comment = post.comment_processed.or(post.comment).unwrap_or_default();
        builder.timestamp = post.timestamp;
        builder.sticky = post.sticky;
        builder.closed = post.locked;
        // Everything served by an archive is archived.
        builder.archived = true;
        builder.images = post.media.and_then(MediaJson::into_image).into_iter().collect();
        builder
    }

    fn read_entries(
        board: &BoardDescriptor,
        body: &[u8],
        include_replies: bool,
    ) -> Result<Vec<PostBuilder>> {
        let raw: BTreeMap<String, ThreadEntryJson> = serde_json::from_slice(body)?;
        let mut builders = Vec::new();

        for (_, entry) in raw {
            if let Some(op) = entry.op {
                builders.push(Self::to_builder(board, op));
            }
            if include_replies {
                let replies = entry.posts.map(PostsJson::into_vec).unwrap_or_default();
                builders.extend(replies.into_iter().map(|post| Self::to_builder(board, post)));
            }
        }

        Ok(builders)
    }

    fn read_search(board: &BoardDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let raw: BTreeMap<String, SearchJson> = serde_json::from_slice(body)?;
        Ok(raw
            .into_values()
            .flat_map(|page| page.posts)
            .map(|post| Self::to_builder(board, post))
            .collect())
    }
}

impl ChanReader for FoolFuukaReader {
    fn read_thread(&self, thread: &ThreadDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        let mut builders = Self::read_entries(&thread.board, body, true)?;
        builders.retain(|builder| builder.op_no == thread.thread_no);
        builders.sort_by_key(|builder| builder.post_no);
        Ok(builders)
    }

    fn read_catalog(&self, board: &BoardDescriptor, body: &[u8]) -> Result<Vec<PostBuilder>> {
        Self::read_entries(board, body, false)
    }
}

/// A FoolFuuka archive mirrored as a read-only site.
pub struct FoolFuukaSite {
    pub(super) ctx: SiteContext,
    pub(super) reader: Arc<FoolFuukaReader>,
    root: Url,
    boards: &'static [&'static str],
}

impl FoolFuukaSite {
    pub fn archive_of_sins(ctx: SiteContext) -> Result<Self> {
        let root = Url::parse(&format!("https://{}/", ArchiveType::ArchiveOfSins.domain()))?;

        Ok(Self {
            ctx,
            reader: Arc::new(FoolFuukaReader),
            root,
            boards: &ARCHIVE_OF_SINS_BOARDS,
        })
    }

    fn api_url(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.root.join(&format!("_/api/chan/{}/", endpoint))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    fn thread_url(&self, thread: &ThreadDescriptor) -> Result<Url> {
        let num = thread.thread_no.to_string();
        self.api_url("thread", &[("board", thread.board_code()), ("num", num.as_str())])
    }
}

#[async_trait]
impl SiteActions for FoolFuukaSite {
    async fn boards(&self) -> JsonResponse<Vec<ChanBoard>> {
        let boards = self
            .boards
            .iter()
            .map(|code| ChanBoard::new(self.ctx.descriptor.board(*code), *code))
            .collect();

        JsonResponse::Success(boards)
    }

    async fn pages(&self, board: &ChanBoard) -> JsonResponse<BoardPages> {
        JsonResponse::UnknownServerError(ChanError::NotSupported(
            "pages",
            format!("{} on {}", board.descriptor, ARCHIVE_OF_SINS_NAME),
        ))
    }

    async fn thread(&self, thread: &ThreadDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = match self.thread_url(thread) {
            Ok(url) => url,
            Err(e) => return JsonResponse::UnknownServerError(e),
        };

        self.ctx
            .fetch_json(url.as_str(), |body| self.reader.read_thread(thread, body))
            .await
    }

    async fn catalog(&self, board: &BoardDescriptor) -> JsonResponse<Vec<PostBuilder>> {
        let url = match self.api_url("index", &[("board", board.board_code.as_str()), ("page", "1")]) {
            Ok(url) => url,
            Err(e) => return JsonResponse::UnknownServerError(e),
        };

        self.ctx
            .fetch_json(url.as_str(), |body| self.reader.read_catalog(board, body))
            .await
    }

    async fn search(&self, board: &BoardDescriptor, query: &str) -> JsonResponse<Vec<PostBuilder>> {
        let url = match self.api_url("search", &[("boards", board.board_code.as_str()), ("text", query)]) {
            Ok(url) => url,
            Err(e) => return JsonResponse::UnknownServerError(e),
        };

        self.ctx
            .fetch_json(url.as_str(), |body| FoolFuukaReader::read_search(board, body))
            .await
    }
}
