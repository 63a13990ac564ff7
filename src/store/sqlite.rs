use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{ChanError, Result};
use crate::domain::{
    ChanBoard, ChanFilter, ChanSiteData, DescriptorInterner, SiteDescriptor, SiteUserSettings,
    ThreadBookmark, ThreadDescriptor,
};
use crate::store::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| ChanError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            ChanError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn parse_settings(raw: &str) -> SiteUserSettings {
        match serde_json::from_str(raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Discarding unreadable site settings: {}", e);
                SiteUserSettings::new()
            }
        }
    }

    fn write_site(conn: &Connection, site: &ChanSiteData) -> Result<()> {
        let settings = serde_json::to_string(&site.user_settings)?;
        conn.execute(
            "INSERT INTO sites (name, site_order, active, user_settings) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                site_order = excluded.site_order,
                active = excluded.active,
                user_settings = excluded.user_settings",
            params![site.site.site_name(), site.order as i64, site.active, settings],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn initialize_sites(&self, sites: &[SiteDescriptor]) -> Result<Vec<ChanSiteData>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut records = Vec::with_capacity(sites.len());
        let mut next_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(site_order) + 1, 0) FROM sites",
            [],
            |row| row.get(0),
        )?;

        for descriptor in sites {
            let existing = tx
                .query_row(
                    "SELECT site_order, active, user_settings FROM sites WHERE name = ?1",
                    params![descriptor.site_name()],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, bool>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            let record = match existing {
                Some((order, active, settings)) => ChanSiteData {
                    site: descriptor.clone(),
                    order: order.max(0) as usize,
                    active,
                    user_settings: Self::parse_settings(&settings),
                },
                None => {
                    let mut record = ChanSiteData::new(descriptor.clone(), next_order as usize);
                    record.active = descriptor.is_4chan();
                    next_order += 1;
                    Self::write_site(&tx, &record)?;
                    tracing::info!("Registered new site {}", descriptor);
                    record
                }
            };

            records.push(record);
        }

        tx.commit()?;
        records.sort_by_key(|record| record.order);
        Ok(records)
    }

    fn persist_site(&self, site: &ChanSiteData) -> Result<()> {
        let conn = self.lock()?;
        Self::write_site(&conn, site)
    }

    fn persist_sites(&self, sites: &[ChanSiteData]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for site in sites {
            Self::write_site(&tx, site)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_boards(&self, site: &SiteDescriptor) -> Result<Vec<ChanBoard>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT board_code, name, description, active, work_safe, page_count, threads_per_page, bump_limit
             FROM boards WHERE site_name = ?1 ORDER BY board_code",
        )?;

        let boards = stmt
            .query_map(params![site.site_name()], |row| {
                Ok(ChanBoard {
                    descriptor: site.board(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    active: row.get(3)?,
                    work_safe: row.get(4)?,
                    page_count: row.get(5)?,
                    threads_per_page: row.get(6)?,
                    bump_limit: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(boards)
    }

    fn upsert_boards(&self, boards: &[ChanBoard]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut count = 0;

        for board in boards {
            count += tx.execute(
                "INSERT INTO boards (site_name, board_code, name, description, active, work_safe, page_count, threads_per_page, bump_limit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(site_name, board_code) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    work_safe = excluded.work_safe,
                    page_count = excluded.page_count,
                    threads_per_page = excluded.threads_per_page,
                    bump_limit = excluded.bump_limit",
                params![
                    board.descriptor.site_name(),
                    board.code(),
                    board.name,
                    board.description,
                    board.active,
                    board.work_safe,
                    board.page_count,
                    board.threads_per_page,
                    board.bump_limit
                ],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_all_bookmarks(&self, interner: &DescriptorInterner) -> Result<Vec<ThreadBookmark>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT site_name, board_code, thread_no, title, watching, seen_posts_count, total_posts_count,
                    last_viewed_post_no, new_posts_count, archived, closed, deleted, last_updated
             FROM bookmarks ORDER BY created_at, thread_no",
        )?;

        let bookmarks = stmt
            .query_map([], |row| {
                let site = interner.get_or_create(&row.get::<_, String>(0)?);
                let thread = site
                    .board(row.get::<_, String>(1)?)
                    .thread(row.get::<_, i64>(2)? as u64);

                Ok(ThreadBookmark {
                    thread,
                    title: row.get(3)?,
                    watching: row.get(4)?,
                    seen_posts_count: row.get(5)?,
                    total_posts_count: row.get(6)?,
                    last_viewed_post_no: row.get::<_, i64>(7)? as u64,
                    new_posts_count: row.get(8)?,
                    archived: row.get(9)?,
                    closed: row.get(10)?,
                    deleted: row.get(11)?,
                    last_updated: row
                        .get::<_, Option<String>>(12)?
                        .and_then(|s| Self::parse_datetime(&s)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(bookmarks)
    }

    fn upsert_bookmarks(&self, bookmarks: &[ThreadBookmark]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for bookmark in bookmarks {
            tx.execute(
                "INSERT INTO bookmarks (site_name, board_code, thread_no, title, watching, seen_posts_count,
                    total_posts_count, last_viewed_post_no, new_posts_count, archived, closed, deleted,
                    last_updated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(site_name, board_code, thread_no) DO UPDATE SET
                    title = excluded.title,
                    watching = excluded.watching,
                    seen_posts_count = excluded.seen_posts_count,
                    total_posts_count = excluded.total_posts_count,
                    last_viewed_post_no = excluded.last_viewed_post_no,
                    new_posts_count = excluded.new_posts_count,
                    archived = excluded.archived,
                    closed = excluded.closed,
                    deleted = excluded.deleted,
                    last_updated = excluded.last_updated",
                params![
                    bookmark.thread.site().site_name(),
                    bookmark.thread.board_code(),
                    bookmark.thread.thread_no as i64,
                    bookmark.title,
                    bookmark.watching,
                    bookmark.seen_posts_count,
                    bookmark.total_posts_count,
                    bookmark.last_viewed_post_no as i64,
                    bookmark.new_posts_count,
                    bookmark.archived,
                    bookmark.closed,
                    bookmark.deleted,
                    bookmark.last_updated.map(|dt| dt.to_rfc3339()),
                    now
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_bookmark(&self, thread: &ThreadDescriptor) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM bookmarks WHERE site_name = ?1 AND board_code = ?2 AND thread_no = ?3",
            params![
                thread.site().site_name(),
                thread.board_code(),
                thread.thread_no as i64
            ],
        )?;
        Ok(deleted > 0)
    }

    fn get_all_filters(&self) -> Result<Vec<ChanFilter>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, enabled, pattern, filter_type, action, all_boards, boards FROM filters ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, enabled, pattern, filter_type, action, all_boards, boards)| {
                    Ok(ChanFilter {
                        id,
                        enabled,
                        pattern,
                        filter_type: filter_type.parse()?,
                        action: action.parse()?,
                        all_boards,
                        boards: boards
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect(),
                    })
                },
            )
            .collect()
    }

    fn add_filter(&self, filter: &ChanFilter) -> Result<i64> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO filters (enabled, pattern, filter_type, action, all_boards, boards)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                filter.enabled,
                filter.pattern,
                filter.filter_type.as_str(),
                filter.action.as_str(),
                filter.all_boards,
                filter.boards.join(",")
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn set_filter_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE filters SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(())
    }

    fn delete_filter(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM filters WHERE id = ?1", params![id])?;
        Ok(())
    }
}
