use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::app::{AppContext, ChanError, Result};
use crate::domain::{BoardDescriptor, ChanFilter, FilterAction, FilterType, Post, ThreadDescriptor};
use crate::site::{AuthState, JsonResponse, Site};

fn site(ctx: &AppContext, name: &str) -> Result<Arc<Site>> {
    ctx.site_manager.find_by_name(name)
}

fn board(ctx: &AppContext, site_name: &str, board_code: &str) -> Result<BoardDescriptor> {
    Ok(site(ctx, site_name)?.descriptor().board(board_code))
}

fn thread(ctx: &AppContext, site_name: &str, board_code: &str, no: u64) -> Result<ThreadDescriptor> {
    Ok(board(ctx, site_name, board_code)?.thread(no))
}

pub fn list_sites(ctx: &AppContext) -> Result<()> {
    for data in ctx.site_manager.site_data_ordered()? {
        let auth = match ctx.site_manager.by_site_descriptor(&data.site)? {
            Some(site) if site.auth_state() == AuthState::LoggedIn => "logged in",
            Some(_) => "",
            None => "unavailable",
        };
        let state = if data.active { "active" } else { "inactive" };

        println!("{:>2}. {:<24} {:<8} {}", data.order, data.site, state, auth);
    }

    Ok(())
}

pub fn set_site_active(ctx: &AppContext, name: &str, active: bool) -> Result<()> {
    let site = site(ctx, name)?;
    let changed = ctx.site_manager.activate(site.descriptor(), active)?;

    match (changed, active) {
        (false, _) => println!("{} unchanged", site.name()),
        (true, true) => println!("Activated {}", site.name()),
        (true, false) => println!("Deactivated {}", site.name()),
    }
    Ok(())
}

pub fn move_site(ctx: &AppContext, name: &str, from: usize, to: usize) -> Result<()> {
    let site = site(ctx, name)?;

    if ctx.site_manager.move_site(site.descriptor(), from, to)? {
        println!("Moved {} to position {}", site.name(), to);
    } else {
        println!("{} is not at position {}", site.name(), from);
    }
    Ok(())
}

pub async fn list_boards(ctx: &AppContext, name: &str, refresh: bool) -> Result<()> {
    let site = site(ctx, name)?;
    let descriptor = site.descriptor().clone();

    if refresh || ctx.board_manager.boards_for_site(&descriptor).is_empty() {
        match site.actions().boards().await {
            JsonResponse::Success(boards) => {
                let saved = ctx.board_manager.save_boards(&descriptor, boards)?;
                println!("Fetched {} boards", saved);
            }
            other => {
                if let Err(e) = other.into_result() {
                    eprintln!("Could not fetch boards of {}: {}", site.name(), e);
                }
            }
        }
    }

    let boards = ctx.board_manager.boards_for_site(&descriptor);
    if boards.is_empty() {
        println!("No boards");
        return Ok(());
    }

    for board in boards {
        let marker = if board.active { " " } else { "-" };
        println!("{} /{}/ {}", marker, board.code(), board.name);
    }
    Ok(())
}

pub async fn list_archives(ctx: &AppContext, site_name: &str, board_code: &str) -> Result<()> {
    let board = board(ctx, site_name, board_code)?;
    let archives = ctx.archives_manager.by_board(&board).await?;

    if archives.is_empty() {
        println!("No archives for {}", board);
        return Ok(());
    }

    for archive in archives {
        let state = if archive.is_enabled() { "" } else { " (disabled)" };
        println!("{} ({}){}", archive.name, archive.domain, state);
    }
    Ok(())
}

fn format_post(post: &Post) -> String {
    let date = Utc
        .timestamp_opt(post.timestamp, 0)
        .single()
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let name = post.name.as_deref().unwrap_or("Anonymous");

    let mut header = format!("No.{} {} {}", post.post_no(), name, date);
    if let Some(subject) = &post.subject {
        header = format!("{} | {}", subject, header);
    }
    if post.filter_highlighted {
        header.insert_str(0, "* ");
    }

    let mut out = header;
    for image in &post.images {
        out.push_str(&format!(
            "\n  [{}{}]",
            image.original_filename.as_deref().unwrap_or(&image.server_filename),
            image.extension.as_deref().unwrap_or_default()
        ));
    }
    if !post.comment.is_empty() {
        out.push('\n');
        out.push_str(&post.comment);
    }
    out
}

pub async fn show_thread(
    ctx: &AppContext,
    site_name: &str,
    board_code: &str,
    no: u64,
    limit: Option<usize>,
) -> Result<()> {
    let thread = thread(ctx, site_name, board_code, no)?;

    let posts = match ctx.thread_loader.load_thread(&thread).await {
        Ok(posts) => posts,
        Err(ChanError::ServerError(404)) => {
            println!("{} is gone", thread);
            for archive in ctx.archives_manager.archives_for_thread(&thread).await? {
                let link = ctx
                    .archives_manager
                    .request_link_for_thread(&thread, &archive)
                    .await?;
                println!("  try {}: {}", archive.name, link);
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let shown = limit.unwrap_or(posts.len());
    for post in posts.iter().filter(|post| !post.filter_hidden).take(shown) {
        println!("{}\n", format_post(post));
    }
    println!("{} posts", posts.len());
    Ok(())
}

pub async fn show_page(ctx: &AppContext, site_name: &str, board_code: &str, no: u64) -> Result<()> {
    let thread = thread(ctx, site_name, board_code, no)?;
    let mut updates = ctx.page_request_manager.listen_for_pages_updates();

    let page = match ctx.page_request_manager.get_page(&thread) {
        Some(page) => Some(page),
        None => {
            let timeout = Duration::from_secs(ctx.config.http.timeout_secs);
            if tokio::time::timeout(timeout, updates.changed()).await.is_err() {
                eprintln!("Timed out waiting for the pages of {}", thread.board);
            }
            ctx.page_request_manager.get_page(&thread)
        }
    };

    match page {
        Some(page) => {
            let last = if page.is_on_last_page() { " (last page)" } else { "" };
            println!(
                "{} is on page {}/{}{}",
                thread, page.current_page, page.total_pages, last
            );
        }
        None => println!("{} is not on any page", thread),
    }
    Ok(())
}

pub fn add_bookmark(
    ctx: &AppContext,
    site_name: &str,
    board_code: &str,
    no: u64,
    title: Option<String>,
) -> Result<()> {
    let thread = thread(ctx, site_name, board_code, no)?;

    if ctx.bookmarks_manager.add_bookmark(&thread, title) {
        ctx.bookmarks_manager.flush()?;
        println!("Bookmarked {}", thread);
    } else {
        println!("Already bookmarked: {}", thread);
    }
    Ok(())
}

pub fn remove_bookmark(ctx: &AppContext, site_name: &str, board_code: &str, no: u64) -> Result<()> {
    let thread = thread(ctx, site_name, board_code, no)?;
    ctx.bookmarks_manager.remove_bookmark(&thread)?;
    println!("Removed bookmark {}", thread);
    Ok(())
}

pub fn toggle_bookmark(ctx: &AppContext, site_name: &str, board_code: &str, no: u64) -> Result<()> {
    let thread = thread(ctx, site_name, board_code, no)?;
    let watching = ctx.bookmarks_manager.toggle_watching(&thread)?;
    ctx.bookmarks_manager.flush()?;

    let state = if watching { "Watching" } else { "Paused" };
    println!("{} {}", state, thread);
    Ok(())
}

pub fn list_bookmarks(ctx: &AppContext) -> Result<()> {
    let bookmarks = ctx.bookmarks_manager.all_bookmarks();

    if bookmarks.is_empty() {
        println!("No bookmarks");
        return Ok(());
    }

    for bookmark in bookmarks {
        let status = if bookmark.deleted {
            "deleted"
        } else if bookmark.archived {
            "archived"
        } else if bookmark.closed {
            "closed"
        } else if !bookmark.watching {
            "paused"
        } else {
            ""
        };

        println!(
            "{} ({} posts, {} new) {}\n  {}",
            bookmark.display_title(),
            bookmark.total_posts_count,
            bookmark.new_posts_count,
            status,
            bookmark.thread
        );
    }
    Ok(())
}

pub fn add_filter(
    ctx: &AppContext,
    pattern: &str,
    field: FilterType,
    action: FilterAction,
    boards: Vec<String>,
) -> Result<()> {
    let mut filter = ChanFilter::new(pattern, field, action);
    if !boards.is_empty() {
        filter.all_boards = false;
        filter.boards = boards;
    }

    let filter = ctx.filter_engine.add_filter(filter)?;
    println!("Added filter #{}", filter.id);
    Ok(())
}

pub fn list_filters(ctx: &AppContext) -> Result<()> {
    let filters = ctx.filter_engine.all_filters();

    if filters.is_empty() {
        println!("No filters");
        return Ok(());
    }

    for filter in filters {
        let scope = if filter.all_boards {
            "all boards".to_string()
        } else {
            filter.boards.join(", ")
        };
        let marker = if filter.enabled { " " } else { "-" };

        println!(
            "{} #{} {} {} \"{}\" ({})",
            marker, filter.id, filter.action, filter.filter_type, filter.pattern, scope
        );
    }
    Ok(())
}

pub fn set_filter_enabled(ctx: &AppContext, id: i64, enabled: bool) -> Result<()> {
    ctx.filter_engine.set_enabled(id, enabled)?;
    println!("Filter #{} {}", id, if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub fn remove_filter(ctx: &AppContext, id: i64) -> Result<()> {
    ctx.filter_engine.remove_filter(id)?;
    println!("Removed filter #{}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PostImage;

    fn post() -> Post {
        let thread = crate::domain::DescriptorInterner::new()
            .get_or_create("4chan")
            .board("g")
            .thread(1);

        Post {
            descriptor: thread.post(1),
            op: true,
            subject: Some("Desktop thread".into()),
            name: None,
            tripcode: None,
            poster_id: None,
            comment: "post your desktops".into(),
            timestamp: 1_600_000_000,
            images: vec![PostImage {
                server_filename: "1600000000000".into(),
                original_filename: Some("desk".into()),
                extension: Some(".png".into()),
                ..Default::default()
            }],
            sticky: false,
            closed: false,
            archived: false,
            total_replies: 0,
            thread_images: 0,
            last_modified: 0,
            replies_to: Default::default(),
            cross_thread_links: Vec::new(),
            filter_hidden: false,
            filter_highlighted: true,
        }
    }

    #[test]
    fn test_format_post() {
        let formatted = format_post(&post());
        let lines: Vec<&str> = formatted.lines().collect();

        assert_eq!(
            lines,
            vec![
                "* Desktop thread | No.1 Anonymous 2020-09-13 12:26",
                "  [desk.png]",
                "post your desktops",
            ]
        );
    }
}
