use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chanwatch::app::AppContext;
use chanwatch::cli::{commands, BookmarkCommand, Cli, Commands, FilterCommand};
use chanwatch::config::Config;
use chanwatch::daemon::{self, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Commands::Watch {
        interval: Some(interval),
    } = &cli.command
    {
        let secs = daemon::parse_interval(interval).map_err(anyhow::Error::msg)?;
        config.watcher.foreground_interval_ms = secs * 1000;
    }

    let ctx = Arc::new(AppContext::new(config, cli.db.clone())?);
    ctx.initialize().await?;

    match cli.command {
        Commands::Sites => commands::list_sites(&ctx)?,
        Commands::Activate { site } => commands::set_site_active(&ctx, &site, true)?,
        Commands::Deactivate { site } => commands::set_site_active(&ctx, &site, false)?,
        Commands::Move { site, from, to } => commands::move_site(&ctx, &site, from, to)?,
        Commands::Boards { site, refresh } => commands::list_boards(&ctx, &site, refresh).await?,
        Commands::Archives { site, board } => commands::list_archives(&ctx, &site, &board).await?,
        Commands::Thread {
            site,
            board,
            no,
            limit,
        } => commands::show_thread(&ctx, &site, &board, no, limit).await?,
        Commands::Page { site, board, no } => commands::show_page(&ctx, &site, &board, no).await?,
        Commands::Bookmark { action } => match action {
            BookmarkCommand::Add {
                site,
                board,
                no,
                title,
            } => commands::add_bookmark(&ctx, &site, &board, no, title)?,
            BookmarkCommand::Remove { site, board, no } => {
                commands::remove_bookmark(&ctx, &site, &board, no)?
            }
            BookmarkCommand::Toggle { site, board, no } => {
                commands::toggle_bookmark(&ctx, &site, &board, no)?
            }
            BookmarkCommand::List => commands::list_bookmarks(&ctx)?,
        },
        Commands::Filter { action } => match action {
            FilterCommand::Add {
                pattern,
                field,
                action,
                board,
            } => commands::add_filter(&ctx, &pattern, field, action, board)?,
            FilterCommand::List => commands::list_filters(&ctx)?,
            FilterCommand::Enable { id } => commands::set_filter_enabled(&ctx, id, true)?,
            FilterCommand::Disable { id } => commands::set_filter_enabled(&ctx, id, false)?,
            FilterCommand::Remove { id } => commands::remove_filter(&ctx, id)?,
        },
        Commands::Watch { .. } => {
            Daemon::new(ctx.clone()).run().await?;
            return Ok(());
        }
    }

    ctx.flush()?;
    Ok(())
}
