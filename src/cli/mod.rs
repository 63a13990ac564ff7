pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{FilterAction, FilterType};

#[derive(Parser)]
#[command(name = "chanwatch")]
#[command(about = "Browse and watch imageboard threads from the terminal", long_about = None)]
pub struct Cli {
    /// Database file (default: data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (default: ~/.config/chanwatch/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List sites in their configured order
    Sites,
    /// Activate a site
    Activate { site: String },
    /// Deactivate a site
    Deactivate { site: String },
    /// Move a site from one position to another
    Move { site: String, from: usize, to: usize },
    /// List boards of a site
    Boards {
        site: String,
        /// Fetch the board list from the site
        #[arg(long)]
        refresh: bool,
    },
    /// List archives mirroring a board
    Archives { site: String, board: String },
    /// Show the posts of a thread
    Thread {
        site: String,
        board: String,
        no: u64,
        /// Print at most this many posts
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show which board page a thread is on
    Page { site: String, board: String, no: u64 },
    /// Manage bookmarked threads
    Bookmark {
        #[command(subcommand)]
        action: BookmarkCommand,
    },
    /// Manage post filters
    Filter {
        #[command(subcommand)]
        action: FilterCommand,
    },
    /// Watch bookmarked threads until interrupted
    Watch {
        /// Base update interval (e.g., "30s", "1m")
        #[arg(short, long)]
        interval: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BookmarkCommand {
    /// Bookmark a thread
    Add {
        site: String,
        board: String,
        no: u64,
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a bookmark
    Remove { site: String, board: String, no: u64 },
    /// Pause or resume watching a bookmark
    Toggle { site: String, board: String, no: u64 },
    /// List bookmarks
    List,
}

#[derive(Subcommand)]
pub enum FilterCommand {
    /// Add a filter; `/expr/i` patterns are regular expressions
    Add {
        pattern: String,
        /// Post field to match (subject, comment, name, tripcode)
        #[arg(long, default_value = "comment")]
        field: FilterType,
        /// What to do with matches (hide, remove, highlight)
        #[arg(long, default_value = "hide")]
        action: FilterAction,
        /// Limit to `site/board`; may be repeated
        #[arg(long)]
        board: Vec<String>,
    },
    /// List filters
    List,
    /// Enable a filter
    Enable { id: i64 },
    /// Disable a filter
    Disable { id: i64 },
    /// Remove a filter
    Remove { id: i64 },
}
