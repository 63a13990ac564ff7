use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::app::Result;
use crate::domain::{BoardDescriptor, ChanFilter, FilterType, PostBuilder};
use crate::store::Store;

/// A filter with its pattern compiled, ready to be matched against posts.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub filter: ChanFilter,
    regex: Regex,
}

impl CompiledFilter {
    pub fn matches(&self, post: &PostBuilder, comment_text: &str) -> bool {
        let field = match self.filter.filter_type {
            FilterType::Subject => post.subject.as_deref(),
            FilterType::Comment => Some(comment_text),
            FilterType::Name => post.name.as_deref(),
            FilterType::Tripcode => post.tripcode.as_deref(),
        };

        field.map_or(false, |text| self.regex.is_match(text))
    }
}

/// Holds the user's filters and compiles their patterns on demand.
///
/// Patterns written as `/expr/flags` are regular expressions (`i` makes them
/// case-insensitive); anything else matches as a case-insensitive literal.
pub struct FilterEngine {
    store: Arc<dyn Store>,
    filters: RwLock<Vec<ChanFilter>>,
    compiled: Mutex<HashMap<String, Regex>>,
}

impl FilterEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            filters: RwLock::new(Vec::new()),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> Result<usize> {
        let filters = self.store.get_all_filters()?;
        let count = filters.len();
        *self.filters.write().unwrap_or_else(PoisonError::into_inner) = filters;
        Ok(count)
    }

    pub fn all_filters(&self) -> Vec<ChanFilter> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn enabled_filters(&self) -> Vec<ChanFilter> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|filter| filter.enabled)
            .cloned()
            .collect()
    }

    pub fn matches_board(filter: &ChanFilter, board: &BoardDescriptor) -> bool {
        if filter.all_boards {
            return true;
        }

        filter.boards.iter().any(|entry| {
            entry
                .split_once('/')
                .map_or(false, |(site, code)| {
                    site.eq_ignore_ascii_case(board.site_name())
                        && code.trim_matches('/').eq_ignore_ascii_case(&board.board_code)
                })
        })
    }

    /// Validates the pattern, persists the filter and returns it with its id.
    pub fn add_filter(&self, mut filter: ChanFilter) -> Result<ChanFilter> {
        self.compile(&filter.pattern)?;
        filter.id = self.store.add_filter(&filter)?;

        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filter.clone());

        Ok(filter)
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.store.set_filter_enabled(id, enabled)?;

        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(filter) = filters.iter_mut().find(|filter| filter.id == id) {
            filter.enabled = enabled;
        }
        Ok(())
    }

    pub fn remove_filter(&self, id: i64) -> Result<()> {
        self.store.delete_filter(id)?;
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|filter| filter.id != id);
        Ok(())
    }

    /// Enabled filters that apply to `board`, compiled. Filters with broken
    /// patterns are skipped.
    pub fn compiled_for_board(&self, board: &BoardDescriptor) -> Vec<CompiledFilter> {
        self.enabled_filters()
            .into_iter()
            .filter(|filter| Self::matches_board(filter, board))
            .filter_map(|filter| match self.compile(&filter.pattern) {
                Ok(regex) => Some(CompiledFilter { filter, regex }),
                Err(e) => {
                    warn!("Skipping filter {}: {}", filter.id, e);
                    None
                }
            })
            .collect()
    }

    pub fn compile(&self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self
            .compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return Ok(regex.clone());
        }

        let regex = Self::build_regex(pattern)?;
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());

        Ok(regex)
    }

    fn build_regex(pattern: &str) -> Result<Regex> {
        let trimmed = pattern.trim();

        if let Some(rest) = trimmed.strip_prefix('/') {
            if let Some((expr, flags)) = rest.rsplit_once('/') {
                let regex = RegexBuilder::new(expr)
                    .case_insensitive(flags.contains('i'))
                    .build()?;
                return Ok(regex);
            }
        }

        let regex = RegexBuilder::new(&regex::escape(trimmed))
            .case_insensitive(true)
            .build()?;
        Ok(regex)
    }
}
