use serde::Serialize;
use std::time::Instant;

use crate::error::{FlowdexError, Result};
use crate::store::{IndexStore, WorkflowFilters, WorkflowSummary};

/// Filter value that disables the trigger / complexity filters
pub const ALL: &str = "all";

/// Filtered, paginated search request.
///
/// Built with chained setters:
///
/// ```
/// use flowdex::search::SearchQuery;
///
/// let query = SearchQuery::new()
///     .text("slack alert")
///     .trigger("Webhook")
///     .exclude_legacy(true)
///     .page(2, 20);
/// assert_eq!(query.offset, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub text: String,
    pub trigger: String,
    pub complexity: String,
    pub active_only: bool,
    pub exclude_legacy: bool,
    pub folder: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            trigger: ALL.to_string(),
            complexity: ALL.to_string(),
            active_only: false,
            exclude_legacy: false,
            folder: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    pub fn complexity(mut self, complexity: impl Into<String>) -> Self {
        self.complexity = complexity.into();
        self
    }

    pub fn active_only(mut self, active_only: bool) -> Self {
        self.active_only = active_only;
        self
    }

    pub fn exclude_legacy(mut self, exclude_legacy: bool) -> Self {
        self.exclude_legacy = exclude_legacy;
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// 1-based page number; page 0 is treated as page 1
    pub fn page(self, page: usize, per_page: usize) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit(per_page).offset(offset)
    }

    /// Store-level filters for this query
    pub fn filters(&self) -> WorkflowFilters {
        WorkflowFilters {
            text_tokens: self.text.to_lowercase().split_whitespace().map(str::to_string).collect(),
            trigger_type: enum_filter(&self.trigger),
            complexity: enum_filter(&self.complexity),
            active_only: self.active_only,
            exclude_legacy: self.exclude_legacy,
            folder: self
                .folder
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case(ALL))
                .map(str::to_string),
        }
    }
}

/// Only the exact value `all` disables the filter; anything else must match
/// a stored name exactly.
fn enum_filter(value: &str) -> Option<String> {
    (value != ALL).then(|| value.to_string())
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub workflows: Vec<WorkflowSummary>,
    /// Size of the whole filtered set
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl SearchPage {
    /// Number of pages of `limit` rows needed for `total`
    pub fn pages(&self) -> usize {
        if self.limit == 0 {
            0
        } else {
            self.total / self.limit + usize::from(self.total % self.limit != 0)
        }
    }

    /// 1-based page this result starts on
    pub fn page(&self) -> usize {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }
}

/// Run a filtered, paginated search over the index.
///
/// Results are ordered by filename so pagination is stable across calls.
pub async fn search_workflows(store: &IndexStore, query: &SearchQuery) -> Result<SearchPage> {
    if query.limit == 0 {
        return Err(FlowdexError::InvalidInput("limit must be greater than 0".to_string()));
    }

    let start = Instant::now();
    let filters = query.filters();
    let (workflows, total) = store.query(&filters, query.limit, query.offset).await?;

    log::debug!(
        "Search {:?} returned {}/{} rows in {:?}",
        query.text,
        workflows.len(),
        total,
        start.elapsed()
    );

    Ok(SearchPage {
        workflows,
        total,
        limit: query.limit,
        offset: query.offset,
    })
}
