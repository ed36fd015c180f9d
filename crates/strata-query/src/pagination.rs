use crate::error::{QueryError, Result};
use crate::filter::{FilterExpression, SortSpec};
use crate::types::{DataRow, QueryOptions};
use serde::{Deserialize, Serialize};

/// Smallest page size a caller may ask for
pub const MIN_PAGE_SIZE: u64 = 10;

/// Page cursor plus filtering for `get_page`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub current: u64,
    pub page_size: u64,
    #[serde(default)]
    pub filter: FilterExpression,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl PageRequest {
    pub fn new(current: u64, page_size: u64) -> Self {
        Self {
            current,
            page_size,
            filter: FilterExpression::default(),
            sorts: Vec::new(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<SortSpec>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<PageWindow> {
        if self.current < 1 {
            return Err(QueryError::validation(format!(
                "current must be at least 1, got {}",
                self.current
            )));
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(QueryError::validation(format!(
                "pageSize must be at least {}, got {}",
                MIN_PAGE_SIZE, self.page_size
            )));
        }
        let offset = (self.current - 1)
            .checked_mul(self.page_size)
            .ok_or_else(|| QueryError::validation("page offset overflows"))?;

        Ok(PageWindow {
            offset,
            limit: self.page_size,
        })
    }
}

/// Row slice a page covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub total: u64,
    pub total_page: u64,
    pub current: u64,
    pub page_size: u64,
    pub has_more: bool,
    pub list: Vec<DataRow>,
}

impl PageResult {
    /// Derive the envelope from a total count and the fetched slice
    pub fn assemble(request: &PageRequest, window: PageWindow, total: u64, list: Vec<DataRow>) -> Self {
        Self {
            total,
            total_page: total.div_ceil(window.limit),
            current: request.current,
            page_size: window.limit,
            has_more: window.offset.saturating_add(window.limit) < total,
            list,
        }
    }
}
