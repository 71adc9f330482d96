//! List query and pagination types
//!
//! List endpoints speak the react-admin `ra-data-simple-rest` dialect:
//! `sort=["price","ASC"]`, `range=[0,24]` and `filter={"category_id":3}`.
//! The storefront may instead send plain `page`/`per_page` and loose filter
//! parameters (`?q=home&team=Nepal`); both shapes end up in a [`ListQuery`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Default number of rows when the client sends no range
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Hard upper bound on rows per request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Error returned when list parameters cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListQueryError {
    #[error("invalid sort parameter: {0}")]
    InvalidSort(String),
    #[error("invalid range parameter: {0}")]
    InvalidRange(String),
    #[error("invalid filter parameter: {0}")]
    InvalidFilter(String),
}

/// Parsed list request: sort, window and filters
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// Requested sort field and direction
    pub sort: Option<(String, SortOrder)>,
    /// First row (0-based)
    pub offset: i64,
    /// Number of rows
    pub limit: i64,
    /// Filter values keyed by field name
    pub filter: Map<String, Value>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            sort: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
            filter: Map::new(),
        }
    }
}

impl ListQuery {
    /// Parse the three react-admin parameters
    pub fn parse(
        sort: Option<&str>,
        range: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Self, ListQueryError> {
        let mut query = Self::default();

        if let Some(sort) = sort.filter(|s| !s.trim().is_empty()) {
            query.sort = Some(parse_sort(sort)?);
        }

        if let Some(range) = range.filter(|s| !s.trim().is_empty()) {
            let (start, end) = parse_range(range)?;
            query.offset = start;
            query.limit = (end - start + 1).clamp(1, MAX_PAGE_SIZE);
        }

        if let Some(filter) = filter.filter(|s| !s.trim().is_empty()) {
            match serde_json::from_str::<Value>(filter) {
                Ok(Value::Object(map)) => query.filter = map,
                _ => return Err(ListQueryError::InvalidFilter(filter.to_string())),
            }
        }

        Ok(query)
    }

    /// Build a query from raw query-string pairs.
    ///
    /// `sort`, `range` and `filter` use the react-admin encoding; `page` and
    /// `per_page` are accepted as a fallback window; `_sort`/`_order` as a
    /// fallback sort. Every other key is treated as a filter.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ListQueryError> {
        let mut query = Self::parse(
            params.get("sort").map(String::as_str),
            params.get("range").map(String::as_str),
            params.get("filter").map(String::as_str),
        )?;

        if !params.contains_key("range") {
            if let Some(page) = params.get("page").and_then(|p| p.parse::<i64>().ok()) {
                let per_page = params
                    .get("per_page")
                    .and_then(|p| p.parse::<u32>().ok())
                    .unwrap_or(DEFAULT_PAGE_SIZE as u32);
                let window = ListParams::new(page.max(1) as u32, per_page);
                query.offset = window.offset();
                query.limit = window.limit();
            }
        }

        if query.sort.is_none() {
            if let Some(field) = params.get("_sort") {
                let order = match params.get("_order").map(|o| o.to_uppercase()) {
                    Some(o) if o == "DESC" => SortOrder::Desc,
                    _ => SortOrder::Asc,
                };
                query.sort = Some((field.clone(), order));
            }
        }

        const RESERVED: &[&str] = &["sort", "range", "filter", "page", "per_page", "_sort", "_order"];
        for (key, value) in params {
            if !RESERVED.contains(&key.as_str()) && !query.filter.contains_key(key) {
                query.filter.insert(key.clone(), Value::String(value.clone()));
            }
        }

        Ok(query)
    }

    /// Set the window from page-based parameters
    pub fn with_page(mut self, params: &ListParams) -> Self {
        self.offset = params.offset();
        self.limit = params.limit();
        self
    }

    /// Set a filter value
    pub fn with_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(key.to_string(), value.into());
        self
    }

    /// Set the sort
    pub fn with_sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    /// Resolve the requested sort against a whitelist of `(field, column)` pairs.
    ///
    /// Unknown fields fall back to `default`, so the result is always safe to
    /// splice into SQL.
    pub fn order_by(&self, allowed: &[(&str, &str)], default: &str) -> String {
        self.sort
            .as_ref()
            .and_then(|(field, order)| {
                allowed
                    .iter()
                    .find(|(name, _)| *name == field.as_str())
                    .map(|(_, column)| format!("{} {}", column, order.as_sql()))
            })
            .unwrap_or_else(|| default.to_string())
    }

    /// Filter value as a string. Numbers and booleans are stringified, blank
    /// strings count as absent.
    pub fn filter_str(&self, key: &str) -> Option<String> {
        match self.filter.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Filter value as an integer
    pub fn filter_i64(&self, key: &str) -> Option<i64> {
        match self.filter.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Filter value as a boolean (`true`/`false`, `1`/`0`)
    pub fn filter_bool(&self, key: &str) -> Option<bool> {
        match self.filter.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// `filter={"id":[1,2,3]}` as sent by react-admin's `getMany`
    pub fn filter_ids(&self) -> Vec<i64> {
        match self.filter.get("id") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .collect(),
            Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_sort(raw: &str) -> Result<(String, SortOrder), ListQueryError> {
    let parts: Vec<String> =
        serde_json::from_str(raw).map_err(|_| ListQueryError::InvalidSort(raw.to_string()))?;
    match parts.as_slice() {
        [field] => Ok((field.clone(), SortOrder::Asc)),
        [field, order] => {
            let order = match order.to_uppercase().as_str() {
                "ASC" => SortOrder::Asc,
                "DESC" => SortOrder::Desc,
                _ => return Err(ListQueryError::InvalidSort(raw.to_string())),
            };
            Ok((field.clone(), order))
        }
        _ => Err(ListQueryError::InvalidSort(raw.to_string())),
    }
}

fn parse_range(raw: &str) -> Result<(i64, i64), ListQueryError> {
    let parts: Vec<i64> =
        serde_json::from_str(raw).map_err(|_| ListQueryError::InvalidRange(raw.to_string()))?;
    match parts.as_slice() {
        [start, end] if *start >= 0 && end >= start => Ok((*start, *end)),
        _ => Err(ListQueryError::InvalidRange(raw.to_string())),
    }
}

/// Page-based pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE as u32,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE as u32),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One window of a list plus the total row count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the window
    pub items: Vec<T>,
    /// Total number of matching rows
    pub total: i64,
    /// First row of the window (0-based)
    pub offset: i64,
    /// Requested window size
    pub limit: i64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, query: &ListQuery) -> Self {
        Self {
            items,
            total,
            offset: query.offset,
            limit: query.limit,
        }
    }

    /// Current page number (1-indexed)
    pub fn page(&self) -> i64 {
        if self.limit <= 0 {
            return 1;
        }
        self.offset / self.limit + 1
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (self.total + self.limit - 1) / self.limit
    }

    /// Check if there is a next page
    pub fn has_next(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }

    /// `Content-Range` header value, e.g. `products 0-9/42`
    pub fn content_range(&self, resource: &str) -> String {
        if self.items.is_empty() {
            return format!("{} */{}", resource, self.total);
        }
        let end = self.offset + self.items.len() as i64 - 1;
        format!("{} {}-{}/{}", resource, self.offset, end, self.total)
    }

    /// Transform the items, keeping the window
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_range_window_matches(start in 0i64..10_000, len in 1i64..=MAX_PAGE_SIZE) {
            let end = start + len - 1;
            let query = ListQuery::parse(None, Some(&format!("[{},{}]", start, end)), None).unwrap();
            prop_assert_eq!(query.offset, start);
            prop_assert_eq!(query.limit, len);
        }

        #[test]
        fn prop_list_params_offset(page in 1u32..1000, per_page in 1u32..=100) {
            let params = ListParams::new(page, per_page);
            prop_assert_eq!(params.offset(), (page as i64 - 1) * per_page as i64);
            prop_assert!(params.limit() >= 1 && params.limit() <= MAX_PAGE_SIZE);
        }
    }
}
