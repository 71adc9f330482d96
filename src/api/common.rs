//! Common API utilities and shared types
//!
//! List endpoints answer react-admin's `getList`: a JSON array body plus a
//! `Content-Range: <resource> <start>-<end>/<total>` header.

use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::api::middleware::ApiError;
use crate::models::{ListQuery, PagedResult};

/// Companion count header for clients that do not parse `Content-Range`
pub const X_TOTAL_COUNT: &str = "x-total-count";

/// List parameters parsed from the query string
#[derive(Debug, Clone)]
pub struct ListRequest(pub ListQuery);

impl<S> FromRequestParts<S> for ListRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        Ok(ListRequest(ListQuery::from_params(&params)?))
    }
}

/// One page of a resource, rendered for react-admin
#[derive(Debug)]
pub struct Listed<T> {
    resource: &'static str,
    page: PagedResult<T>,
}

impl<T> Listed<T> {
    pub fn new(resource: &'static str, page: PagedResult<T>) -> Self {
        Self { resource, page }
    }
}

impl<T: Serialize> IntoResponse for Listed<T> {
    fn into_response(self) -> Response {
        let range = self.page.content_range(self.resource);
        let total = self.page.total.to_string();
        (
            [
                (header::CONTENT_RANGE, range),
                (HeaderName::from_static(X_TOTAL_COUNT), total),
            ],
            Json(self.page.items),
        )
            .into_response()
    }
}

/// Body of delete responses
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: i64,
}
