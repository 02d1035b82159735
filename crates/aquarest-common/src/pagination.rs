//! Response-shape classification for paginated endpoints.
//!
//! Aqua list endpoints answer with `{"result": [...], "count": N}` where `N` is
//! the total number of items across every page. Other endpoints return a bare
//! array or a single object. [`PageShape::classify`] turns any response into
//! one of two variants so the page walker can treat them uniformly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the field carrying the items of a page.
pub const RESULT_FIELD: &str = "result";
/// Name of the field carrying the total item count.
pub const COUNT_FIELD: &str = "count";

/// Classified shape of an endpoint response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageShape {
    /// The response is complete as returned.
    Unpaginated(Vec<Value>),
    /// One page of a larger result set.
    Paginated {
        /// Items carried by this page.
        items: Vec<Value>,
        /// Total items reported by the endpoint.
        total: u64,
    },
}

impl PageShape {
    /// Classifies a response.
    ///
    /// - A bare array is unpaginated.
    /// - An object with an array `result` and a numeric `count`, where
    ///   `count > 0` and `result.len() <= count`, is paginated.
    /// - An object with an array `result` failing those checks is unpaginated
    ///   over `result`.
    /// - Anything else is unpaginated and stands for itself as a single item.
    #[must_use]
    pub fn classify(response: Value) -> Self {
        match response {
            Value::Array(items) => Self::Unpaginated(items),
            Value::Object(mut map) => {
                let total = map.get(COUNT_FIELD).and_then(Value::as_u64);
                match (map.remove(RESULT_FIELD), total) {
                    (Some(Value::Array(items)), Some(total))
                        if total > 0 && items.len() as u64 <= total =>
                    {
                        Self::Paginated { items, total }
                    }
                    (Some(Value::Array(items)), _) => Self::Unpaginated(items),
                    (Some(other), _) => {
                        map.insert(RESULT_FIELD.to_string(), other);
                        Self::Unpaginated(vec![Value::Object(map)])
                    }
                    (None, _) => Self::Unpaginated(vec![Value::Object(map)]),
                }
            }
            other => Self::Unpaginated(vec![other]),
        }
    }

    /// Whether the endpoint supports pagination.
    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        matches!(self, Self::Paginated { .. })
    }

    /// Total items: the reported count when paginated, otherwise the item count.
    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            Self::Unpaginated(items) => items.len() as u64,
            Self::Paginated { total, .. } => *total,
        }
    }

    /// Consumes the shape and returns the items it carries.
    #[must_use]
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Unpaginated(items) | Self::Paginated { items, .. } => items,
        }
    }
}

/// Top-level JSON type of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// A bare JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Any other JSON value.
    Scalar,
}

impl ResponseKind {
    /// Kind of `value`.
    #[must_use]
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            _ => Self::Scalar,
        }
    }
}

/// Result of sampling an endpoint for pagination support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationAnalysis {
    /// Whether pagination was inferred.
    pub supported: bool,
    /// Top-level type of the sampled response.
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    /// Reported total when paginated, otherwise the number of items seen.
    pub count: u64,
}

impl PaginationAnalysis {
    /// Builds the analysis for a one-item sample response.
    #[must_use]
    pub fn from_response(response: Value) -> Self {
        let kind = ResponseKind::of(&response);
        let shape = PageShape::classify(response);
        Self {
            supported: shape.is_paginated(),
            kind,
            count: shape.total(),
        }
    }
}

/// Page descriptor for a full walk.
///
/// Page indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    /// Total items reported by the endpoint.
    pub total: u64,
    /// Items requested per page.
    pub per_page: u32,
}

impl PagePlan {
    /// Creates a plan. A `per_page` of zero is treated as one.
    #[must_use]
    pub fn new(total: u64, per_page: u32) -> Self {
        Self {
            total,
            per_page: per_page.max(1),
        }
    }

    /// Number of pages needed: `ceil(total / per_page)`.
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.total.div_ceil(self.per_page as u64)
    }

    /// Whether a single page covers the whole set.
    #[must_use]
    pub const fn fits_single_page(&self) -> bool {
        self.total <= self.per_page as u64
    }

    /// Page indices to request, in order.
    pub fn page_indices(&self) -> impl Iterator<Item = u64> + use<> {
        1..=self.pages()
    }
}
