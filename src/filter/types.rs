use serde::{Deserialize, Serialize};

/// Query operators a dynamic filter may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$regex")] Regex,
    #[serde(rename = "$options")] Options,

    #[serde(rename = "$exists")] Exists,

    #[serde(rename = "$and")] And,
    #[serde(rename = "$or")] Or,
    #[serde(rename = "$nor")] NOr,
    #[serde(rename = "$not")] Not,
}

impl FilterOp {
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FilterOp::Eq,
            "$ne" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$regex" => FilterOp::Regex,
            "$options" => FilterOp::Options,
            "$exists" => FilterOp::Exists,
            "$and" => FilterOp::And,
            "$or" => FilterOp::Or,
            "$nor" => FilterOp::NOr,
            "$not" => FilterOp::Not,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::In => "$in",
            FilterOp::NIn => "$nin",
            FilterOp::Regex => "$regex",
            FilterOp::Options => "$options",
            FilterOp::Exists => "$exists",
            FilterOp::And => "$and",
            FilterOp::Or => "$or",
            FilterOp::NOr => "$nor",
            FilterOp::Not => "$not",
        }
    }

    /// Operators that combine whole sub-filters
    pub fn is_logical(&self) -> bool {
        matches!(self, FilterOp::And | FilterOp::Or | FilterOp::NOr)
    }
}

/// Raw list parameters as they arrive in the query string. Numbers are kept
/// as strings so a malformed `page` falls back to the default instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub filter: Option<String>,
    pub select: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_mongo(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

/// Resolved page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Lenient parse: unparsable or zero values fall back, `limit` is capped
    pub fn resolve(page: Option<&str>, limit: Option<&str>, default_limit: u64, max_limit: u64) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<u64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<u64>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit)
            .clamp(1, max_limit.max(1));
        Self { page, limit }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}
