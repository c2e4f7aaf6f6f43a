use bson::{doc, Bson, Document};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, PageWindow};
use crate::config;
use crate::dynamic::access::FieldScope;
use crate::dynamic::{DynamicSchema, FindQuery, CREATED_AT, RESTRICTED_FIELDS, UPDATED_AT};

/// Collects the parts of a dynamic list request and produces a `FindQuery`
pub struct Filter<'a> {
    schema: &'a DynamicSchema,
    where_data: Document,
    projection: Option<Document>,
    sort: Document,
    window: PageWindow,
}

impl<'a> Filter<'a> {
    pub fn new(schema: &'a DynamicSchema) -> Self {
        let api = &config::config().api;
        Self {
            schema,
            where_data: Document::new(),
            projection: None,
            sort: FilterOrder::generate(&[]),
            window: PageWindow::resolve(None, None, api.default_page_size as u64, api.max_page_size as u64),
        }
    }

    /// Apply every query parameter, restricted to what `view` may read
    pub fn assign(&mut self, data: &FilterData, view: &FieldScope) -> Result<&mut Self, FilterError> {
        if let Some(raw) = data.filter.as_deref() {
            self.where_clause(raw)?;
        }
        self.select(data.select.as_deref(), view)?;
        self.order(data.sort.as_deref())?;
        self.paginate(data.page.as_deref(), data.limit.as_deref());
        Ok(self)
    }

    pub fn where_clause(&mut self, raw: &str) -> Result<&mut Self, FilterError> {
        let max_depth = config::config().filter.max_nested_depth;
        self.where_data = FilterWhere::generate(raw, self.schema, max_depth)?;
        if config::config().filter.debug_logging {
            tracing::debug!("Translated filter for '{}': {}", self.schema.name, self.where_data);
        }
        Ok(self)
    }

    pub fn select(&mut self, select: Option<&str>, view: &FieldScope) -> Result<&mut Self, FilterError> {
        self.projection = projection_for(select, view)?;
        Ok(self)
    }

    pub fn order(&mut self, order: Option<&str>) -> Result<&mut Self, FilterError> {
        self.sort = FilterOrder::parse(order)?;
        Ok(self)
    }

    pub fn paginate(&mut self, page: Option<&str>, limit: Option<&str>) -> &mut Self {
        let api = &config::config().api;
        let max = api.max_page_size as u64;
        if let Some(requested) = limit.and_then(|l| l.trim().parse::<u64>().ok()) {
            if requested > max && config::config().filter.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", requested, max);
            }
        }
        self.window = PageWindow::resolve(page, limit, api.default_page_size as u64, max);
        self
    }

    pub fn window(&self) -> PageWindow {
        self.window
    }

    pub fn to_query(&self) -> FindQuery {
        FindQuery {
            filter: self.where_data.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            skip: self.window.skip(),
            limit: i64::try_from(self.window.limit).unwrap_or(i64::MAX),
        }
    }
}

fn is_restricted(field: &str) -> bool {
    let root = field.split('.').next().unwrap_or(field);
    RESTRICTED_FIELDS.contains(&root)
}

fn restricted_exclusion() -> Document {
    RESTRICTED_FIELDS
        .iter()
        .map(|f| (f.to_string(), Bson::Int32(0)))
        .collect()
}

/// Projection for a read. An explicit `select` is intersected with the
/// view scope; without one the view list is used, or every field except the
/// restricted ones.
pub fn projection_for(select: Option<&str>, view: &FieldScope) -> Result<Option<Document>, FilterError> {
    let requested: Vec<&str> = select
        .map(|s| s.split([',', ' ']).map(str::trim).filter(|f| !f.is_empty()).collect())
        .unwrap_or_default();

    if !requested.is_empty() {
        if let Some(field) = requested.iter().find(|f| is_restricted(f)) {
            return Err(FilterError::SensitiveSelection(field.to_string()));
        }
        if let Some(field) = requested
            .iter()
            .find(|f| f.starts_with('$') || f.starts_with('-') || f.split('.').any(str::is_empty))
        {
            return Err(FilterError::InvalidSelectField(field.to_string()));
        }

        let mut projection = doc! { "_id": 1 };
        for field in requested.into_iter().filter(|f| view.permits(f) || is_timestamp(f)) {
            projection.insert(field, 1);
        }
        return Ok(Some(projection));
    }

    match view {
        FieldScope::All => Ok(Some(restricted_exclusion())),
        FieldScope::Only(fields) => {
            let mut projection = doc! { "_id": 1, CREATED_AT: 1, UPDATED_AT: 1 };
            for field in fields.iter().filter(|f| !is_restricted(f)) {
                projection.insert(field.clone(), 1);
            }
            Ok(Some(projection))
        }
    }
}

fn is_timestamp(field: &str) -> bool {
    field == CREATED_AT || field == UPDATED_AT || field == "_id"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(fields: &[&str]) -> FieldScope {
        FieldScope::Only(fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn select_rejects_sensitive_fields() {
        let err = projection_for(Some("name,password"), &FieldScope::All).unwrap_err();
        assert_eq!(err.to_string(), "Selection of sensitive fields is not allowed.");
    }

    #[test]
    fn select_is_intersected_with_view() {
        let projection = projection_for(Some("name,salary,createdAt"), &only(&["name", "email"]))
            .unwrap()
            .unwrap();
        assert_eq!(projection, doc! { "_id": 1, "name": 1, "createdAt": 1 });
    }

    #[test]
    fn select_accepts_space_separated_lists() {
        let projection = projection_for(Some("name email"), &FieldScope::All).unwrap().unwrap();
        assert_eq!(projection, doc! { "_id": 1, "name": 1, "email": 1 });
    }

    #[test]
    fn no_select_uses_view_list() {
        let projection = projection_for(None, &only(&["name", "ssn"])).unwrap().unwrap();
        assert_eq!(projection, doc! { "_id": 1, "createdAt": 1, "updatedAt": 1, "name": 1 });
    }

    #[test]
    fn no_select_and_full_view_hides_restricted() {
        let projection = projection_for(Some(" "), &FieldScope::All).unwrap().unwrap();
        assert_eq!(projection, doc! { "password": 0, "ssn": 0, "creditCardNumber": 0 });
    }

    #[test]
    fn page_window() {
        let window = PageWindow::resolve(Some("3"), Some("20"), 10, 100);
        assert_eq!(window.skip(), 40);
        assert_eq!(window.total_pages(41), 3);

        let fallback = PageWindow::resolve(Some("abc"), Some("0"), 10, 100);
        assert_eq!(fallback, PageWindow { page: 1, limit: 10 });

        let capped = PageWindow::resolve(None, Some("5000"), 10, 100);
        assert_eq!(capped.limit, 100);
        assert_eq!(capped.total_pages(0), 0);
    }
}
