use bson::{doc, Document};

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};
use crate::dynamic::{CREATED_AT, RESTRICTED_FIELDS};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `-createdAt,name` as well as `createdAt desc, name asc`
    pub fn validate_and_parse(order: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in order.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            let Some(token) = it.next() else { continue };

            let (field, mut sort) = match token.strip_prefix('-') {
                Some(field) => (field, SortDirection::Desc),
                None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
            };
            if let Some(dir) = it.next() {
                sort = if dir.eq_ignore_ascii_case("desc") || dir == "-1" {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
            }

            Self::validate_field(field)?;
            out.push(FilterOrderInfo { field: field.to_string(), sort });
        }
        Ok(out)
    }

    fn validate_field(field: &str) -> Result<(), FilterError> {
        if field.is_empty() || field.split('.').any(|p| p.is_empty() || p.starts_with('$')) {
            return Err(FilterError::InvalidSortField(field.to_string()));
        }
        let root = field.split('.').next().unwrap_or(field);
        if RESTRICTED_FIELDS.contains(&root) {
            return Err(FilterError::SensitiveFilter(field.to_string()));
        }
        Ok(())
    }

    /// Sort document; newest first when nothing was requested
    pub fn generate(infos: &[FilterOrderInfo]) -> Document {
        if infos.is_empty() {
            return doc! { CREATED_AT: -1 };
        }
        infos
            .iter()
            .map(|i| (i.field.clone(), bson::Bson::Int32(i.sort.to_mongo())))
            .collect()
    }

    pub fn parse(order: Option<&str>) -> Result<Document, FilterError> {
        let infos = match order {
            Some(order) => Self::validate_and_parse(order)?,
            None => Vec::new(),
        };
        Ok(Self::generate(&infos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_newest_first() {
        assert_eq!(FilterOrder::parse(None).unwrap(), doc! { "createdAt": -1 });
        assert_eq!(FilterOrder::parse(Some(" , ")).unwrap(), doc! { "createdAt": -1 });
    }

    #[test]
    fn prefix_and_word_directions() {
        let sort = FilterOrder::parse(Some("-createdAt,name")).unwrap();
        assert_eq!(sort, doc! { "createdAt": -1, "name": 1 });

        let sort = FilterOrder::parse(Some("age desc, name asc")).unwrap();
        assert_eq!(sort, doc! { "age": -1, "name": 1 });
    }

    #[test]
    fn rejects_operator_and_sensitive_fields() {
        assert!(matches!(FilterOrder::parse(Some("$natural")), Err(FilterError::InvalidSortField(_))));
        assert!(matches!(FilterOrder::parse(Some("-password")), Err(FilterError::SensitiveFilter(_))));
    }
}
