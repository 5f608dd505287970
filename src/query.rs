use serde::Deserialize;
use utoipa::IntoParams;

/// Page size used when `recordPerPage` is missing or not a positive number
pub const DEFAULT_RECORDS_PER_PAGE: u64 = 10;

/// Largest page a single request may ask for
pub const MAX_RECORDS_PER_PAGE: u64 = 100;

/// Largest offset the store accepts (Postgres OFFSET is a signed bigint)
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Raw pagination query parameters for the account listing
///
/// Values are kept as strings so that junk input falls back to defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<String>,
    /// Records per page
    #[serde(rename = "recordPerPage")]
    pub record_per_page: Option<String>,
    /// Explicit offset; overrides the offset derived from `page`
    #[serde(rename = "startIndex")]
    pub start_index: Option<String>,
}

/// Normalized offset and limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl PaginationParams {
    /// Resolve the raw parameters into an offset/limit pair
    pub fn resolve(&self) -> Pagination {
        let limit = Self::parse_positive(self.record_per_page.as_deref())
            .unwrap_or(DEFAULT_RECORDS_PER_PAGE)
            .min(MAX_RECORDS_PER_PAGE);

        let page = Self::parse_positive(self.page.as_deref()).unwrap_or(1);

        let offset = self
            .start_index
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or_else(|| (page - 1).saturating_mul(limit))
            .min(MAX_OFFSET);

        Pagination { offset, limit }
    }

    fn parse_positive(value: Option<&str>) -> Option<u64> {
        value
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|v| *v >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>, per_page: Option<&str>, start: Option<&str>) -> PaginationParams {
        PaginationParams {
            page: page.map(String::from),
            record_per_page: per_page.map(String::from),
            start_index: start.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            PaginationParams::default().resolve(),
            Pagination { offset: 0, limit: 10 }
        );
    }

    #[test]
    fn test_page_and_size() {
        assert_eq!(
            params(Some("3"), Some("5"), None).resolve(),
            Pagination { offset: 10, limit: 5 }
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        assert_eq!(
            params(Some("0"), Some("-4"), None).resolve(),
            Pagination { offset: 0, limit: 10 }
        );
        assert_eq!(
            params(Some("abc"), Some("xyz"), Some("nope")).resolve(),
            Pagination { offset: 0, limit: 10 }
        );
    }

    #[test]
    fn test_start_index_overrides_page() {
        assert_eq!(
            params(Some("4"), Some("10"), Some("7")).resolve(),
            Pagination { offset: 7, limit: 10 }
        );
    }

    #[test]
    fn test_offset_stays_within_store_range() {
        // Beyond i64: not a valid start index, so the page-derived offset applies
        assert_eq!(
            params(None, None, Some("18446744073709551615")).resolve(),
            Pagination { offset: 0, limit: 10 }
        );
        assert_eq!(
            params(Some("2"), Some("10"), Some("-5")).resolve(),
            Pagination { offset: 10, limit: 10 }
        );
        assert_eq!(
            params(None, None, Some("9223372036854775807")).resolve().offset,
            MAX_OFFSET
        );
        assert_eq!(
            params(Some("18446744073709551615"), Some("100"), None).resolve().offset,
            MAX_OFFSET
        );
    }

    #[test]
    fn test_page_size_is_capped() {
        assert_eq!(
            params(None, Some("5000"), None).resolve(),
            Pagination { offset: 0, limit: MAX_RECORDS_PER_PAGE }
        );
    }

    #[test]
    fn test_deserializes_camel_case_names() {
        let parsed: PaginationParams =
            serde_json::from_str(r#"{"page":"2","recordPerPage":"20","startIndex":"5"}"#).unwrap();
        assert_eq!(parsed.record_per_page.as_deref(), Some("20"));
        assert_eq!(parsed.start_index.as_deref(), Some("5"));
    }
}
