//! Query request types, as sent to the query backend

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::DEFAULT_PAGE_LIMIT;
use crate::result::PageToken;

/// Bit set selecting which sections of a result bundle the backend fills in
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartMask(pub u32);

impl PartMask {
    pub const RESULTS: PartMask = PartMask(0x01);
    pub const COUNT: PartMask = PartMask(0x02);
    pub const SELECT_COLUMNS: PartMask = PartMask(0x04);
    pub const MAX_ROWS_PER_PAGE: PartMask = PartMask(0x08);
    pub const COLUMN_MODELS: PartMask = PartMask(0x10);
    pub const FACETS: PartMask = PartMask(0x20);
    pub const SUM_FILE_SIZES: PartMask = PartMask(0x40);

    /// Mask used by views that show rows alongside facet controls
    pub const fn view_default() -> Self {
        PartMask(
            Self::COLUMN_MODELS.0 | Self::FACETS.0 | Self::RESULTS.0,
        )
    }

    pub const fn contains(&self, other: PartMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PartMask {
    type Output = PartMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        PartMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PartMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================

/// The values a single column is restricted to.
///
/// An empty set is a deliberate "match nothing" constraint; it is not the same
/// as having no filter for the column, which matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetFilter {
    pub column_name: String,
    pub facet_values: BTreeSet<String>,
}

impl FacetFilter {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            facet_values: BTreeSet::new(),
        }
    }

    pub fn with_values<I, S>(column_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column_name: column_name.into(),
            facet_values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the filter excludes every row
    pub fn matches_nothing(&self) -> bool {
        self.facet_values.is_empty()
    }
}

// =============================================================================

/// A query against one logical dataset
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql: String,
    pub limit: u64,
    pub offset: u64,
    #[serde(default)]
    pub selected_facets: Vec<FacetFilter>,
    #[serde(default)]
    pub is_consistent: bool,
    pub part_mask: PartMask,
    pub next_page_token: Option<PageToken>,
}

impl QueryRequest {
    /// Create an unfiltered first-page request
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            selected_facets: Vec::new(),
            is_consistent: false,
            part_mask: PartMask::view_default(),
            next_page_token: None,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_part_mask(mut self, part_mask: PartMask) -> Self {
        self.part_mask = part_mask;
        self
    }

    pub fn with_consistency(mut self, is_consistent: bool) -> Self {
        self.is_consistent = is_consistent;
        self
    }

    /// Find the filter for a column, if any
    pub fn filter_for(&self, column_name: &str) -> Option<&FacetFilter> {
        self.selected_facets
            .iter()
            .find(|f| f.column_name == column_name)
    }

    /// True if no facet filter is present
    pub fn is_unfiltered(&self) -> bool {
        self.selected_facets.is_empty()
    }

    /// Copy of this request with the filter for `filter.column_name` replaced.
    ///
    /// An existing filter keeps its position; a new one is appended. The copy
    /// starts from the first page, since the row set it addresses has changed.
    pub fn with_filter(&self, filter: FacetFilter) -> Self {
        let mut ret = self.clone();

        match ret
            .selected_facets
            .iter_mut()
            .find(|f| f.column_name == filter.column_name)
        {
            Some(existing) => *existing = filter,
            None => ret.selected_facets.push(filter),
        }

        ret.offset = 0;
        ret.next_page_token = None;
        ret
    }

    /// Copy of this request without filters or paging
    pub fn reset(&self) -> Self {
        Self {
            selected_facets: Vec::new(),
            offset: 0,
            next_page_token: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_mask() {
        let mask = PartMask::view_default();

        assert!(mask.contains(PartMask::FACETS));
        assert!(mask.contains(PartMask::RESULTS | PartMask::COLUMN_MODELS));
        assert!(!mask.contains(PartMask::COUNT));
        assert_eq!(mask, PartMask(0x31));
    }

    #[test]
    fn test_with_filter_keeps_position() {
        let base = QueryRequest::new("SELECT * FROM syn1")
            .with_filter(FacetFilter::with_values("a", ["1"]))
            .with_filter(FacetFilter::with_values("b", ["2"]));

        let mut paged = base.clone();
        paged.offset = 50;

        let next = paged.with_filter(FacetFilter::new("a"));

        assert_eq!(next.selected_facets[0].column_name, "a");
        assert!(next.selected_facets[0].matches_nothing());
        assert_eq!(next.selected_facets[1], base.selected_facets[1]);
        assert_eq!(next.offset, 0);
        assert_eq!(paged.offset, 50);
    }

    #[test]
    fn test_request_cbor() {
        let request = QueryRequest::new("SELECT * FROM syn1")
            .with_filter(FacetFilter::with_values("name", ["a", "b"]));

        let mut buffer: Vec<u8> = Vec::new();

        ciborium::ser::into_writer(&request, &mut buffer).unwrap();

        let read: QueryRequest =
            ciborium::de::from_reader(buffer.as_slice()).unwrap();

        assert!(request == read);
    }
}
