//! Result bundle types, as returned by the query backend

use serde::{Deserialize, Serialize};

use crate::common::strings;

/// Opaque continuation token handed out by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageToken {
    pub token: String,
}

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "DOUBLE")]
    Double,
    #[serde(rename = "INTEGER")]
    Integer,
    #[serde(rename = "BOOLEAN")]
    Boolean,
    #[serde(rename = "DATE")]
    Date,
    #[serde(rename = "FILEHANDLEID")]
    FileHandleId,
    #[serde(rename = "ENTITYID")]
    EntityId,
    #[serde(rename = "LINK")]
    Link,
    #[serde(rename = "LARGETEXT")]
    LargeText,
    #[serde(rename = "USERID")]
    UserId,
}

/// How a column can be faceted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetType {
    Enumeration,
    Range,
}

impl std::fmt::Display for FacetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacetType::Enumeration => f.write_str(strings::FACET_TYPE_ENUMERATION),
            FacetType::Range => f.write_str(strings::FACET_TYPE_RANGE),
        }
    }
}

/// Column metadata
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnModel {
    pub id: Option<String>,
    pub name: String,
    pub column_type: ColumnType,
    pub enum_values: Option<Vec<String>>,
    pub default_value: Option<String>,
    pub maximum_size: Option<u64>,
    pub facet_type: Option<FacetType>,
}

impl ColumnModel {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: None,
            name: name.into(),
            column_type,
            enum_values: None,
            default_value: None,
            maximum_size: None,
            facet_type: None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.facet_type == Some(FacetType::Enumeration)
    }
}

/// A column header in the select list of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub id: Option<String>,
}

// =============================================================================

/// One value of an enumeration facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
    pub is_selected: bool,
}

impl FacetValue {
    pub fn new(value: impl Into<String>, count: u64, is_selected: bool) -> Self {
        Self {
            value: value.into(),
            count,
            is_selected,
        }
    }

    /// Label to show for this value; unannotated cells get a readable name
    pub fn display_value(&self) -> &str {
        if self.value == strings::NULL_FACET_VALUE {
            strings::NULL_FACET_DISPLAY
        } else {
            &self.value
        }
    }
}

/// Value histogram of a categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetColumnValues {
    pub column_name: String,
    pub facet_values: Vec<FacetValue>,
}

impl FacetColumnValues {
    pub fn find(&self, value: &str) -> Option<&FacetValue> {
        self.facet_values.iter().find(|v| v.value == value)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.facet_values.iter().map(|v| v.value.as_str())
    }
}

/// Bounds of a numeric column. Carried through untouched.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetColumnRange {
    pub column_name: String,
    pub column_min: Option<String>,
    pub column_max: Option<String>,
    pub selected_min: Option<String>,
    pub selected_max: Option<String>,
}

/// A facet of a result bundle, tagged by its facet type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "facetType")]
pub enum FacetResult {
    #[serde(rename = "enumeration")]
    Values(FacetColumnValues),
    #[serde(rename = "range")]
    Range(FacetColumnRange),
}

impl FacetResult {
    pub fn column_name(&self) -> &str {
        match self {
            FacetResult::Values(v) => &v.column_name,
            FacetResult::Range(r) => &r.column_name,
        }
    }

    pub fn facet_type(&self) -> FacetType {
        match self {
            FacetResult::Values(_) => FacetType::Enumeration,
            FacetResult::Range(_) => FacetType::Range,
        }
    }

    pub fn as_values(&self) -> Option<&FacetColumnValues> {
        match self {
            FacetResult::Values(v) => Some(v),
            FacetResult::Range(_) => None,
        }
    }
}

/// Find the enumeration facet for a column in a facet list
pub fn find_enumeration<'a>(
    facets: &'a [FacetResult],
    column_name: &str,
) -> Option<&'a FacetColumnValues> {
    facets
        .iter()
        .filter_map(FacetResult::as_values)
        .find(|v| v.column_name == column_name)
}

// =============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub row_id: i64,
    pub version_number: Option<i64>,
    pub values: Vec<Option<String>>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumFileSizes {
    pub sum_file_sizes_bytes: u64,
    /// The backend stopped counting early; the sum is a lower bound
    pub greater_than: bool,
}

/// Everything the backend returned for one request
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub column_models: Vec<ColumnModel>,
    pub facets: Option<Vec<FacetResult>>,
    #[serde(default)]
    pub rows: Vec<Row>,
    pub select_columns: Option<Vec<SelectColumn>>,
    pub next_page_token: Option<PageToken>,
    pub total_row_count: Option<u64>,
    pub sum_file_sizes: Option<SumFileSizes>,
    pub max_rows_per_page: Option<u64>,
}

impl QueryResult {
    /// Facets, or an empty slice when the mask left them out
    pub fn facet_list(&self) -> &[FacetResult] {
        self.facets.as_deref().unwrap_or_default()
    }

    pub fn enumeration_facet(
        &self,
        column_name: &str,
    ) -> Option<&FacetColumnValues> {
        find_enumeration(self.facet_list(), column_name)
    }

    pub fn column_model(&self, name: &str) -> Option<&ColumnModel> {
        self.column_models.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::cbor;

    fn facet_cbor_value() -> ciborium::value::Value {
        cbor!({
            "facetType" => "enumeration",
            "columnName" => "name",
            "facetValues" => [
                { "value" => "a", "count" => 1, "isSelected" => true }
            ]
        })
        .unwrap()
    }

    #[test]
    fn test_facet_tag_decodes() {
        let facet: FacetResult = facet_cbor_value().deserialized().unwrap();

        assert_eq!(facet.facet_type(), FacetType::Enumeration);
        assert_eq!(facet.column_name(), "name");
        assert_eq!(
            facet.as_values().unwrap().find("a"),
            Some(&FacetValue::new("a", 1, true))
        );
    }

    #[test]
    fn test_range_is_not_enumeration() {
        let facets = vec![FacetResult::Range(FacetColumnRange {
            column_name: "age".to_string(),
            column_min: Some("1".to_string()),
            column_max: Some("90".to_string()),
            selected_min: None,
            selected_max: None,
        })];

        assert!(find_enumeration(&facets, "age").is_none());
        assert_eq!(facets[0].facet_type().to_string(), "range");
    }

    #[test]
    fn test_null_value_display() {
        let v = FacetValue::new(strings::NULL_FACET_VALUE, 3, false);
        assert_eq!(v.display_value(), "unannotated");

        let v = FacetValue::new("brain", 3, false);
        assert_eq!(v.display_value(), "brain");
    }

    #[test]
    fn test_missing_facets() {
        let result = QueryResult::default();
        assert!(result.facet_list().is_empty());
        assert!(result.enumeration_facet("name").is_none());
    }
}
