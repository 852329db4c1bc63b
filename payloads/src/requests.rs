use crate::{Filters, OrderDirection, TableName};
use serde::{Deserialize, Serialize};

/// A ranged, ordered, equality-filtered read against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub table: TableName,
    pub filters: Filters,
    pub offset: u64,
    pub limit: u64,
    pub order_by: String,
    pub order_direction: OrderDirection,
}

impl RecordQuery {
    /// Inclusive index of the last row requested.
    pub fn range_end(&self) -> u64 {
        (self.offset + self.limit).saturating_sub(1)
    }

    /// Query-string pairs in the record store's dialect.
    ///
    /// Only applicable filters are emitted, as `column=eq.value`.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];

        for (column, value) in &self.filters {
            if value.is_applicable() {
                pairs.push((
                    column.clone(),
                    format!("eq.{}", value.to_query_value()),
                ));
            }
        }

        pairs.push((
            "order".to_string(),
            format!("{}.{}", self.order_by, self.order_direction),
        ));
        pairs.push(("offset".to_string(), self.offset.to_string()));
        pairs.push(("limit".to_string(), self.limit.to_string()));
        pairs
    }
}
