use std::collections::BTreeMap;

/// Field holding the correlation identifier in provider records.
pub const CORRELATION_FIELD: &str = "response_id";

/// One provider-reported execution.
///
/// Fields are provider-defined and kept as an open mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceRecord {
    pub correlation_id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl TraceRecord {
    /// Normalize the field/value pairs of one query result row.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut fields: BTreeMap<String, String> = pairs.into_iter().collect();
        let correlation_id = fields
            .remove(CORRELATION_FIELD)
            .filter(|value| !value.is_empty());
        Self {
            correlation_id,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
