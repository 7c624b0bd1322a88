use serde::{Deserialize, Serialize};

/// Ordered query parameters. Repeated keys are kept in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryParams(pub Vec<(String, String)>);

impl QueryParams {
    /// Build pairs from a JSON object, expanding array values into repeated keys.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in map {
            match value {
                serde_json::Value::Array(values) => {
                    for value in values {
                        pairs.push((key.clone(), scalar_to_string(value)));
                    }
                }
                other => pairs.push((key.clone(), scalar_to_string(other))),
            }
        }
        Self(pairs)
    }

    /// URL-encode as `k=v&k=v`
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    /// Inverse of [`QueryParams::encode`]
    pub fn decode(encoded: &str) -> Self {
        Self(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One synthetic call, generated once per experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub function_name: String,
    pub endpoint: String,
    pub path: String,
    pub method: String,
    pub query: QueryParams,
    pub body: Option<serde_json::Value>,
}

impl RequestRecord {
    /// Target URL: `<endpoint>/<path>?<query>`
    pub fn url(&self) -> String {
        let mut url = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query.encode());
        }
        url
    }

    /// Progress label: `<METHOD> <path>`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Outcome of one call of a [`RequestRecord`] at one concurrency level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestResult {
    pub record: RequestRecord,

    /// Client-generated identifier, unique per attempt
    pub request_id: String,

    /// Provider-assigned correlation identifier
    pub response_id: Option<String>,

    /// HTTP status, or a synthetic failure status
    pub status: u16,

    /// Response body or error description
    pub response_body: String,

    /// Wall-clock request start, epoch seconds
    pub request_time: f64,

    /// Elapsed seconds until the response arrived
    pub response_time: f64,

    /// Captured response headers, in configuration order
    pub headers: Vec<(String, Option<String>)>,
}

impl RequestResult {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Every status above 200 counts as failed, synthetic ones included.
    pub fn is_failure(&self) -> bool {
        self.status > 200
    }

    /// Captured value of `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }
}
