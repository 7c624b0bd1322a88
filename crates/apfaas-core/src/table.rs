//! CSV persistence for result tables.
//!
//! Null values are written as empty cells. Captured response headers follow
//! the fixed result columns, one column per header.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::request::{QueryParams, RequestRecord, RequestResult};

/// Fixed leading columns of a result table.
pub const RESULT_COLUMNS: [&str; 12] = [
    "function_name",
    "endpoint",
    "path",
    "method",
    "query_string",
    "body",
    "request_id",
    "response_id",
    "response_status",
    "response_body",
    "request_time",
    "response_time",
];

/// Header row for results capturing `headers`.
pub fn result_header(headers: &[String]) -> Vec<String> {
    RESULT_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(headers.iter().cloned())
        .collect()
}

/// Cells of one result, aligned with [`result_header`].
pub fn result_row(result: &RequestResult, headers: &[String]) -> Vec<String> {
    let record = &result.record;
    let mut row = vec![
        record.function_name.clone(),
        record.endpoint.clone(),
        record.path.clone(),
        record.method.clone(),
        record.query.encode(),
        record
            .body
            .as_ref()
            .map(|body| body.to_string())
            .unwrap_or_default(),
        result.request_id.clone(),
        result.response_id.clone().unwrap_or_default(),
        result.status.to_string(),
        result.response_body.clone(),
        result.request_time.to_string(),
        result.response_time.to_string(),
    ];
    row.extend(
        headers
            .iter()
            .map(|name| result.header(name).map(str::to_string).unwrap_or_default()),
    );
    row
}

/// Write an arbitrary table.
pub fn write_table<P, I>(path: P, header: &[String], rows: I) -> CoreResult<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a result table capturing `headers`.
pub fn write_results<P: AsRef<Path>>(
    path: P,
    results: &[RequestResult],
    headers: &[String],
) -> CoreResult<()> {
    write_table(
        path,
        &result_header(headers),
        results.iter().map(|result| result_row(result, headers)),
    )
}

fn optional(cell: &str) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Read back a result table written by [`write_results`].
pub fn read_results<P: AsRef<Path>>(path: P) -> CoreResult<Vec<RequestResult>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if header.len() < RESULT_COLUMNS.len()
        || header
            .iter()
            .zip(RESULT_COLUMNS.iter())
            .any(|(found, expected)| found != expected)
    {
        return Err(CoreError::malformed(path, "unexpected header row"));
    }
    let header_names = &header[RESULT_COLUMNS.len()..];

    let mut results = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let cell = |index: usize| row.get(index).unwrap_or_default();

        let body = optional(cell(5))
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;
        let status = cell(8).parse::<u16>().map_err(|e| {
            CoreError::malformed(path, format!("row {}: bad status: {}", line + 1, e))
        })?;
        let request_time = cell(10).parse::<f64>().map_err(|e| {
            CoreError::malformed(path, format!("row {}: bad request_time: {}", line + 1, e))
        })?;
        let response_time = cell(11).parse::<f64>().map_err(|e| {
            CoreError::malformed(path, format!("row {}: bad response_time: {}", line + 1, e))
        })?;

        results.push(RequestResult {
            record: RequestRecord {
                function_name: cell(0).to_string(),
                endpoint: cell(1).to_string(),
                path: cell(2).to_string(),
                method: cell(3).to_string(),
                query: QueryParams::decode(cell(4)),
                body,
            },
            request_id: cell(6).to_string(),
            response_id: optional(cell(7)),
            status,
            response_body: cell(9).to_string(),
            request_time,
            response_time,
            headers: header_names
                .iter()
                .enumerate()
                .map(|(offset, name)| (name.clone(), optional(cell(RESULT_COLUMNS.len() + offset))))
                .collect(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: u16, response_id: Option<&str>, cache: Option<&str>) -> RequestResult {
        RequestResult {
            record: RequestRecord {
                function_name: "sport-scoring".to_string(),
                endpoint: "https://example.com".to_string(),
                path: "score".to_string(),
                method: "POST".to_string(),
                query: QueryParams(vec![
                    ("team".to_string(), "a".to_string()),
                    ("team".to_string(), "b".to_string()),
                ]),
                body: Some(serde_json::json!({ "home": 2, "away": "1,5" })),
            },
            request_id: uuid::Uuid::new_v4().to_string(),
            response_id: response_id.map(str::to_string),
            status,
            response_body: "{\"ok\":true}\nline two".to_string(),
            request_time: 1_700_000_000.123_456,
            response_time: 0.042,
            headers: vec![("x-cache".to_string(), cache.map(str::to_string))],
        }
    }

    #[test]
    fn test_results_survive_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_2_concurrency.csv");

        let results = vec![
            result(200, Some("abc-1"), Some("HIT")),
            result(500, None, None),
            result(503, None, None),
        ];
        let headers = vec!["x-cache".to_string()];
        write_results(&path, &results, &headers).unwrap();

        let loaded = read_results(&path).unwrap();
        assert_eq!(loaded.len(), results.len());
        for (original, loaded) in results.iter().zip(&loaded) {
            assert_eq!(loaded.status, original.status);
            assert_eq!(loaded.response_id, original.response_id);
            assert_eq!(loaded.headers, original.headers);
            assert_eq!(loaded.record, original.record);
            assert_eq!(loaded.request_time, original.request_time);
        }
    }

    #[test]
    fn test_rejects_foreign_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        assert!(matches!(
            read_results(&path),
            Err(CoreError::MalformedTable { .. })
        ));
    }
}
