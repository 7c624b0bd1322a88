//! Join of request results and provider traces on the correlation id.

use std::collections::{BTreeSet, HashMap, HashSet};

use apfaas_core::table::{result_header, result_row};
use apfaas_core::RequestResult;

use crate::record::{TraceRecord, CORRELATION_FIELD};

/// A persisted request result and the concurrency level it ran at.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentalRow {
    pub concurrency: usize,
    pub result: RequestResult,
}

/// One request row with its trace, if any.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatedRecord<'a> {
    pub row: &'a ExperimentalRow,
    pub trace: Option<&'a TraceRecord>,
}

/// Outcome of [`correlate`].
#[derive(Debug)]
pub struct Correlation<'a> {
    /// One entry per request row, in input order
    pub merged: Vec<CorrelatedRecord<'a>>,
    /// Traces whose correlation id matches no request row
    pub unmatched: Vec<&'a TraceRecord>,
}

impl Correlation<'_> {
    /// Request rows left without telemetry.
    pub fn missing_traces(&self) -> usize {
        self.merged.iter().filter(|record| record.trace.is_none()).count()
    }
}

/// Left-join `rows` onto `traces`, keeping the first trace of every
/// correlation id.
pub fn correlate<'a>(rows: &'a [ExperimentalRow], traces: &'a [TraceRecord]) -> Correlation<'a> {
    let mut by_id: HashMap<&str, &TraceRecord> = HashMap::new();
    for trace in traces {
        if let Some(id) = trace.correlation_id.as_deref() {
            by_id.entry(id).or_insert(trace);
        }
    }

    let merged = rows
        .iter()
        .map(|row| CorrelatedRecord {
            row,
            trace: row
                .result
                .response_id
                .as_deref()
                .and_then(|id| by_id.get(id).copied()),
        })
        .collect();

    let requested: HashSet<&str> = rows
        .iter()
        .filter_map(|row| row.result.response_id.as_deref())
        .collect();
    let unmatched = traces
        .iter()
        .filter(|trace| match trace.correlation_id.as_deref() {
            Some(id) => !requested.contains(id),
            None => true,
        })
        .collect();

    Correlation { merged, unmatched }
}

/// Union of trace field names, sorted.
pub fn trace_fields(traces: &[TraceRecord]) -> Vec<String> {
    traces
        .iter()
        .flat_map(|trace| trace.fields.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn trace_header(fields: &[String]) -> Vec<String> {
    std::iter::once(CORRELATION_FIELD.to_string())
        .chain(fields.iter().cloned())
        .collect()
}

pub fn trace_row(trace: &TraceRecord, fields: &[String]) -> Vec<String> {
    std::iter::once(trace.correlation_id.clone().unwrap_or_default())
        .chain(fields.iter().map(|name| trace.field(name).unwrap_or_default().to_string()))
        .collect()
}

pub fn experimental_header(headers: &[String]) -> Vec<String> {
    let mut header = result_header(headers);
    header.push("concurrency".to_string());
    header
}

pub fn experimental_row(row: &ExperimentalRow, headers: &[String]) -> Vec<String> {
    let mut cells = result_row(&row.result, headers);
    cells.push(row.concurrency.to_string());
    cells
}

/// Experimental columns followed by the trace fields; the join key appears
/// once.
pub fn correlated_header(headers: &[String], fields: &[String]) -> Vec<String> {
    let mut header = experimental_header(headers);
    header.extend(fields.iter().cloned());
    header
}

pub fn correlated_row(record: &CorrelatedRecord<'_>, headers: &[String], fields: &[String]) -> Vec<String> {
    let mut cells = experimental_row(record.row, headers);
    cells.extend(fields.iter().map(|name| {
        record
            .trace
            .and_then(|trace| trace.field(name))
            .unwrap_or_default()
            .to_string()
    }));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use apfaas_core::{QueryParams, RequestRecord};

    fn row(response_id: Option<&str>, status: u16) -> ExperimentalRow {
        ExperimentalRow {
            concurrency: 2,
            result: RequestResult {
                record: RequestRecord {
                    function_name: "f".to_string(),
                    endpoint: "http://localhost".to_string(),
                    path: "p".to_string(),
                    method: "GET".to_string(),
                    query: QueryParams::default(),
                    body: None,
                },
                request_id: "req".to_string(),
                response_id: response_id.map(str::to_string),
                status,
                response_body: String::new(),
                request_time: 0.0,
                response_time: 0.0,
                headers: vec![],
            },
        }
    }

    fn trace(id: Option<&str>, duration: &str) -> TraceRecord {
        let mut pairs = vec![("duration_ms".to_string(), duration.to_string())];
        if let Some(id) = id {
            pairs.push(("response_id".to_string(), id.to_string()));
        }
        TraceRecord::from_pairs(pairs)
    }

    #[test]
    fn test_left_join_keeps_every_request_row() {
        let rows = vec![
            row(Some("a"), 200),
            row(Some("b"), 200),
            row(None, 503),
            row(Some("a"), 200),
        ];
        let traces = vec![
            trace(Some("a"), "10"),
            trace(Some("a"), "99"),
            trace(Some("z"), "5"),
            trace(Some("z"), "6"),
            trace(None, "1"),
        ];

        let correlation = correlate(&rows, &traces);

        assert_eq!(correlation.merged.len(), rows.len());
        let durations: Vec<Option<&str>> = correlation
            .merged
            .iter()
            .map(|record| record.trace.and_then(|trace| trace.field("duration_ms")))
            .collect();
        assert_eq!(durations, vec![Some("10"), None, None, Some("10")]);
        assert_eq!(correlation.missing_traces(), 2);

        let unmatched: Vec<_> = correlation
            .unmatched
            .iter()
            .map(|trace| trace.field("duration_ms").unwrap())
            .collect();
        assert_eq!(unmatched, vec!["5", "6", "1"]);
    }

    #[test]
    fn test_table_shapes() {
        let traces = vec![
            TraceRecord::from_pairs(vec![
                ("response_id".to_string(), "a".to_string()),
                ("cold_start".to_string(), "1".to_string()),
            ]),
            TraceRecord::from_pairs(vec![("duration_ms".to_string(), "3".to_string())]),
        ];
        let fields = trace_fields(&traces);
        assert_eq!(fields, vec!["cold_start", "duration_ms"]);
        assert_eq!(trace_header(&fields), vec!["response_id", "cold_start", "duration_ms"]);
        assert_eq!(trace_row(&traces[1], &fields), vec!["", "", "3"]);

        let rows = vec![row(Some("a"), 200)];
        let correlation = correlate(&rows, &traces);
        let headers = vec![];
        let header = correlated_header(&headers, &fields);
        let cells = correlated_row(&correlation.merged[0], &headers, &fields);
        assert_eq!(header.len(), cells.len());
        assert_eq!(header[header.len() - 3], "concurrency");
        assert_eq!(&cells[cells.len() - 3..], &["2", "1", ""]);
    }
}
