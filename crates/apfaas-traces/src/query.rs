//! Query Window Runner and the parallel window driver.
//!
//! A window query is submitted once and polled with a small, fixed budget.
//! Whatever the backend holds when the budget runs out is accepted.

use std::sync::Arc;
use std::time::Duration;

use apfaas_core::TraceSettings;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{TraceError, TraceResult};
use crate::record::TraceRecord;
use crate::window::TimeWindow;

/// One structured query over a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub log_group: String,
    pub query: String,
    /// Epoch seconds, inclusive
    pub start: i64,
    /// Epoch seconds
    pub end: i64,
    /// Page size requested from the backend
    pub limit: usize,
}

/// Backend-reported state of a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    Unknown,
}

impl QueryStatus {
    /// Still worth polling.
    pub fn is_pending(self) -> bool {
        matches!(self, QueryStatus::Scheduled | QueryStatus::Running)
    }
}

/// Raw rows of a query as field/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResults {
    pub status: QueryStatus,
    pub records: Vec<Vec<(String, String)>>,
}

impl Default for QueryResults {
    fn default() -> Self {
        Self {
            status: QueryStatus::Unknown,
            records: Vec::new(),
        }
    }
}

/// Log store able to run structured queries.
#[async_trait]
pub trait LogQueryClient: Send + Sync {
    /// Submit a query, returning its opaque identifier.
    async fn start_query(&self, request: &QueryRequest) -> TraceResult<String>;

    /// Current status and rows of a submitted query.
    async fn query_results(&self, query_id: &str) -> TraceResult<QueryResults>;
}

/// Runs one query per window against a [`LogQueryClient`].
pub struct QueryWindowRunner {
    client: Arc<dyn LogQueryClient>,
    log_group: String,
    query: String,
    page_cap: usize,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl QueryWindowRunner {
    pub fn new(
        client: Arc<dyn LogQueryClient>,
        query: impl Into<String>,
        settings: &TraceSettings,
    ) -> Self {
        Self {
            client,
            log_group: settings.log_group.clone(),
            query: query.into(),
            page_cap: settings.page_cap,
            poll_attempts: settings.poll_attempts,
            poll_interval: settings.poll_interval(),
        }
    }

    /// Query one window. Capped and still-running results are returned
    /// as they are.
    pub async fn run(&self, window: TimeWindow) -> TraceResult<Vec<TraceRecord>> {
        let request = QueryRequest {
            log_group: self.log_group.clone(),
            query: self.query.clone(),
            start: window.start,
            end: window.end,
            limit: self.page_cap,
        };

        let query_id = self.client.start_query(&request).await?;
        debug!(query_id = %query_id, window = %window, "Query submitted");

        let mut results = QueryResults::default();
        let mut retries = 0;
        while retries < self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            results = self.client.query_results(&query_id).await?;
            if !results.status.is_pending() {
                break;
            }
            retries += 1;
        }

        info!(
            query_id = %query_id,
            window = %window,
            records = results.records.len(),
            retries,
            "Query window finished"
        );

        match results.status {
            QueryStatus::Complete => {}
            status if status.is_pending() => warn!(
                query_id = %query_id,
                "Query still running after {} poll(s), keeping partial results",
                self.poll_attempts
            ),
            status => warn!(query_id = %query_id, status = ?status, "Query did not complete"),
        }

        if results.records.len() >= self.page_cap {
            warn!(
                query_id = %query_id,
                records = results.records.len(),
                "Record count reached the page cap of {}; try again with a lower resolution",
                self.page_cap
            );
        }

        Ok(results
            .records
            .into_iter()
            .map(TraceRecord::from_pairs)
            .collect())
    }
}

/// Query every window with at most `max_parallel` queries in flight,
/// submitting one window per `submit_interval`. Rows are concatenated in
/// window order.
pub async fn run_windows(
    runner: Arc<QueryWindowRunner>,
    windows: Vec<TimeWindow>,
    max_parallel: usize,
    submit_interval: Duration,
) -> TraceResult<Vec<TraceRecord>> {
    let total = windows.len();
    info!(windows = total, max_parallel, "Querying trace windows");

    let gate = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut tasks = JoinSet::new();

    for (index, window) in windows.into_iter().enumerate() {
        let gate = Arc::clone(&gate);
        let runner = Arc::clone(&runner);
        tasks.spawn(async move {
            let _permit = gate
                .acquire_owned()
                .await
                .map_err(|e| TraceError::Join(e.to_string()))?;
            debug!(window = index + 1, total, "Window query started");
            runner.run(window).await.map(|records| (index, records))
        });

        if index + 1 < total && !submit_interval.is_zero() {
            tokio::time::sleep(submit_interval).await;
        }
    }

    let outcome = collect_windows(&mut tasks, total).await;
    tasks.shutdown().await;
    outcome
}

async fn collect_windows(
    tasks: &mut JoinSet<TraceResult<(usize, Vec<TraceRecord>)>>,
    total: usize,
) -> TraceResult<Vec<TraceRecord>> {
    let mut per_window: Vec<Vec<TraceRecord>> = vec![Vec::new(); total];
    while let Some(joined) = tasks.join_next().await {
        let (index, records) = joined.map_err(|e| TraceError::Join(e.to_string()))??;
        per_window[index] = records;
    }
    Ok(per_window.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves scripted statuses; each query returns one row tagged with its window start.
    #[derive(Default)]
    struct ScriptedClient {
        statuses: Vec<QueryStatus>,
        state: Mutex<ClientState>,
    }

    #[derive(Default)]
    struct ClientState {
        requests: Vec<QueryRequest>,
        polls: HashMap<String, usize>,
        open: usize,
        peak_open: usize,
    }

    impl ScriptedClient {
        fn with_statuses(statuses: Vec<QueryStatus>) -> Self {
            Self {
                statuses,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LogQueryClient for ScriptedClient {
        async fn start_query(&self, request: &QueryRequest) -> TraceResult<String> {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state.open += 1;
            state.peak_open = state.peak_open.max(state.open);
            Ok(request.start.to_string())
        }

        async fn query_results(&self, query_id: &str) -> TraceResult<QueryResults> {
            let mut state = self.state.lock().unwrap();
            let poll = {
                let polls = state.polls.entry(query_id.to_string()).or_insert(0);
                *polls += 1;
                *polls
            };
            let status = self
                .statuses
                .get(poll - 1)
                .copied()
                .unwrap_or(QueryStatus::Complete);
            if !status.is_pending() || poll == 3 {
                state.open -= 1;
            }
            Ok(QueryResults {
                status,
                records: vec![vec![
                    ("response_id".to_string(), format!("rid-{}", query_id)),
                    ("duration_ms".to_string(), "10".to_string()),
                ]],
            })
        }
    }

    fn runner(client: Arc<ScriptedClient>) -> QueryWindowRunner {
        QueryWindowRunner::new(client, "fields @timestamp", &TraceSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_complete() {
        let client = Arc::new(ScriptedClient::with_statuses(vec![
            QueryStatus::Scheduled,
            QueryStatus::Running,
            QueryStatus::Complete,
        ]));

        let records = runner(client.clone()).run(TimeWindow::new(30, 60)).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correlation_id.as_deref(), Some("rid-30"));
        let state = client.state.lock().unwrap();
        assert_eq!(state.polls["30"], 3);
        assert_eq!(state.requests[0].log_group, "/aws/lambda-insights");
        assert_eq!(state.requests[0].limit, 10_000);
        assert_eq!((state.requests[0].start, state.requests[0].end), (30, 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_query_is_accepted_after_budget() {
        let client = Arc::new(ScriptedClient::with_statuses(vec![QueryStatus::Running; 10]));

        let records = runner(client.clone()).run(TimeWindow::new(0, 30)).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(client.state.lock().unwrap().polls["0"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_bounded_and_ordered() {
        let client = Arc::new(ScriptedClient::with_statuses(vec![
            QueryStatus::Running,
            QueryStatus::Complete,
        ]));
        let runner = Arc::new(runner(client.clone()));
        let windows = crate::window::partition_windows(0, 150, 30);

        let records = run_windows(runner, windows, 2, Duration::from_millis(500))
            .await
            .unwrap();

        let ids: Vec<_> = records
            .iter()
            .map(|record| record.correlation_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["rid-0", "rid-30", "rid-60", "rid-90", "rid-120"]);

        let state = client.state.lock().unwrap();
        assert_eq!(state.requests.len(), 5);
        assert!(state.peak_open <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_is_fatal() {
        struct Broken;

        #[async_trait]
        impl LogQueryClient for Broken {
            async fn start_query(&self, _request: &QueryRequest) -> TraceResult<String> {
                Err(TraceError::Query("throttled".to_string()))
            }

            async fn query_results(&self, _query_id: &str) -> TraceResult<QueryResults> {
                unreachable!()
            }
        }

        let runner = Arc::new(QueryWindowRunner::new(
            Arc::new(Broken),
            "fields @timestamp",
            &TraceSettings::default(),
        ));
        let err = run_windows(runner, vec![TimeWindow::new(0, 30)], 20, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceError::Query(_)));
    }
}
