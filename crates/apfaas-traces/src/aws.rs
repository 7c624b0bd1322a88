//! AWS provider: Lambda Insights records through CloudWatch Logs Insights.

use std::sync::Arc;

use apfaas_core::{Credentials, RunManifest, TraceSettings};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatchlogs::config::Credentials as StaticCredentials;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::QueryStatus as AwsQueryStatus;
use aws_sdk_cloudwatchlogs::Client;
use tracing::info;

use crate::error::{TraceError, TraceResult};
use crate::provider::{TraceProvider, TraceProviderFactory};
use crate::query::{run_windows, LogQueryClient, QueryRequest, QueryResults, QueryStatus, QueryWindowRunner};
use crate::record::TraceRecord;
use crate::window::partition_windows;

/// Fields selected from each Lambda Insights performance event.
const INSIGHTS_FIELDS: &str = "request_id as response_id, \
     duration as duration_ms, \
     memory_utilization as memory_utilization_percentage, \
     total_memory, \
     cpu_total_time as cpu_total_time_ms, \
     total_network as total_network_bytes, \
     billed_mb_ms, \
     billed_mb_ms / 1000 / 1000 as invoke_cost_gb_per_second, \
     cold_start, \
     init_duration as init_duration_ms, \
     version, \
     shutdown, \
     shutdown_reason";

/// Logs Insights query selecting the performance events of `functions`.
pub fn insights_query(functions: &[String]) -> String {
    let names = functions
        .iter()
        .map(|name| format!("'{}'", name.replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "filter event_type = 'performance' and function_name in [{}] | fields {} | sort @timestamp desc",
        names, INSIGHTS_FIELDS
    )
}

/// CloudWatch Logs client.
pub struct CloudWatchLogsClient {
    client: Client,
}

impl CloudWatchLogsClient {
    /// Connect with a named profile or a static key pair.
    pub async fn connect(credentials: Option<&Credentials>, region: &str) -> TraceResult<Self> {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));

        let loader = match credentials {
            Some(Credentials::Profile { profile }) => loader.profile_name(profile),
            Some(Credentials::Keys {
                access_key,
                secret_key,
            }) => loader.credentials_provider(StaticCredentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "apfaas-static",
            )),
            None => return Err(TraceError::MissingCredentials),
        };

        let sdk_config = loader.load().await;
        info!(region = %region, "Connected to AWS CloudWatch Logs");

        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }
}

#[async_trait]
impl LogQueryClient for CloudWatchLogsClient {
    async fn start_query(&self, request: &QueryRequest) -> TraceResult<String> {
        let response = self
            .client
            .start_query()
            .log_group_name(&request.log_group)
            .start_time(request.start)
            .end_time(request.end)
            .query_string(&request.query)
            .limit(i32::try_from(request.limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| TraceError::Query(DisplayErrorContext(&e).to_string()))?;

        response
            .query_id()
            .map(str::to_string)
            .ok_or_else(|| TraceError::Query("start_query returned no query id".to_string()))
    }

    async fn query_results(&self, query_id: &str) -> TraceResult<QueryResults> {
        let response = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| TraceError::Query(DisplayErrorContext(&e).to_string()))?;

        let status = match response.status() {
            Some(AwsQueryStatus::Scheduled) => QueryStatus::Scheduled,
            Some(AwsQueryStatus::Running) => QueryStatus::Running,
            Some(AwsQueryStatus::Complete) => QueryStatus::Complete,
            Some(AwsQueryStatus::Failed) => QueryStatus::Failed,
            Some(AwsQueryStatus::Cancelled) => QueryStatus::Cancelled,
            Some(AwsQueryStatus::Timeout) => QueryStatus::Timeout,
            _ => QueryStatus::Unknown,
        };

        let records = response
            .results()
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|field| {
                        field
                            .field()
                            .map(|name| (name.to_string(), field.value().unwrap_or_default().to_string()))
                    })
                    .collect()
            })
            .collect();

        Ok(QueryResults { status, records })
    }
}

/// Lambda Insights traces of one run.
pub struct LambdaInsightsProvider {
    client: Arc<dyn LogQueryClient>,
    query: String,
    settings: TraceSettings,
    /// Epoch seconds, floored
    start: i64,
    /// Padded run end, epoch seconds, ceiled
    end: i64,
}

impl LambdaInsightsProvider {
    pub fn new(
        client: Arc<dyn LogQueryClient>,
        functions: &[String],
        manifest: &RunManifest,
        settings: &TraceSettings,
    ) -> Self {
        let results = &manifest.experimental_results;
        let start = results.start_time.floor() as i64;
        let end = (results.end_time + settings.lag_padding().as_secs_f64()).ceil() as i64;

        info!(
            from = %manifest.start().format("%m/%d/%Y %H:%M:%S"),
            to = %(manifest.end() + chrono::Duration::seconds(settings.lag_padding_secs as i64))
                .format("%m/%d/%Y %H:%M:%S"),
            "Trace span"
        );

        Self {
            client,
            query: insights_query(functions),
            settings: settings.clone(),
            start,
            end,
        }
    }

    /// Queried span `[start, end)` in epoch seconds.
    pub fn span(&self) -> (i64, i64) {
        (self.start, self.end)
    }
}

#[async_trait]
impl TraceProvider for LambdaInsightsProvider {
    async fn get_traces_per_request(
        &self,
        limit: usize,
        resolution: u64,
    ) -> TraceResult<Vec<TraceRecord>> {
        info!(requests = limit, "Extracting traces from Lambda Insights");

        let windows = partition_windows(self.start, self.end, resolution);
        info!(windows = windows.len(), "Interval(s) to find the records");

        let runner = Arc::new(QueryWindowRunner::new(
            Arc::clone(&self.client),
            self.query.clone(),
            &self.settings,
        ));
        run_windows(
            runner,
            windows,
            self.settings.max_parallel_queries,
            self.settings.submit_interval(),
        )
        .await
    }
}

/// Factory registered as `aws`.
pub struct AwsTraceFactory;

#[async_trait]
impl TraceProviderFactory for AwsTraceFactory {
    async fn create(
        &self,
        functions: Vec<String>,
        manifest: &RunManifest,
        settings: &TraceSettings,
    ) -> TraceResult<Box<dyn TraceProvider>> {
        let config = &manifest.config;
        let credentials = config
            .credentials
            .as_ref()
            .ok_or(TraceError::MissingCredentials)?;
        let client = CloudWatchLogsClient::connect(Some(credentials), &config.region).await?;

        Ok(Box::new(LambdaInsightsProvider::new(
            Arc::new(client),
            &functions,
            manifest,
            settings,
        )))
    }
}
