//! Synthetic sample generation from the function definitions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::{EventKind, ExperimentConfig};
use crate::error::{CoreError, CoreResult};
use crate::request::{QueryParams, RequestRecord};

/// Expand every function's samples into request templates.
fn request_pool(config: &ExperimentConfig) -> Vec<RequestRecord> {
    match config.event {
        EventKind::Https => config
            .functions
            .iter()
            .flat_map(|function| {
                function.samples.iter().map(move |sample| RequestRecord {
                    function_name: function.name.clone(),
                    endpoint: function.endpoint.clone(),
                    path: sample.path.clone(),
                    method: sample.method.to_uppercase(),
                    query: sample
                        .query_string
                        .as_ref()
                        .map(QueryParams::from_json_map)
                        .unwrap_or_default(),
                    body: sample.body.clone(),
                })
            })
            .collect(),
    }
}

/// Draw `data_size` requests uniformly, with replacement, seeded by
/// `random_seed`. The same configuration always yields the same sample.
pub fn generate_sample(config: &ExperimentConfig) -> CoreResult<Vec<RequestRecord>> {
    info!(
        data_size = config.data_size,
        random_seed = config.random_seed,
        "Test data generation has started"
    );

    let pool = request_pool(config);
    if pool.is_empty() {
        return Err(CoreError::validation("error parsing samples: no request templates"));
    }

    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let sample: Vec<RequestRecord> = (0..config.data_size)
        .map(|_| pool[rng.gen_range(0..pool.len())].clone())
        .collect();

    info!(templates = pool.len(), size = sample.len(), "Test data generation completed");
    Ok(sample)
}
