use std::{env, fs::File, num::NonZeroUsize, path::PathBuf, sync::Arc};

use algoperf::RunnerConfig;
use anyhow::Context;
use api::{Hyperparameters, RandomState, ReplicaPool};
use log::info;
use submissions::NesterovSubmission;
use workloads::{DatasetId, ImagenetWorkload, WorkloadConfig};

const DEFAULT_HPARAMS: Hyperparameters = Hyperparameters {
    learning_rate: 0.1,
    momentum: 0.9,
    l2: 5e-5,
    warmup_epochs: 5,
    num_epochs: 100,
};

/// Reads an optional environment variable, parsing it when present.
fn var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {key}: `{value}`")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("unreadable {key}")),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let hparams = match var::<PathBuf>("ALGOPERF_HPARAMS")? {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Hyperparameters::from_json(file)?
        }
        None => DEFAULT_HPARAMS,
    };

    let mut workload_config = match var::<PathBuf>("ALGOPERF_WORKLOAD_CONFIG")? {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            WorkloadConfig::from_json(file)?
        }
        None => WorkloadConfig::default(),
    };
    if let Some(dataset) = var::<DatasetId>("ALGOPERF_DATASET")? {
        workload_config.dataset = dataset;
    }

    let seed = var::<u64>("ALGOPERF_SEED")?.unwrap_or(0);
    let pool = match var::<NonZeroUsize>("ALGOPERF_REPLICAS")? {
        Some(replicas) => ReplicaPool::new(replicas)?,
        None => ReplicaPool::from_available_parallelism()?,
    };

    let config = RunnerConfig {
        data_dir: var("ALGOPERF_DATA_DIR")?.unwrap_or_else(|| PathBuf::from(".")),
        max_steps: var("ALGOPERF_MAX_STEPS")?,
        ..RunnerConfig::default()
    };

    info!(
        dataset = workload_config.dataset.name(),
        replicas = pool.replicas(),
        seed = seed;
        "algoperf runner"
    );

    let workload = ImagenetWorkload::synthetic(workload_config, Arc::new(pool), seed)?;
    let report = algoperf::run(
        workload,
        &NesterovSubmission::default(),
        &hparams,
        RandomState::from_seed(seed),
        &config,
    )?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
