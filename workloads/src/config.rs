use std::{io::Read, time::Duration};

use api::{BenchErr, Result};
use machine_learning::ModelId;
use serde::{Deserialize, Serialize};

/// The dataset an ImageNet workload trains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    #[default]
    Imagenet2012,
    Imagenette,
}

impl DatasetId {
    pub fn name(self) -> &'static str {
        match self {
            DatasetId::Imagenet2012 => "imagenet2012",
            DatasetId::Imagenette => "imagenette",
        }
    }

    pub fn num_classes(self) -> usize {
        match self {
            DatasetId::Imagenet2012 => 1000,
            DatasetId::Imagenette => 10,
        }
    }

    pub fn num_train_examples(self) -> usize {
        match self {
            DatasetId::Imagenet2012 => 1_271_167,
            DatasetId::Imagenette => 9_469,
        }
    }

    pub fn num_eval_examples(self) -> usize {
        match self {
            DatasetId::Imagenet2012 => 100_000,
            DatasetId::Imagenette => 3_925,
        }
    }

    pub fn max_allowed_runtime(self) -> Duration {
        match self {
            DatasetId::Imagenet2012 => Duration::from_secs(111_600),
            DatasetId::Imagenette => Duration::from_secs(3_600),
        }
    }

    pub fn eval_period(self) -> Duration {
        match self {
            DatasetId::Imagenet2012 => Duration::from_secs(6_000),
            DatasetId::Imagenette => Duration::from_secs(30),
        }
    }
}

impl std::str::FromStr for DatasetId {
    type Err = BenchErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imagenet2012" => Ok(DatasetId::Imagenet2012),
            "imagenette" => Ok(DatasetId::Imagenette),
            other => Err(BenchErr::InvalidConfig(format!("unknown dataset `{other}`"))),
        }
    }
}

fn default_input_shape() -> [usize; 3] {
    [16, 16, 3]
}

/// The knobs of an ImageNet workload.
///
/// The example counts default to the ones of the dataset, they can be overridden to run on a
/// subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default)]
    pub dataset: DatasetId,
    #[serde(default)]
    pub model: ModelId,
    /// Height, width and channels of an input image.
    #[serde(default = "default_input_shape")]
    pub input_shape: [usize; 3],
    #[serde(default)]
    pub num_train_examples: Option<usize>,
    #[serde(default)]
    pub num_eval_examples: Option<usize>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetId::default(),
            model: ModelId::default(),
            input_shape: default_input_shape(),
            num_train_examples: None,
            num_eval_examples: None,
        }
    }
}

impl WorkloadConfig {
    pub fn new(dataset: DatasetId) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    /// Reads and validates a config from a json document.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_shape.contains(&0) {
            return Err(BenchErr::InvalidConfig(format!(
                "input shape {:?} has an empty axis",
                self.input_shape
            )));
        }

        if self.input_shape[2] != 3 {
            return Err(BenchErr::InvalidConfig(format!(
                "images must have 3 channels, got {}",
                self.input_shape[2]
            )));
        }

        if self.num_train_examples == Some(0) || self.num_eval_examples == Some(0) {
            return Err(BenchErr::InvalidConfig("example counts must be positive".into()));
        }

        Ok(())
    }

    /// The size of a flattened input image.
    pub fn features(&self) -> usize {
        self.input_shape.iter().product()
    }

    pub fn num_train_examples(&self) -> usize {
        self.num_train_examples
            .unwrap_or_else(|| self.dataset.num_train_examples())
    }

    pub fn num_eval_examples(&self) -> usize {
        self.num_eval_examples
            .unwrap_or_else(|| self.dataset.num_eval_examples())
    }
}
