use std::{collections::BTreeMap, io::Read};

use serde::{Deserialize, Serialize};

use crate::{BenchErr, Result};

/// The hyperparameters of a run, supplied once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate: f32,
    pub momentum: f32,
    /// The weight decay coefficient.
    pub l2: f32,
    pub warmup_epochs: usize,
    pub num_epochs: usize,
}

impl Hyperparameters {
    /// Reads and validates hyperparameters from a json document.
    ///
    /// # Arguments
    /// * `reader` - The source of the json document.
    ///
    /// # Returns
    /// The parsed hyperparameters or an error if they are malformed or out of range.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let hparams: Self = serde_json::from_reader(reader)?;
        hparams.validate()?;
        Ok(hparams)
    }

    /// Checks every field is inside its domain.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(BenchErr::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if !(0. ..1.).contains(&self.momentum) {
            return Err(BenchErr::InvalidConfig(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }

        if !(self.l2.is_finite() && self.l2 >= 0.) {
            return Err(BenchErr::InvalidConfig(format!(
                "l2 must be non negative, got {}",
                self.l2
            )));
        }

        if self.num_epochs == 0 {
            return Err(BenchErr::InvalidConfig("num_epochs must be positive".into()));
        }

        Ok(())
    }
}

/// Whether a forward pass runs for training or for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPassMode {
    /// Stochastic behaviours enabled, auxiliary state may be updated.
    Train,
    /// Deterministic, auxiliary state held fixed.
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    SoftmaxCrossEntropy,
    SigmoidCrossEntropy,
    MeanSquaredError,
}

/// The role a parameter leaf plays inside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Weight,
    Bias,
    BatchNormScale,
    BatchNormBias,
}

/// Leaf path to parameter role.
pub type ParameterTypeTree = BTreeMap<String, ParameterType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}
