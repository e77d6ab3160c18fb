use serde::{Deserialize, Serialize};

use super::{Sequential, layers::Layer};

/// The reference architectures a workload can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    /// A single dense layer, no auxiliary state.
    Linear,
    /// Dense, batch norm and relu with a hidden width of 32, followed by the output layer.
    #[default]
    BnMlpSmall,
    /// Same as `BnMlpSmall` with a hidden width of 256.
    BnMlpLarge,
}

impl ModelId {
    /// Builds the architecture registered under this id.
    ///
    /// # Arguments
    /// * `in_features` - The size of a flattened input example.
    /// * `num_classes` - The amount of output logits.
    ///
    /// # Returns
    /// The untrained model.
    pub fn build(self, in_features: usize, num_classes: usize) -> Sequential {
        match self {
            ModelId::Linear => Sequential::new([Layer::dense("Dense_0", (in_features, num_classes))]),
            ModelId::BnMlpSmall => bn_mlp(in_features, 32, num_classes),
            ModelId::BnMlpLarge => bn_mlp(in_features, 256, num_classes),
        }
    }
}

fn bn_mlp(in_features: usize, hidden: usize, num_classes: usize) -> Sequential {
    Sequential::new([
        Layer::dense("Dense_0", (in_features, hidden)),
        Layer::batch_norm("BatchNorm_0", hidden),
        Layer::relu(),
        Layer::dense("Dense_1", (hidden, num_classes)),
    ])
}
