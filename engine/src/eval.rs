use api::{
    AuxState, Batch, BatchMetrics, BenchErr, EvalSummary, ForwardPassMode, Params, RandomState,
    Result, Workload, pmean, reduce::fold_mean,
};
use log::{debug, info};
use ndarray::{ArrayView1, ArrayView2};

use crate::layout::StepLayout;

/// Evaluates the model on exactly `num_batches` batches.
///
/// The auxiliary state has to be synchronized beforehand, every replica reads the same copy.
/// Each batch is partitioned across the replicas, the per-replica metrics are averaged across
/// replicas and the per-batch metrics are averaged across batches.
///
/// # Arguments
/// * `workload` - The workload providing the model and the loss.
/// * `params` - The replicated parameters.
/// * `aux` - The synchronized auxiliary state.
/// * `batches` - The evaluation input, at least `num_batches` long.
/// * `num_batches` - The amount of batches to read, the rest of the input is left unread.
/// * `rng` - The model stream.
///
/// # Returns
/// The evaluation summary, or an error if the input runs short or the state has diverged.
pub fn evaluate<W, I>(
    workload: &W,
    params: &Params,
    aux: &AuxState,
    batches: I,
    num_batches: usize,
    rng: RandomState,
) -> Result<EvalSummary>
where
    W: Workload,
    I: IntoIterator<Item = Result<Batch>>,
{
    if num_batches == 0 {
        return Err(BenchErr::InvalidConfig(
            "the evaluation split doesn't fill a single batch".into(),
        ));
    }

    let pool = workload.pool();
    let replicas = pool.replicas();
    let layout = StepLayout::eval();
    layout.validate(
        replicas,
        &[("params", params.len()), ("aux_state", aux.len())],
    )?;

    let shared = aux.consistent()?;
    let mut batches = batches.into_iter();
    let mut mean = BatchMetrics {
        loss: 0.,
        accuracy: 0.,
    };
    let mut num_examples = 0;

    for (k, rng) in rng.split(num_batches).into_iter().enumerate() {
        let batch = batches.next().ok_or(BenchErr::InputExhausted {
            what: "evaluation input",
        })??;

        if batch.is_empty() {
            return Err(BenchErr::DataSource("empty evaluation batch".into()));
        }

        layout.validate(replicas, &[("batch", batch.len())])?;
        let inputs = batch.partition(replicas)?.into_iter().zip(rng.split(replicas)).collect();

        let metrics = pool.fan_out(inputs, |i, (shard, rng)| {
            let (logits, _) = workload.model_fn(
                params.replica(i),
                shard.inputs,
                shared,
                ForwardPassMode::Eval,
                rng,
                false,
            )?;

            Ok(BatchMetrics {
                loss: workload.loss_fn(shard.labels, logits.view())?,
                accuracy: accuracy(logits.view(), shard.labels),
            })
        })?;

        let batch_mean = pmean(&metrics)?;
        fold_mean(&mut mean.loss, batch_mean.loss, k);
        fold_mean(&mut mean.accuracy, batch_mean.accuracy, k);
        num_examples += batch.len();

        debug!(batch = k, loss = batch_mean.loss, accuracy = batch_mean.accuracy; "eval batch done");
    }

    info!(loss = mean.loss, accuracy = mean.accuracy, batches = num_batches; "evaluation done");

    Ok(EvalSummary {
        loss: mean.loss,
        accuracy: mean.accuracy,
        num_batches,
        num_examples,
    })
}

/// The fraction of rows whose largest logit is at the label's index.
pub fn accuracy(logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> f32 {
    if labels.is_empty() {
        return 0.;
    }

    let correct = logits
        .rows()
        .into_iter()
        .zip(labels)
        .filter(|(row, label)| argmax(*row) == Some(**label as usize))
        .count();

    correct as f32 / labels.len() as f32
}

fn argmax(row: ArrayView1<f32>) -> Option<usize> {
    row.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &x)| match best {
            Some((_, b)) if b >= x => best,
            _ => Some((i, x)),
        })
        .map(|(i, _)| i)
}
