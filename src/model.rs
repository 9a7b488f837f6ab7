//! # Forecast Model
//!
//! A small fully-connected regressor trained from scratch for every request.
//!
//! The network maps a normalized time position to a normalized metric value:
//!
//! ```text
//!   x ──► Dense(12, ReLU) ──► Dense(8, ReLU) ──► Dense(1, linear) ──► ŷ
//! ```
//!
//! Layers are `candle_nn` [`Linear`] modules chained in a [`Sequential`].
//! Weights use Glorot-uniform initialization with zero biases, drawn from the
//! caller's RNG so a fixed seed reproduces the model. Training minimizes mean
//! squared error with Adam over shuffled mini-batches, holding out the tail of
//! the series for validation. Nothing here is persisted: a
//! [`Network`] lives exactly as long as the request that built it.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{loss, seq, Activation, AdamW, Linear, Module, Optimizer, ParamsAdamW, Sequential};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::callbacks::EpochCallback;
use crate::error::{ForecastError, ForecastResult};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// Shape and optimizer settings for the forecast network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Widths of the hidden layers, input side first
    pub hidden_layers: Vec<usize>,
    /// Passes over the training data
    pub epochs: usize,
    pub learning_rate: f64,
    /// Upper bound on mini-batch size; smaller series use a single batch
    pub max_batch_size: usize,
    /// Fraction of samples, taken from the end of the series, held out for validation
    pub validation_split: f64,
    /// Fixed seed for initialization and shuffling; `None` draws from entropy
    pub seed: Option<u64>,
    /// Log the loss every N epochs (0 disables)
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![12, 8],
            epochs: 200,
            learning_rate: 0.01,
            max_batch_size: 32,
            validation_split: 0.2,
            seed: None,
            log_every: 50,
        }
    }
}

impl TrainingConfig {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Loss figures reported at the end of each epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
}

/// Outcome of a completed [`Network::fit`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub final_loss: f64,
    pub final_val_loss: Option<f64>,
    pub train_samples: usize,
    pub validation_samples: usize,
}

/// Optional progress hook and cancellation flag for a training run
#[derive(Clone, Default)]
pub struct FitHooks {
    pub on_epoch_end: Option<EpochCallback>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl FitHooks {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }
}

/// Glorot-uniform weights and zero biases for one dense layer
fn dense<R: Rng>(
    inputs: usize,
    outputs: usize,
    rng: &mut R,
    device: &Device,
) -> ForecastResult<(Linear, [Var; 2])> {
    let limit = (6.0 / (inputs + outputs) as f64).sqrt();
    let weights: Vec<f64> = (0..inputs * outputs)
        .map(|_| rng.gen_range(-limit..limit))
        .collect();
    let weight = Var::from_vec(weights, (outputs, inputs), device)?;
    let bias = Var::zeros(outputs, DType::F64, device)?;

    let layer = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));
    Ok((layer, [weight, bias]))
}

/// A single-input, single-output feed-forward regressor
pub struct Network {
    model: Sequential,
    vars: Vec<Var>,
    layer_sizes: Vec<usize>,
    device: Device,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("layer_sizes", &self.layer_sizes)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Hidden layers use ReLU; the output unit is linear
    pub fn new<R: Rng>(hidden_layers: &[usize], rng: &mut R) -> ForecastResult<Self> {
        if let Some(index) = hidden_layers.iter().position(|&width| width == 0) {
            return Err(ForecastError::training(format!(
                "Hidden layer {} has zero width",
                index
            )));
        }

        let device = Device::Cpu;
        let mut model = seq();
        let mut vars = Vec::with_capacity(2 * (hidden_layers.len() + 1));
        let mut inputs = 1;
        for &width in hidden_layers {
            let (layer, params) = dense(inputs, width, rng, &device)?;
            model = model.add(layer).add(Activation::Relu);
            vars.extend(params);
            inputs = width;
        }
        let (output, params) = dense(inputs, 1, rng, &device)?;
        model = model.add(output);
        vars.extend(params);

        let mut layer_sizes = hidden_layers.to_vec();
        layer_sizes.push(1);

        Ok(Self {
            model,
            vars,
            layer_sizes,
            device,
        })
    }

    /// Layer widths, input side first, output layer included
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layer_sizes.clone()
    }

    fn column(&self, values: Vec<f64>) -> ForecastResult<Tensor> {
        let rows = values.len();
        Ok(Tensor::from_vec(values, (rows, 1), &self.device)?)
    }

    fn tensors(&self, samples: &[(f64, f64)]) -> ForecastResult<(Tensor, Tensor)> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = samples.iter().copied().unzip();
        Ok((self.column(xs)?, self.column(ys)?))
    }

    fn loss(&self, xs: &Tensor, ys: &Tensor) -> ForecastResult<Tensor> {
        Ok(loss::mse(&self.model.forward(xs)?, ys)?)
    }

    /// Predict every position, rejecting non-finite output
    pub fn predict(&self, positions: &[f64]) -> ForecastResult<Vec<f64>> {
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        let xs = self.column(positions.to_vec())?;
        let ys = self.model.forward(&xs)?.flatten_all()?.to_vec1::<f64>()?;

        match ys.iter().position(|y| !y.is_finite()) {
            Some(i) => Err(ForecastError::training(format!(
                "Inference produced a non-finite value at x = {:.4}",
                positions[i]
            ))),
            None => Ok(ys),
        }
    }

    pub fn mean_squared_error(&self, samples: &[(f64, f64)]) -> ForecastResult<f64> {
        if samples.is_empty() {
            return Ok(0.0);
        }
        let (xs, ys) = self.tensors(samples)?;
        Ok(self.loss(&xs, &ys)?.to_scalar::<f64>()?)
    }

    /// Train on `(x, y)` pairs in series order.
    ///
    /// The last `validation_split` share of the samples is held out and only
    /// scored. If the split would leave nothing to train on, every sample is
    /// used for training.
    pub fn fit(
        &mut self,
        samples: &[(f64, f64)],
        config: &TrainingConfig,
        rng: &mut StdRng,
        hooks: &FitHooks,
    ) -> ForecastResult<TrainingSummary> {
        if samples.is_empty() {
            return Err(ForecastError::training("No samples to train on"));
        }
        if !(config.learning_rate > 0.0) {
            return Err(ForecastError::training("Learning rate must be positive"));
        }

        let split_at =
            (samples.len() as f64 * (1.0 - config.validation_split.clamp(0.0, 1.0))).floor() as usize;
        let split_at = if split_at == 0 {
            samples.len()
        } else {
            split_at.min(samples.len())
        };
        let (train, validation) = samples.split_at(split_at);
        let held_out = if validation.is_empty() {
            None
        } else {
            Some(self.tensors(validation)?)
        };
        let validation_loss = |network: &Self| -> ForecastResult<Option<f64>> {
            match &held_out {
                Some((xs, ys)) => Ok(Some(network.loss(xs, ys)?.to_scalar::<f64>()?)),
                None => Ok(None),
            }
        };

        let batch_size = config.max_batch_size.min(train.len()).max(1);
        let params = ParamsAdamW {
            lr: config.learning_rate,
            beta1: ADAM_BETA1,
            beta2: ADAM_BETA2,
            eps: ADAM_EPSILON,
            weight_decay: 0.0,
        };
        let mut optimizer = AdamW::new(self.vars.clone(), params)?;
        let mut order: Vec<usize> = (0..train.len()).collect();

        let mut summary = TrainingSummary {
            epochs_run: 0,
            final_loss: self.mean_squared_error(train)?,
            final_val_loss: validation_loss(self)?,
            train_samples: train.len(),
            validation_samples: validation.len(),
        };

        for epoch in 0..config.epochs {
            if hooks.is_cancelled() {
                return Err(ForecastError::training(format!(
                    "Training cancelled after {} epochs",
                    epoch
                )));
            }

            order.shuffle(rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                let (xs, ys) = self.tensors(&batch.iter().map(|&i| train[i]).collect::<Vec<_>>())?;
                let batch_loss = self.loss(&xs, &ys)?;
                optimizer.backward_step(&batch_loss)?;
                epoch_loss += batch_loss.to_scalar::<f64>()? * batch.len() as f64;
            }

            let loss = epoch_loss / train.len() as f64;
            let val_loss = validation_loss(self)?;
            if !loss.is_finite() || val_loss.map_or(false, |v| !v.is_finite()) {
                return Err(ForecastError::training(format!(
                    "Loss diverged at epoch {}",
                    epoch
                )));
            }

            let stats = EpochStats {
                epoch,
                loss,
                val_loss,
            };
            if config.log_every > 0 && epoch % config.log_every == 0 {
                debug!("Epoch {}: loss = {:.4}", epoch, loss);
            }
            if let Some(callback) = &hooks.on_epoch_end {
                callback(&stats);
            }

            summary.epochs_run = epoch + 1;
            summary.final_loss = loss;
            summary.final_val_loss = val_loss;
        }

        Ok(summary)
    }
}
