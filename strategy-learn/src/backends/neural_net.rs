//! Multilayer perceptron classifier.
//!
//! ReLU hidden layers and a linear output scored with softmax cross-entropy,
//! trained with mini-batch AdamW on the CPU. Inputs are standardized with the
//! training mean and deviation, which are stored with the weights.

use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{loss, AdamW, Linear, Module, Optimizer, ParamsAdamW};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::{LearnerKind, NeuralNetConfig};
use crate::error::{LearnError, LearnResult};
use crate::learner::{
    check_features, check_training_data, load_model, save_json, softmax, Learner,
};

impl From<candle_core::Error> for LearnError {
    fn from(e: candle_core::Error) -> Self {
        LearnError::Tensor(e.to_string())
    }
}

/// Serialized layer, weights row-major `n_out × n_in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayerParams {
    n_in: usize,
    n_out: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Model {
    kind: LearnerKind,
    n_input: usize,
    n_classes: usize,
    n_train: usize,
    mean: Vec<f64>,
    scale: Vec<f64>,
    layers: Vec<LayerParams>,
}

/// Dense layers with ReLU in between; the output layer returns logits.
#[derive(Debug, Clone)]
struct Network {
    layers: Vec<Linear>,
}

impl Network {
    fn from_params(params: &[LayerParams], device: &Device) -> LearnResult<Self> {
        let mut layers = Vec::with_capacity(params.len());
        for p in params {
            let weight = Tensor::from_vec(p.weights.clone(), (p.n_out, p.n_in), device)?;
            let bias = Tensor::from_vec(p.bias.clone(), p.n_out, device)?;
            layers.push(Linear::new(weight, Some(bias)));
        }
        Ok(Self { layers })
    }

    fn to_params(&self) -> LearnResult<Vec<LayerParams>> {
        let mut params = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (n_out, n_in) = layer.weight().dims2()?;
            let bias = match layer.bias() {
                Some(b) => b.to_vec1::<f32>()?,
                None => vec![0.0; n_out],
            };
            params.push(LayerParams {
                n_in,
                n_out,
                weights: layer.weight().flatten_all()?.to_vec1::<f32>()?,
                bias,
            });
        }
        Ok(params)
    }
}

impl Module for Network {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = xs.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h)?;
            if l + 1 < self.layers.len() {
                h = h.relu()?;
            }
        }
        Ok(h)
    }
}

/// He-initialized network drawn from `rng`, with its trainable variables.
fn init_network(
    sizes: &[usize],
    rng: &mut ChaCha8Rng,
    device: &Device,
) -> LearnResult<(Network, Vec<Var>)> {
    let mut layers = Vec::with_capacity(sizes.len().saturating_sub(1));
    let mut vars = Vec::with_capacity(2 * layers.capacity());
    for w in sizes.windows(2) {
        let (n_in, n_out) = (w[0], w[1]);
        let gain = (2.0 / n_in.max(1) as f64).sqrt();
        let init: Vec<f32> = (0..n_in * n_out)
            .map(|_| (gain * rng.sample::<f64, _>(StandardNormal)) as f32)
            .collect();
        let weight = Var::from_tensor(&Tensor::from_vec(init, (n_out, n_in), device)?)?;
        let bias = Var::zeros(n_out, DType::F32, device)?;
        layers.push(Linear::new(
            weight.as_tensor().clone(),
            Some(bias.as_tensor().clone()),
        ));
        vars.push(weight);
        vars.push(bias);
    }
    Ok((Network { layers }, vars))
}

/// Row-major batch of standardized rows.
fn batch(rows: &[&Vec<f64>], mean: &[f64], scale: &[f64], device: &Device) -> LearnResult<Tensor> {
    let d = mean.len();
    let mut data = Vec::with_capacity(rows.len() * d);
    for row in rows {
        for ((v, m), s) in row.iter().zip(mean).zip(scale) {
            data.push(((v - m) / s) as f32);
        }
    }
    Ok(Tensor::from_vec(data, (rows.len(), d), device)?)
}

/// MLP strategy classifier.
pub struct NeuralNet {
    config: NeuralNetConfig,
    n_input: usize,
    n_classes: usize,
    n_best: usize,
    device: Device,
    model: Option<Model>,
    network: Option<Network>,
}

impl NeuralNet {
    /// Untrained network for `n_input` features and `n_classes` labels.
    pub fn new(config: NeuralNetConfig, n_input: usize, n_classes: usize, n_best: usize) -> Self {
        Self {
            config,
            n_input,
            n_classes,
            n_best,
            device: Device::Cpu,
            model: None,
            network: None,
        }
    }
}

impl Learner for NeuralNet {
    fn kind(&self) -> LearnerKind {
        LearnerKind::NeuralNet
    }

    fn train(&mut self, features: &[Vec<f64>], labels: &[usize]) -> LearnResult<()> {
        check_training_data(features, labels, self.n_input, self.n_classes)?;
        let n = features.len();
        let d = self.n_input;
        let config = &self.config;
        log::info!(
            "Training neural net {:?} on {} samples, {} classes ({} epochs)",
            config.hidden_layers,
            n,
            self.n_classes,
            config.epochs
        );

        // Standardization
        let mut mean = vec![0.0; d];
        for row in features {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n as f64;
            }
        }
        let mut scale = vec![0.0; d];
        for row in features {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m) / n as f64;
            }
        }
        for s in scale.iter_mut() {
            *s = if *s > 1e-24 { s.sqrt() } else { 1.0 };
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut sizes = vec![d];
        sizes.extend(config.hidden_layers.iter().copied());
        sizes.push(self.n_classes);
        let (network, vars) = init_network(&sizes, &mut rng, &self.device)?;

        let params = ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut opt = AdamW::new(vars, params)?;

        let mut order: Vec<usize> = (0..n).collect();
        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for chunk in order.chunks(config.batch_size) {
                let rows: Vec<&Vec<f64>> = chunk.iter().map(|&i| &features[i]).collect();
                let xs = batch(&rows, &mean, &scale, &self.device)?;
                let targets: Vec<u32> = chunk.iter().map(|&i| labels[i] as u32).collect();
                let ys = Tensor::from_vec(targets, chunk.len(), &self.device)?;

                let logits = network.forward(&xs)?;
                let batch_loss = loss::cross_entropy(&logits, &ys)?;
                opt.backward_step(&batch_loss)?;
                epoch_loss += batch_loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            }

            if epoch % 50 == 49 {
                log::debug!("Epoch {:>5}: loss {:.4e}", epoch + 1, epoch_loss / n as f64);
            }
        }

        self.model = Some(Model {
            kind: LearnerKind::NeuralNet,
            n_input: d,
            n_classes: self.n_classes,
            n_train: n,
            mean,
            scale,
            layers: network.to_params()?,
        });
        self.network = Some(network);
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> LearnResult<Vec<Vec<f64>>> {
        let (model, network) = match (&self.model, &self.network) {
            (Some(m), Some(net)) => (m, net),
            _ => return Err(LearnError::NotTrained),
        };
        check_features(features, model.n_input)?;
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<&Vec<f64>> = features.iter().collect();
        let xs = batch(&rows, &model.mean, &model.scale, &self.device)?;
        let logits = network.forward(&xs)?.to_vec2::<f32>()?;

        Ok(logits
            .into_iter()
            .map(|row| {
                let mut p: Vec<f64> = row.into_iter().map(f64::from).collect();
                softmax(&mut p);
                p
            })
            .collect())
    }

    fn n_best(&self) -> usize {
        self.n_best
    }

    fn n_train(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.n_train)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn save(&self, path: &Path) -> LearnResult<()> {
        let model = self.model.as_ref().ok_or(LearnError::NotTrained)?;
        save_json(path, model)
    }

    fn load(&mut self, path: &Path) -> LearnResult<()> {
        let model: Model = load_model(path, LearnerKind::NeuralNet)?;
        let network = Network::from_params(&model.layers, &self.device)?;
        self.n_input = model.n_input;
        self.n_classes = model.n_classes;
        self.n_best = self.n_best.min(model.n_classes);
        self.model = Some(model);
        self.network = Some(network);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::argmax;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let centers = [(-3.0, 0.0), (3.0, 0.0), (0.0, 4.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (k, &(cx, cy)) in centers.iter().enumerate() {
            for _ in 0..30 {
                x.push(vec![
                    cx + 0.3 * rng.gen::<f64>(),
                    cy + 0.3 * rng.gen::<f64>(),
                ]);
                y.push(k);
            }
        }
        (x, y)
    }

    fn config() -> NeuralNetConfig {
        NeuralNetConfig {
            hidden_layers: vec![16],
            epochs: 100,
            batch_size: 16,
            learning_rate: 1e-2,
            seed: 1,
            n_best: 2,
        }
    }

    #[test]
    fn test_fits_blobs() {
        let (x, y) = blobs();
        let mut nn = NeuralNet::new(config(), 2, 3, 2);
        nn.train(&x, &y).unwrap();
        assert_eq!(nn.n_train(), 90);
        assert_eq!(nn.n_classes(), 3);

        let probs = nn.predict_proba(&x).unwrap();
        for (p, &label) in probs.iter().zip(&y) {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert_eq!(argmax(p), label);
        }
    }

    #[test]
    fn test_seeded_training_is_deterministic() {
        let (x, y) = blobs();
        let mut a = NeuralNet::new(config(), 2, 3, 2);
        let mut b = NeuralNet::new(config(), 2, 3, 2);
        a.train(&x, &y).unwrap();
        b.train(&x, &y).unwrap();
        let pa = a.predict_proba(&x).unwrap();
        let pb = b.predict_proba(&x).unwrap();
        for (ra, rb) in pa.iter().zip(&pb) {
            for (va, vb) in ra.iter().zip(rb) {
                assert!((va - vb).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_network_params_roundtrip() {
        let params = vec![LayerParams {
            n_in: 3,
            n_out: 2,
            weights: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            bias: vec![0.5, -0.5],
        }];
        let net = Network::from_params(&params, &Device::Cpu).unwrap();
        let back = net.to_params().unwrap();
        assert_eq!(back[0].n_in, 3);
        assert_eq!(back[0].n_out, 2);
        assert_eq!(back[0].weights, params[0].weights);
        assert_eq!(back[0].bias, params[0].bias);

        // x = (1, 0, 1): W x + b = (4.5, 9.5)
        let xs = Tensor::from_vec(vec![1.0f32, 0.0, 1.0], (1, 3), &Device::Cpu).unwrap();
        let out = net.forward(&xs).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![4.5, 9.5]]);
    }

    #[test]
    fn test_bad_layer_shape_rejected() {
        let params = vec![LayerParams {
            n_in: 3,
            n_out: 2,
            weights: vec![1.0; 5],
            bias: vec![0.0; 2],
        }];
        assert!(matches!(
            Network::from_params(&params, &Device::Cpu),
            Err(LearnError::Tensor(_))
        ));
    }

    #[test]
    fn test_save_load_keeps_predictions() {
        let (x, y) = blobs();
        let mut nn = NeuralNet::new(config(), 2, 3, 2);
        nn.train(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nn");
        nn.save(&path).unwrap();

        let mut loaded = NeuralNet::new(NeuralNetConfig::default(), 2, 3, 2);
        loaded.load(&path).unwrap();
        assert_eq!(loaded.n_train(), 90);
        assert_eq!(nn.predict(&x).unwrap(), loaded.predict(&x).unwrap());
    }
}
