use rand::Rng;

use crate::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::layers::{ActivationLayer, Conv2d, Dense, Dropout, Flatten, Layer, MaxPool2d, Param};
use crate::math::Tensor;
use crate::network::architecture::Architecture;
use crate::network::classifier::Classifier;
use crate::network::spec::{LayerSpec, NetworkSpec};

/// Digit images are single-channel 28 x 28.
pub const IMAGE_SHAPE: [usize; 3] = [1, 28, 28];
pub const NUM_CLASSES: usize = 10;
/// Dropout probability in front of the convnet's dense head.
pub const CONV_DROPOUT: f32 = 0.5;

/// A sequential stack of layers producing class logits.
///
/// Parameters are named `layers.{index}.weight` / `layers.{index}.bias`, where
/// `index` is the position in `layers`.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Layer>,
    training: bool,
}

impl Network {
    pub fn new(layers: Vec<Layer>) -> Network {
        Network {
            layers,
            training: true,
        }
    }

    /// Flatten, `depth` hidden dense layers of `width` units, then 10 logits.
    pub fn mlp<R: Rng + ?Sized>(
        width: usize,
        depth: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Network {
        let mut layers = vec![Layer::Flatten(Flatten::default())];
        let mut input_size = IMAGE_SHAPE.iter().product();
        for _ in 0..depth {
            layers.push(Layer::Dense(Dense::new(width, input_size, rng)));
            layers.push(Layer::Activation(ActivationLayer::new(activation)));
            input_size = width;
        }
        layers.push(Layer::Dense(Dense::output(NUM_CLASSES, input_size, rng)));
        Network::new(layers)
    }

    /// Two conv3x3 + pool stages (32 and 64 channels), dropout, then a dense head.
    pub fn convnet<R: Rng + ?Sized>(activation: ActivationFunction, rng: &mut R) -> Network {
        // 28 -> conv 26 -> pool 13 -> conv 11 -> pool 5
        let features = 64 * 5 * 5;
        Network::new(vec![
            Layer::Conv2d(Conv2d::new(1, 32, 3, rng)),
            Layer::Activation(ActivationLayer::new(activation)),
            Layer::MaxPool2d(MaxPool2d::new(2)),
            Layer::Conv2d(Conv2d::new(32, 64, 3, rng)),
            Layer::Activation(ActivationLayer::new(activation)),
            Layer::MaxPool2d(MaxPool2d::new(2)),
            Layer::Flatten(Flatten::default()),
            Layer::Dropout(Dropout::new(CONV_DROPOUT, rng)),
            Layer::Dense(Dense::output(NUM_CLASSES, features, rng)),
        ])
    }

    /// Builds the variant named by `architecture`. `width`/`depth` only shape the MLP.
    pub fn for_architecture<R: Rng + ?Sized>(
        architecture: Architecture,
        width: usize,
        depth: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Network {
        match architecture {
            Architecture::Mlp => Network::mlp(width, depth, activation, rng),
            Architecture::Conv => Network::convnet(activation, rng),
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters().iter().map(|(_, p)| p.value.len()).sum()
    }

    /// Layer graph in export form. Tensor references use the state-dict names.
    pub fn spec(&self, name: &str) -> NetworkSpec {
        let layers = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| match layer {
                Layer::Dense(d) => LayerSpec::Dense {
                    size: d.size,
                    input_size: d.input_size,
                    weight: format!("layers.{}.weight", i),
                    bias: format!("layers.{}.bias", i),
                },
                Layer::Conv2d(c) => LayerSpec::Conv2d {
                    in_channels: c.in_channels,
                    out_channels: c.out_channels,
                    kernel: c.kernel,
                    weight: format!("layers.{}.weight", i),
                    bias: format!("layers.{}.bias", i),
                },
                Layer::MaxPool2d(p) => LayerSpec::MaxPool2d { window: p.window },
                Layer::Activation(a) => LayerSpec::Activation {
                    activation: a.activator,
                },
                Layer::Flatten(_) => LayerSpec::Flatten,
                Layer::Dropout(d) => LayerSpec::Dropout { p: d.p },
            })
            .collect();
        NetworkSpec {
            name: name.to_string(),
            input_shape: IMAGE_SHAPE.to_vec(),
            num_classes: NUM_CLASSES,
            layers,
            metadata: None,
        }
    }
}

impl Classifier for Network {
    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let mut layers = self.layers.iter_mut();
        let first = layers
            .next()
            .ok_or_else(|| TrainError::shape("network has no layers"))?;
        let mut current = first.forward(input)?;
        for layer in layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    fn backward(&mut self, grad_logits: &Tensor) -> Result<()> {
        let mut delta = grad_logits.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta)?;
        }
        Ok(())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .named_params()
                    .into_iter()
                    .map(move |(suffix, p)| (format!("layers.{}.{}", i, suffix), p))
            })
            .collect()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .named_params_mut()
                    .into_iter()
                    .map(move |(suffix, p)| (format!("layers.{}.{}", i, suffix), p))
            })
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn mlp_shapes_and_names() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = Network::mlp(16, 2, ActivationFunction::SiLU, &mut rng);
        let logits = net.forward(&Tensor::zeros(&[3, 1, 28, 28])).unwrap();
        assert_eq!(logits.shape(), &[3, 10]);

        let names: Vec<String> = net.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "layers.1.weight", "layers.1.bias",
                "layers.3.weight", "layers.3.bias",
                "layers.5.weight", "layers.5.bias",
            ]
        );
        assert_eq!(net.parameter_count(), 784 * 16 + 16 + 16 * 16 + 16 + 16 * 10 + 10);
    }

    #[test]
    fn convnet_produces_logits() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = Network::convnet(ActivationFunction::ReLU, &mut rng);
        let logits = net.forward(&Tensor::randn(&[2, 1, 28, 28], &mut rng)).unwrap();
        assert_eq!(logits.shape(), &[2, 10]);
        net.backward(&Tensor::full(&[2, 10], 0.1)).unwrap();
        assert!(net.named_parameters().iter().all(|(_, p)| p.grad.is_finite()));
        assert_eq!(net.named_parameters()[4].0, "layers.8.weight");
    }

    #[test]
    fn eval_mode_disables_convnet_dropout() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut net = Network::convnet(ActivationFunction::ReLU, &mut rng);
        let x = Tensor::randn(&[2, 1, 28, 28], &mut rng);

        assert!(net.is_training());
        let train_a = net.forward(&x).unwrap();
        let train_b = net.forward(&x).unwrap();
        assert_ne!(train_a, train_b);

        net.set_training(false);
        assert!(!net.is_training());
        assert!(net.layers.iter().all(|l| match l {
            Layer::Dropout(d) => !d.is_training(),
            _ => true,
        }));
        let eval_a = net.forward(&x).unwrap();
        assert_eq!(eval_a, net.forward(&x).unwrap());
        assert_ne!(eval_a, train_a);

        net.set_training(true);
        assert_ne!(net.forward(&x).unwrap(), eval_a);
    }

    #[test]
    fn convnet_spec_records_dropout() {
        let mut rng = StdRng::seed_from_u64(9);
        let net = Network::convnet(ActivationFunction::SiLU, &mut rng);
        let spec = net.spec("mnist_convnet");
        assert_eq!(spec.layers[7], LayerSpec::Dropout { p: CONV_DROPOUT });
        assert_eq!(spec.tensor_names().last(), Some(&"layers.8.bias"));
    }

    #[test]
    fn state_dict_round_trip_restores_outputs() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = Network::mlp(8, 1, ActivationFunction::ReLU, &mut rng);
        let mut b = Network::mlp(8, 1, ActivationFunction::ReLU, &mut rng);
        let x = Tensor::randn(&[4, 1, 28, 28], &mut rng);

        b.load_state_dict(&a.state_dict()).unwrap();
        assert_eq!(a.forward(&x).unwrap(), b.forward(&x).unwrap());
    }

    #[test]
    fn load_state_dict_rejects_mismatches() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut small = Network::mlp(8, 1, ActivationFunction::ReLU, &mut rng);
        let big = Network::mlp(9, 1, ActivationFunction::ReLU, &mut rng);
        let before = small.state_dict();

        assert!(matches!(
            small.load_state_dict(&big.state_dict()),
            Err(TrainError::Checkpoint(_))
        ));
        assert_eq!(small.state_dict(), before);

        let mut extra = small.state_dict();
        extra.insert("layers.9.weight", Tensor::zeros(&[1]));
        assert!(small.load_state_dict(&extra).is_err());

        let mut missing = small.state_dict();
        missing.remove("layers.1.bias");
        assert!(small.load_state_dict(&missing).is_err());
    }
}
