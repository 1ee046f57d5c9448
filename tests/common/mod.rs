#![allow(dead_code)]

use ferrite_digits::layers::Param;
use ferrite_digits::{Classifier, Dataset, Result, Tensor};

/// A model whose test accuracy follows a script instead of its weights.
///
/// Every eval-mode forward is one evaluation (test sets here fit in one
/// chunk). Evaluation `i` predicts class 0 for `accuracies[i]` percent of the
/// rows, so with all-zero test labels the measured accuracy is exactly the
/// scripted value. The `tag` parameter is set to `i + 1` on evaluation `i`,
/// which makes the evaluation behind any checkpoint identifiable.
pub struct ScriptedClassifier {
    pub accuracies: Vec<f64>,
    pub nan_loss_at: Option<usize>,
    pub nan_grad_at: Option<usize>,
    pub evals: usize,
    pub train_steps: usize,
    training: bool,
    w: Param,
    tag: Param,
}

impl ScriptedClassifier {
    pub fn new(accuracies: Vec<f64>) -> ScriptedClassifier {
        ScriptedClassifier {
            accuracies,
            nan_loss_at: None,
            nan_grad_at: None,
            evals: 0,
            train_steps: 0,
            training: true,
            w: Param::new(Tensor::full(&[1], 0.5)),
            tag: Param::new(Tensor::zeros(&[1])),
        }
    }

    pub fn tag(&self) -> f32 {
        self.tag.value.data()[0]
    }

    pub fn w(&self) -> f32 {
        self.w.value.data()[0]
    }
}

impl Classifier for ScriptedClassifier {
    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let batch = input.dim(0);
        let mut logits = Tensor::zeros(&[batch, 10]);
        if self.training {
            if self.nan_loss_at == Some(self.train_steps) {
                logits.fill(f32::NAN);
            }
            return Ok(logits);
        }

        let acc = self.accuracies.get(self.evals).copied().unwrap_or(0.0);
        let hits = (acc / 100.0 * batch as f64).round() as usize;
        for (row, out) in logits.data_mut().chunks_exact_mut(10).enumerate() {
            let class = if row < hits { 0 } else { 1 };
            out[class] = 5.0;
        }
        self.evals += 1;
        self.tag.value.fill(self.evals as f32);
        Ok(logits)
    }

    fn backward(&mut self, _grad_logits: &Tensor) -> Result<()> {
        if self.nan_grad_at == Some(self.train_steps) {
            self.w.grad.fill(f32::NAN);
        }
        self.train_steps += 1;
        Ok(())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        vec![("tag".to_string(), &self.tag), ("w".to_string(), &self.w)]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        vec![("tag".to_string(), &mut self.tag), ("w".to_string(), &mut self.w)]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// 256 blank training images over 8 classes and `test_len` blank test images
/// labelled 0.
pub fn blank_dataset(test_len: usize) -> Dataset {
    let train_labels = (0..256).map(|i| (i % 8) as u8).collect();
    Dataset::new(
        Tensor::zeros(&[256, 1, 28, 28]),
        train_labels,
        Tensor::zeros(&[test_len, 1, 28, 28]),
        vec![0; test_len],
    )
    .unwrap()
}

/// Four classes, each marked by a bright 7x7 block in its own quadrant, with
/// a little per-sample intensity variation.
pub fn quadrant_dataset(train_len: usize, test_len: usize) -> Dataset {
    let make = |n: usize| {
        let mut images = Tensor::zeros(&[n, 1, 28, 28]);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 4;
            let (r0, c0) = [(3, 3), (3, 17), (17, 3), (17, 17)][class];
            let intensity = 180.0 + (i % 7) as f32 * 10.0;
            let data = images.data_mut();
            for r in r0..r0 + 7 {
                for c in c0..c0 + 7 {
                    data[i * 784 + r * 28 + c] = intensity;
                }
            }
            labels.push(class as u8);
        }
        (images, labels)
    };
    let (train_images, train_labels) = make(train_len);
    let (test_images, test_labels) = make(test_len);
    Dataset::new(train_images, train_labels, test_images, test_labels).unwrap()
}
