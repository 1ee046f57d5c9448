use crate::layers::Param;
use crate::optim::optimizer::Optimizer;

/// Plain stochastic gradient descent: `w -= lr * g`.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) {
        let lr = self.learning_rate as f32;
        for p in params.iter_mut() {
            let Param { value, grad } = &mut **p;
            for (w, g) in value.data_mut().iter_mut().zip(grad.data()) {
                *w -= lr * g;
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn name(&self) -> &'static str {
        "SGD"
    }
}
