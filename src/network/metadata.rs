use serde::{Deserialize, Serialize};

/// Describes how an exported model expects its input.
/// A runtime reads this to prepare pixels the same way training did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// Grayscale pixels in `[0, 255]`, mapped to `x * 2 / 255 - 1` before the first layer.
    ImageGrayscale { width: u32, height: u32 },
}

/// Optional annotations attached to an exported graph.
/// All fields are Option<> so graphs written without them still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub input_type: Option<InputType>,
    /// Class labels for the logits, `["0", ..., "9"]` for digits.
    pub output_labels: Option<Vec<String>>,
    /// Step that produced the exported weights.
    pub step: Option<usize>,
    /// Test accuracy in percent of the exported weights.
    pub test_acc: Option<f64>,
}

impl ModelMetadata {
    pub fn digits(width: u32, height: u32) -> ModelMetadata {
        ModelMetadata {
            input_type: Some(InputType::ImageGrayscale { width, height }),
            output_labels: Some((0..10).map(|d| d.to_string()).collect()),
            ..ModelMetadata::default()
        }
    }

    /// Records which checkpoint the exported weights came from.
    pub fn with_checkpoint(mut self, step: usize, test_acc: f64) -> ModelMetadata {
        self.step = Some(step);
        self.test_acc = Some(test_acc);
        self
    }
}
