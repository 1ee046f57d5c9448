use std::fs;
use std::path::Path;

use tracing::info;

use crate::data::idx;
use crate::error::{Result, TrainError};
use crate::math::Tensor;
use crate::network::NUM_CLASSES;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Train and test splits held in memory.
///
/// Images are `(N, 1, H, W)` raw intensities in `[0, 255]`; labels are class
/// indices below 10. Both splits share the same image size.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train_images: Tensor,
    pub train_labels: Vec<u8>,
    pub test_images: Tensor,
    pub test_labels: Vec<u8>,
}

impl Dataset {
    pub fn new(
        train_images: Tensor,
        train_labels: Vec<u8>,
        test_images: Tensor,
        test_labels: Vec<u8>,
    ) -> Result<Dataset> {
        for (split, images, labels) in [
            ("train", &train_images, &train_labels),
            ("test", &test_images, &test_labels),
        ] {
            if images.rank() != 4 {
                return Err(TrainError::Dataset(format!(
                    "{} images must be (N, C, H, W), got {:?}",
                    split,
                    images.shape()
                )));
            }
            if images.dim(0) != labels.len() {
                return Err(TrainError::Dataset(format!(
                    "{} split has {} images but {} labels",
                    split,
                    images.dim(0),
                    labels.len()
                )));
            }
            if labels.is_empty() {
                return Err(TrainError::Dataset(format!("{} split is empty", split)));
            }
            if let Some(&bad) = labels.iter().find(|&&l| l as usize >= NUM_CLASSES) {
                return Err(TrainError::Dataset(format!("{} label {} out of range", split, bad)));
            }
            if images.data().iter().any(|&px| !(0.0..=255.0).contains(&px)) {
                return Err(TrainError::Dataset(format!(
                    "{} images must lie in [0, 255]",
                    split
                )));
            }
        }
        if train_images.shape()[1..] != test_images.shape()[1..] {
            return Err(TrainError::Dataset(format!(
                "train images {:?} and test images {:?} differ in sample shape",
                train_images.shape(),
                test_images.shape()
            )));
        }
        Ok(Dataset {
            train_images,
            train_labels,
            test_images,
            test_labels,
        })
    }

    /// Reads the four standard MNIST IDX files from `dir`.
    pub fn load_idx_dir(dir: &Path) -> Result<Dataset> {
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read(&path).map_err(|e| TrainError::io(path, e))
        };
        let dataset = Dataset::new(
            idx::parse_images(&read(TRAIN_IMAGES)?)?,
            idx::parse_labels(&read(TRAIN_LABELS)?, NUM_CLASSES)?,
            idx::parse_images(&read(TEST_IMAGES)?)?,
            idx::parse_labels(&read(TEST_LABELS)?, NUM_CLASSES)?,
        )?;
        info!(
            dir = %dir.display(),
            train = dataset.train_len(),
            test = dataset.test_len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    pub fn train_len(&self) -> usize {
        self.train_labels.len()
    }

    pub fn test_len(&self) -> usize {
        self.test_labels.len()
    }

    /// `(H, W)` of every sample.
    pub fn image_dims(&self) -> (usize, usize) {
        (self.train_images.dim(2), self.train_images.dim(3))
    }

    /// Gathers the training samples at `indices` (repeats allowed).
    pub fn train_batch(&self, indices: &[usize]) -> Result<(Tensor, Vec<u8>)> {
        let images = self.train_images.select_rows(indices)?;
        let labels = indices.iter().map(|&i| self.train_labels[i]).collect();
        Ok((images, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Tensor {
        Tensor::full(&[n, 1, 4, 4], 128.0)
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Dataset::new(images(3), vec![0, 1], images(1), vec![0]).unwrap_err();
        assert!(matches!(err, TrainError::Dataset(_)));
    }

    #[test]
    fn out_of_range_pixels_are_rejected() {
        let bright = Tensor::full(&[1, 1, 4, 4], 256.0);
        assert!(Dataset::new(bright, vec![0], images(1), vec![0]).is_err());
    }

    #[test]
    fn batch_gathers_with_repeats() {
        let mut train = images(3);
        train.data_mut()[16] = 7.0;
        let ds = Dataset::new(train, vec![4, 5, 6], images(1), vec![0]).unwrap();
        let (x, y) = ds.train_batch(&[1, 1, 0]).unwrap();
        assert_eq!(x.shape(), &[3, 1, 4, 4]);
        assert_eq!(y, vec![5, 5, 4]);
        assert_eq!(x.data()[0], 7.0);
        assert_eq!(ds.image_dims(), (4, 4));
    }

    #[test]
    fn loads_idx_directory() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, bytes: Vec<u8>| fs::write(dir.path().join(name), bytes).unwrap();
        write(TRAIN_IMAGES, idx::encode_images(&images(2)).unwrap());
        write(TRAIN_LABELS, idx::encode_labels(&[3, 4]));
        write(TEST_IMAGES, idx::encode_images(&images(1)).unwrap());
        write(TEST_LABELS, idx::encode_labels(&[9]));

        let ds = Dataset::load_idx_dir(dir.path()).unwrap();
        assert_eq!(ds.train_len(), 2);
        assert_eq!(ds.test_labels, vec![9]);
    }
}
