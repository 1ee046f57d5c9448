use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Parse an IDX3 image file (as used by MNIST) into a `(N, 1, rows, cols)`
/// tensor of raw pixel values in `[0, 255]`.
///
/// # IDX3 image file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x03        (number of dimensions = 3)
/// bytes  4-7:   N           (number of images, big-endian u32)
/// bytes  8-11:  rows        (image height in pixels, big-endian u32)
/// bytes 12-15:  cols        (image width in pixels, big-endian u32)
/// bytes 16..:   N * rows * cols bytes, row-major, uint8
/// ```
pub fn parse_images(bytes: &[u8]) -> Result<Tensor> {
    check_header(bytes, 3, "image")?;
    if bytes.len() < 16 {
        return Err(TrainError::Dataset(format!(
            "IDX image file too short: expected at least 16 header bytes, got {}",
            bytes.len()
        )));
    }
    let n_items = be_u32(bytes, 4);
    let rows = be_u32(bytes, 8);
    let cols = be_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .and_then(|p| p.checked_mul(n_items))
        .ok_or_else(|| {
            TrainError::Dataset(format!(
                "IDX image file: {} x {} x {} overflows usize",
                n_items, rows, cols
            ))
        })?;
    let data = bytes.get(16..16 + n_pixels).ok_or_else(|| {
        TrainError::Dataset(format!(
            "IDX image file too short: header declares {} images of {}x{} pixels, \
             but file is only {} bytes",
            n_items,
            rows,
            cols,
            bytes.len()
        ))
    })?;

    Tensor::from_vec(
        &[n_items, 1, rows, cols],
        data.iter().map(|&px| px as f32).collect(),
    )
}

/// Parse an IDX1 label file into class indices, rejecting any `>= n_classes`.
///
/// # IDX1 label file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x01        (number of dimensions = 1)
/// bytes  4-7:   N           (number of labels, big-endian u32)
/// bytes  8..:   N bytes, each a class index in [0, n_classes)
/// ```
pub fn parse_labels(bytes: &[u8], n_classes: usize) -> Result<Vec<u8>> {
    check_header(bytes, 1, "label")?;
    if bytes.len() < 8 {
        return Err(TrainError::Dataset(format!(
            "IDX label file too short: expected at least 8 header bytes, got {}",
            bytes.len()
        )));
    }
    let n_items = be_u32(bytes, 4);
    let labels = bytes.get(8..8 + n_items).ok_or_else(|| {
        TrainError::Dataset(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes",
            n_items,
            bytes.len()
        ))
    })?;
    if let Some((i, &class)) = labels
        .iter()
        .enumerate()
        .find(|(_, &c)| c as usize >= n_classes)
    {
        return Err(TrainError::Dataset(format!(
            "IDX label at index {}: class index {} is out of range for n_classes={}",
            i, class, n_classes
        )));
    }
    Ok(labels.to_vec())
}

fn check_header(bytes: &[u8], dims: u8, kind: &str) -> Result<()> {
    if bytes.len() < 4 {
        return Err(TrainError::Dataset(format!(
            "IDX {} file too short: {} bytes",
            kind,
            bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(TrainError::Dataset(format!(
            "IDX {} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}",
            kind, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(TrainError::Dataset(format!(
            "IDX {} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}",
            kind, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(TrainError::Dataset(format!(
            "IDX {} file: byte 3 (dimensions) must be {}, got {}",
            kind, dims, bytes[3]
        )));
    }
    Ok(())
}

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

/// Encodes images back into IDX3. Used to build fixtures.
pub fn encode_images(images: &Tensor) -> Result<Vec<u8>> {
    let (n, rows, cols) = match images.shape() {
        &[n, 1, rows, cols] => (n, rows, cols),
        other => {
            return Err(TrainError::shape(format!(
                "IDX images must be (N, 1, H, W), got {:?}",
                other
            )))
        }
    };
    let mut out = vec![0x00, 0x00, 0x08, 0x03];
    for v in [n, rows, cols] {
        out.extend_from_slice(&(v as u32).to_be_bytes());
    }
    out.extend(images.data().iter().map(|&px| px.round().clamp(0.0, 255.0) as u8));
    Ok(out)
}

pub fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x08, 0x01];
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_round_trip_through_idx() {
        let images = Tensor::from_vec(&[2, 1, 2, 3], (0..12).map(|v| v as f32 * 20.0).collect()).unwrap();
        let parsed = parse_images(&encode_images(&images).unwrap()).unwrap();
        assert_eq!(parsed, images);
    }

    #[test]
    fn truncated_images_are_rejected() {
        let mut bytes = encode_images(&Tensor::zeros(&[2, 1, 4, 4])).unwrap();
        bytes.pop();
        assert!(matches!(parse_images(&bytes), Err(TrainError::Dataset(_))));
    }

    #[test]
    fn wrong_dimensions_byte_is_rejected() {
        let bytes = encode_labels(&[1, 2, 3]);
        assert!(parse_images(&bytes).is_err());
    }

    #[test]
    fn labels_are_range_checked() {
        let bytes = encode_labels(&[0, 9, 3]);
        assert_eq!(parse_labels(&bytes, 10).unwrap(), vec![0, 9, 3]);
        assert!(parse_labels(&bytes, 5).is_err());
    }
}
