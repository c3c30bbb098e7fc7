//! Tensor bridge: conversions between host-side spin configurations /
//! `f64` buffers and burn tensors.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert binary configurations to a `(batch, num_sites)` float tensor.
///
/// # Panics
/// Panics if `configs` is empty or a row has the wrong length.
pub fn configs_to_tensor<B: Backend>(
    configs: &[Vec<u8>],
    num_sites: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    assert!(!configs.is_empty(), "configurations must not be empty");
    let flat: Vec<f64> = configs
        .iter()
        .flat_map(|row| {
            assert_eq!(row.len(), num_sites, "configuration has wrong number of sites");
            row.iter().map(|&s| f64::from(s))
        })
        .collect();
    values_to_tensor(flat, [configs.len(), num_sites], device)
}

/// Build a tensor of any rank from row-major `f64` values.
pub fn values_to_tensor<B: Backend, const D: usize>(
    values: Vec<f64>,
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(
        TensorData::new(values, dims).convert::<B::FloatElem>(),
        device,
    )
}

/// Extract all values of a tensor as `f64`, row-major.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor.into_data().iter::<f64>().collect()
}

/// Extract a single `f64` scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Convert a `(batch, num_sites)` tensor of 0/1 values back to configurations.
pub fn tensor_to_configs<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<u8>> {
    let [_, num_sites] = tensor.dims();
    let values = tensor_to_vec(tensor);
    values
        .chunks(num_sites.max(1))
        .map(|row| row.iter().map(|&x| u8::from(x > 0.5)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    #[test]
    fn test_configs_round_trip() {
        let device = Default::default();
        let configs = vec![vec![0, 1, 1], vec![1, 0, 0]];

        let tensor = configs_to_tensor::<TestBackend>(&configs, 3, &device);
        assert_eq!(tensor.dims(), [2, 3]);

        let row1 = tensor_to_vec(tensor.clone().slice([1..2, 0..3]));
        assert_eq!(row1, vec![1.0, 0.0, 0.0]);

        assert_eq!(tensor_to_configs(tensor), configs);
    }

    #[test]
    fn test_scalar_extraction() {
        let device = Default::default();
        let tensor = values_to_tensor::<TestBackend, 1>(vec![42.5], [1], &device);
        assert!((tensor_to_f64(tensor) - 42.5).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "wrong number of sites")]
    fn test_ragged_configs_panic() {
        let device = Default::default();
        configs_to_tensor::<TestBackend>(&[vec![0, 1], vec![1]], 2, &device);
    }
}
