//! Image metrics.

pub use burn::tensor::{backend::Backend, Tensor};

use std::f64::consts::LN_10;

/// A metric between two tensors of the same shape.
pub trait Metric<B: Backend> {
    /// The shape of output is `[1]`.
    fn evaluate<const D: usize>(
        &self,
        value: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1>;
}

/// $$ \frac{1}{N} \sum |x - y| $$
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanAbsoluteError;

/// $$ \frac{1}{N} \sum (x - y)^2 $$
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanSquaredError;

/// $$ 10 \log_{10} \frac{1}{\text{MSE}} $$
///
/// The values should be normalized to `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PeakSignalToNoiseRatio;

impl<B: Backend> Metric<B> for MeanAbsoluteError {
    #[inline]
    fn evaluate<const D: usize>(
        &self,
        value: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        (value - target).abs().mean()
    }
}

impl<B: Backend> Metric<B> for MeanSquaredError {
    #[inline]
    fn evaluate<const D: usize>(
        &self,
        value: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        (value - target).powf_scalar(2.0).mean()
    }
}

impl<B: Backend> Metric<B> for PeakSignalToNoiseRatio {
    #[inline]
    fn evaluate<const D: usize>(
        &self,
        value: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        MeanSquaredError
            .evaluate(value, target)
            .log()
            .mul_scalar(-10.0 / LN_10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::TensorData};

    #[test]
    fn mean_absolute_error() {
        let device = Default::default();
        let value = Tensor::<NdArray, 2>::from_floats([[0.0, 0.5], [1.0, 0.25]], &device);
        let target = Tensor::<NdArray, 2>::from_floats([[0.5, 0.5], [0.0, 0.75]], &device);

        let output = MeanAbsoluteError.evaluate(value, target);
        output
            .into_data()
            .assert_approx_eq(&TensorData::from([0.5f32]), 6);
    }

    #[test]
    fn peak_signal_to_noise_ratio() {
        let device = Default::default();
        let value = Tensor::<NdArray, 1>::from_floats([0.0, 0.1, 0.2, 0.3], &device);
        let target = Tensor::<NdArray, 1>::from_floats([0.1, 0.2, 0.3, 0.4], &device);

        // MSE = 0.01
        let output = PeakSignalToNoiseRatio.evaluate(value, target);
        output
            .into_data()
            .assert_approx_eq(&TensorData::from([20.0f32]), 3);
    }
}
