//! Tensor extensions.

use burn::tensor::{backend::Backend, Tensor};

pub trait TensorFloatExtension<B: Backend, const D: usize> {
    /// L2 norm along `dim`, keeping the dimension.
    fn norm_l2_dim(
        self,
        dim: usize,
    ) -> Tensor<B, D>;

    /// Dividing by the L2 norm along `dim`.
    ///
    /// Zero vectors stay zero.
    fn normalize_dim(
        self,
        dim: usize,
    ) -> Tensor<B, D>;

    /// Matrix multiplication over a large leading (batch) dimension.
    ///
    /// Some backends limit the workgroup count per dispatch, so the batch
    /// is split into chunks of at most `2^16 - 1` matrices.
    fn matmul_batched(
        self,
        rhs: Tensor<B, D>,
    ) -> Tensor<B, D>;
}

impl<B: Backend, const D: usize> TensorFloatExtension<B, D> for Tensor<B, D> {
    #[inline]
    fn norm_l2_dim(
        self,
        dim: usize,
    ) -> Tensor<B, D> {
        self.powf_scalar(2.0).sum_dim(dim).sqrt()
    }

    #[inline]
    fn normalize_dim(
        self,
        dim: usize,
    ) -> Tensor<B, D> {
        let norm = self.to_owned().norm_l2_dim(dim).clamp_min(1e-12);
        self.div(norm)
    }

    fn matmul_batched(
        self,
        rhs: Tensor<B, D>,
    ) -> Tensor<B, D> {
        const BATCH_SIZE: usize = (1 << 16) - 1;

        let count = self.dims()[0];
        if D < 3 || count <= BATCH_SIZE {
            return self.matmul(rhs);
        }

        let dims_lhs = self.dims();
        let dims_rhs = rhs.dims();
        assert_eq!(
            dims_lhs[0], dims_rhs[0],
            "The batch dimensions of matmul should be equal, \
            but got self.dims() = {dims_lhs:?} and rhs.dims() = {dims_rhs:?}",
        );

        Tensor::cat(
            (0..count)
                .step_by(BATCH_SIZE)
                .map(|start| {
                    let end = (start + BATCH_SIZE).min(count);
                    let lhs = self.to_owned().narrow(0, start, end - start);
                    let rhs = rhs.to_owned().narrow(0, start, end - start);
                    lhs.matmul(rhs)
                })
                .collect(),
            0,
        )
    }
}
