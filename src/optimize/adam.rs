//! Adam optimizer with remappable moments.

pub use super::*;

/// Adam optimizer over the tensors of one parameter group.
#[derive(Clone, Debug)]
pub struct Adam<B: Backend, const D: usize> {
    pub config: AdamConfig,
    pub record: Option<AdamRecord<B, D>>,
}

#[derive(Config, Copy, Debug, PartialEq)]
pub struct AdamConfig {
    #[config(default = "0.9")]
    pub beta_1: f64,

    #[config(default = "0.999")]
    pub beta_2: f64,

    #[config(default = "1e-15")]
    pub epsilon: f64,
}

#[derive(Clone, Debug, Record)]
pub struct AdamRecord<B: Backend, const D: usize> {
    /// The first moment.
    pub moment_1: Tensor<B, D>,
    /// The second moment.
    pub moment_2: Tensor<B, D>,
    /// The number of updates.
    pub time: u64,
}

impl AdamConfig {
    #[inline]
    pub fn init<B: Backend, const D: usize>(&self) -> Adam<B, D> {
        Adam {
            config: *self,
            record: None,
        }
    }
}

impl<B: Backend, const D: usize> Adam<B, D> {
    /// Updating `value` with its gradient `grad`.
    ///
    /// $$ m_t = \beta_1 m_{t-1} + (1 - \beta_1) g $$
    /// $$ v_t = \beta_2 v_{t-1} + (1 - \beta_2) g^2 $$
    /// $$ x_t = x_{t-1} - \eta \frac{m_t / (1 - \beta_1^t)}{\sqrt{v_t / (1 - \beta_2^t)} + \epsilon} $$
    ///
    /// The moments must have the shape of `grad`. They are remapped with
    /// [`Self::commit`] when the point set changes.
    pub fn update(
        &mut self,
        learning_rate: f64,
        value: Tensor<B, D>,
        grad: Tensor<B, D>,
    ) -> Result<Tensor<B, D>, Error> {
        let AdamConfig {
            beta_1,
            beta_2,
            epsilon,
        } = self.config;

        if let Some(record) = &self.record {
            let dims = grad.dims();
            let dims_moment = record.moment_1.dims();
            if dims != dims_moment {
                return Err(Error::MismatchedShape(dims.to_vec(), dims_moment.to_vec()));
            }
        }

        let record = match self.record.take() {
            Some(record) => AdamRecord {
                moment_1: record
                    .moment_1
                    .mul_scalar(beta_1)
                    .add(grad.to_owned().mul_scalar(1.0 - beta_1)),
                moment_2: record
                    .moment_2
                    .mul_scalar(beta_2)
                    .add(grad.powf_scalar(2.0).mul_scalar(1.0 - beta_2)),
                time: record.time + 1,
            },
            None => AdamRecord {
                moment_1: grad.to_owned().mul_scalar(1.0 - beta_1),
                moment_2: grad.powf_scalar(2.0).mul_scalar(1.0 - beta_2),
                time: 1,
            },
        };

        let time = record.time.min(i32::MAX as u64) as i32;
        let moment_1_corrected = record
            .moment_1
            .to_owned()
            .div_scalar(1.0 - beta_1.powi(time));
        let moment_2_corrected = record
            .moment_2
            .to_owned()
            .div_scalar(1.0 - beta_2.powi(time));
        let delta = moment_1_corrected
            .div(moment_2_corrected.sqrt().add_scalar(epsilon))
            .mul_scalar(learning_rate);

        self.record = Some(record);

        Ok(value.sub(delta))
    }

    /// Remapping the moments to the retained rows followed by
    /// `appended_count` rows of zero moments.
    pub fn commit(
        &mut self,
        retained: Tensor<B, 1, Int>,
        appended_count: usize,
    ) -> &mut Self {
        if let Some(record) = self.record.take() {
            let remap = |moment: Tensor<B, D>| {
                let moment = moment.select(0, retained.to_owned());
                if appended_count == 0 {
                    return moment;
                }
                let mut dims = moment.dims();
                dims[0] = appended_count;
                let appended = Tensor::zeros(dims, &moment.device());
                Tensor::cat(vec![moment, appended], 0)
            };

            self.record = Some(AdamRecord {
                moment_1: remap(record.moment_1),
                moment_2: remap(record.moment_2),
                time: record.time,
            });
        }

        self
    }

    #[inline]
    pub fn load_record(
        &mut self,
        record: Option<AdamRecord<B, D>>,
    ) -> &mut Self {
        self.record = record;
        self
    }

    #[inline]
    pub fn into_record(self) -> Option<AdamRecord<B, D>> {
        self.record
    }

    pub fn to_device(
        mut self,
        device: &B::Device,
    ) -> Self {
        self.record = self.record.map(|record| AdamRecord {
            moment_1: record.moment_1.to_device(device),
            moment_2: record.moment_2.to_device(device),
            time: record.time,
        });
        self
    }
}

impl<B: Backend, const D: usize> Default for Adam<B, D> {
    #[inline]
    fn default() -> Self {
        AdamConfig::default().init()
    }
}

impl Default for AdamConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn update_first_step_moves_by_learning_rate() {
        let device = Default::default();
        let mut adam = Adam::<NdArray, 2>::default();

        let value = Tensor::<NdArray, 2>::from_floats([[1.0, -2.0], [0.5, 0.0]], &device);
        let grad = Tensor::<NdArray, 2>::from_floats([[0.3, -4.0], [-1e-3, 0.0]], &device);

        // The first bias-corrected step is `lr * sign(g)`.
        let output = adam.update(0.1, value, grad).unwrap();
        let target = Tensor::<NdArray, 2>::from_floats([[0.9, -1.9], [0.6, 0.0]], &device);
        output.into_data().assert_approx_eq(&target.into_data(), 5);

        assert_eq!(adam.record.as_ref().map(|r| r.time), Some(1));
    }

    #[test]
    fn update_accumulates_moments() {
        let device = Default::default();
        let mut adam = Adam::<NdArray, 1>::default();

        let value = Tensor::<NdArray, 1>::from_floats([0.0], &device);
        let value = adam.update(1.0, value, Tensor::from_floats([1.0], &device)).unwrap();
        let value = adam.update(1.0, value, Tensor::from_floats([1.0], &device)).unwrap();

        let record = adam.record.to_owned().unwrap();
        assert_eq!(record.time, 2);
        record
            .moment_1
            .into_data()
            .assert_approx_eq(&TensorData::from([0.19f32]), 6);
        record
            .moment_2
            .into_data()
            .assert_approx_eq(&TensorData::from([0.001999f32]), 6);
        value
            .into_data()
            .assert_approx_eq(&TensorData::from([-2.0f32]), 5);
    }

    #[test]
    fn commit_remaps_moments() {
        let device = Default::default();
        let mut adam = Adam::<NdArray, 2>::default();

        let value = Tensor::<NdArray, 2>::zeros([3, 2], &device);
        let grad = Tensor::<NdArray, 2>::from_floats([[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]], &device);
        adam.update(1e-3, value, grad).unwrap();

        adam.commit(Tensor::from_ints([2, 0], &device), 2);

        let record = adam.record.to_owned().unwrap();
        let target = Tensor::<NdArray, 2>::from_floats(
            [[0.3, 0.3], [0.1, 0.1], [0.0, 0.0], [0.0, 0.0]],
            &device,
        );
        record
            .moment_1
            .into_data()
            .assert_approx_eq(&target.into_data(), 6);
        assert_eq!(record.moment_2.dims(), [4, 2]);
        assert_eq!(record.time, 1);
    }

    #[test]
    fn update_stale_moments() {
        let device = Default::default();
        let mut adam = Adam::<NdArray, 2>::default();

        let value = Tensor::<NdArray, 2>::zeros([3, 2], &device);
        let grad = Tensor::<NdArray, 2>::ones([3, 2], &device);
        adam.update(1e-3, value, grad).unwrap();

        // The point count changed without committing.
        let value = Tensor::<NdArray, 2>::zeros([4, 2], &device);
        let grad = Tensor::<NdArray, 2>::ones([4, 2], &device);
        let error = adam.update(1e-3, value.to_owned(), grad.to_owned()).unwrap_err();

        assert!(matches!(error, Error::MismatchedShape(_, _)), "{error:?}");
        let record = adam.record.as_ref().unwrap();
        assert_eq!(record.moment_1.dims(), [3, 2]);
        assert_eq!(record.time, 1);

        adam.commit(Tensor::from_ints([0, 1, 2], &device), 1);
        adam.update(1e-3, value, grad).unwrap();
        assert_eq!(adam.record.as_ref().map(|r| r.time), Some(2));
    }

    #[test]
    fn commit_without_record() {
        let device = Default::default();
        let mut adam = Adam::<NdArray, 2>::default();

        adam.commit(Tensor::from_ints([0, 1], &device), 3);
        assert!(adam.record.is_none());
    }
}
