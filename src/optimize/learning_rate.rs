//! Learning rate with exponential decay.

pub use super::*;

use std::ops;

/// A learning rate decaying exponentially from `start` to `end` in `step_count` steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LearningRate {
    pub config: LearningRateConfig,
    pub record: LearningRateRecord,
}

#[derive(Config, Copy, Debug, PartialEq)]
pub struct LearningRateConfig {
    pub start: f64,

    /// It stays at `start` if not specified.
    #[config(default = "None")]
    pub end: Option<f64>,

    #[config(default = "30000")]
    pub step_count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Record)]
pub struct LearningRateRecord {
    /// The current value.
    pub current: f64,
    /// The multiplier per step.
    pub decay: f64,
}

impl LearningRateConfig {
    pub fn init(&self) -> LearningRate {
        let decay = match self.end {
            Some(end) if self.step_count > 0 && self.start > 0.0 => {
                (end / self.start).powf((self.step_count as f64).recip())
            },
            _ => 1.0,
        };

        LearningRate {
            config: *self,
            record: LearningRateRecord {
                current: self.start,
                decay,
            },
        }
    }
}

impl LearningRate {
    /// Moving to the next step.
    ///
    /// The value never passes `end`.
    pub fn update(&mut self) -> &mut Self {
        let current = self.record.current * self.record.decay;
        self.record.current = match self.config.end {
            Some(end) if self.record.decay < 1.0 => current.max(end),
            Some(end) if self.record.decay > 1.0 => current.min(end),
            _ => current,
        };
        self
    }

    #[inline]
    pub fn load_record(
        &mut self,
        record: LearningRateRecord,
    ) -> &mut Self {
        self.record = record;
        self
    }

    #[inline]
    pub fn into_record(self) -> LearningRateRecord {
        self.record
    }
}

impl From<f64> for LearningRate {
    #[inline]
    fn from(value: f64) -> Self {
        LearningRateConfig::new(value).init()
    }
}

impl Default for LearningRate {
    #[inline]
    fn default() -> Self {
        1e-3.into()
    }
}

impl ops::Deref for LearningRate {
    type Target = f64;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.record.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay() {
        let mut learning_rate = LearningRateConfig::new(1.6e-4)
            .with_end(Some(1.6e-6))
            .with_step_count(30000)
            .init();
        assert_eq!(learning_rate.record.decay, 0.9998465061085267);
        assert_eq!(*learning_rate, 1.6e-4);

        (0..30000).for_each(|_| {
            learning_rate.update();
        });
        assert!((*learning_rate - 1.6e-6).abs() < 1e-12, "{}", *learning_rate);

        (0..100).for_each(|_| {
            learning_rate.update();
        });
        assert_eq!(*learning_rate, 1.6e-6);
    }

    #[test]
    fn constant() {
        let mut learning_rate = LearningRate::from(5e-2);
        learning_rate.update().update();
        assert_eq!(*learning_rate, 5e-2);
        assert_eq!(*LearningRate::default(), 1e-3);
    }
}
