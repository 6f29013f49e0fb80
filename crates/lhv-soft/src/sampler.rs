//! Hidden-variable batch streams.
//!
//! Each batch is `[batch_size, inputsize]` i.i.d. uniform draws on
//! `[0, 1)`, standardized with the uniform distribution's mean and
//! standard deviation. Streams are infinite; callers bound them with
//! [`Iterator::take`]. Every call to [`HiddenVariableSampler::inputs`] or
//! [`HiddenVariableSampler::labeled`] starts a fresh, independently
//! seeded stream. A stream owns its RNG, so concurrent consumers should
//! each open their own.

use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::JoinHandle;

use candle_core::{Device, Tensor};
use lhv_core::{JointDistribution, LhvError, UNIFORM_MEAN, UNIFORM_STD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws standardized hidden-variable batches.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use lhv_soft::sampler::HiddenVariableSampler;
///
/// let sampler = HiddenVariableSampler::new(3, 16, &Device::Cpu).unwrap();
/// let batch = sampler.inputs(7).next().unwrap().unwrap();
/// assert_eq!(batch.dims(), &[16, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct HiddenVariableSampler {
    inputsize: usize,
    batch_size: usize,
    device: Device,
}

impl HiddenVariableSampler {
    /// # Errors
    ///
    /// Returns [`LhvError::InvalidConfig`] if either size is zero.
    pub fn new(inputsize: usize, batch_size: usize, device: &Device) -> Result<Self, LhvError> {
        if inputsize == 0 || batch_size == 0 {
            return Err(LhvError::config(format!(
                "sampler needs positive sizes, got inputsize={inputsize} batch_size={batch_size}"
            )));
        }
        Ok(Self {
            inputsize,
            batch_size,
            device: device.clone(),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One standardized batch drawn from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Internal`] if the tensor cannot be created.
    pub fn sample_batch(&self, rng: &mut StdRng) -> Result<Tensor, LhvError> {
        let n = self.batch_size * self.inputsize;
        let data: Vec<f32> = (0..n)
            .map(|_| (rng.random::<f32>() - UNIFORM_MEAN) / UNIFORM_STD)
            .collect();
        Tensor::from_vec(data, (self.batch_size, self.inputsize), &self.device).map_err(|e| {
            LhvError::Internal {
                message: format!("HiddenVariableSampler sample_batch: {e}"),
            }
        })
    }

    /// Infinite stream of input batches, for evaluation.
    pub fn inputs(&self, seed: u64) -> InputBatches {
        InputBatches {
            sampler: self.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Infinite stream of `(inputs, labels)` pairs, for training and
    /// validation. The label batch is `target` repeated on every row and
    /// is the same tensor for every item.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Internal`] if the label tensor cannot be built.
    pub fn labeled(&self, target: &JointDistribution, seed: u64) -> Result<LabeledBatches, LhvError> {
        let labels = Tensor::from_vec(
            target.broadcast_rows(self.batch_size),
            (self.batch_size, target.len()),
            &self.device,
        )
        .map_err(|e| LhvError::Internal {
            message: format!("HiddenVariableSampler labels: {e}"),
        })?;
        Ok(LabeledBatches {
            inputs: self.inputs(seed),
            labels,
        })
    }
}

/// Endless input batches; see [`HiddenVariableSampler::inputs`].
#[derive(Debug)]
pub struct InputBatches {
    sampler: HiddenVariableSampler,
    rng: StdRng,
}

impl Iterator for InputBatches {
    type Item = Result<Tensor, LhvError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.sampler.sample_batch(&mut self.rng))
    }
}

/// Endless `(inputs, labels)` batches; see [`HiddenVariableSampler::labeled`].
#[derive(Debug)]
pub struct LabeledBatches {
    inputs: InputBatches,
    labels: Tensor,
}

impl Iterator for LabeledBatches {
    type Item = Result<(Tensor, Tensor), LhvError>;

    fn next(&mut self) -> Option<Self::Item> {
        let inputs = self.inputs.next()?;
        Some(inputs.map(|x| (x, self.labels.clone())))
    }
}

/// Runs an iterator on one background thread, buffering up to
/// `capacity` items ahead of the consumer.
///
/// The worker stops when the source ends or the [`Prefetch`] is dropped,
/// so wrap bounded streams (`stream.take(n)`) to sample exactly `n` items.
///
/// # Example
///
/// ```
/// use lhv_soft::sampler::prefetch;
///
/// let items: Vec<u32> = prefetch(0..5u32, 2).collect();
/// assert_eq!(items, vec![0, 1, 2, 3, 4]);
/// ```
pub fn prefetch<I>(source: I, capacity: usize) -> Prefetch<I::Item>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    let (tx, rx) = sync_channel(capacity.max(1));
    let worker = std::thread::spawn(move || {
        for item in source {
            if tx.send(item).is_err() {
                break;
            }
        }
    });
    Prefetch {
        rx: Some(rx),
        worker: Some(worker),
    }
}

/// Consumer side of [`prefetch`].
pub struct Prefetch<T> {
    rx: Option<Receiver<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T> Iterator for Prefetch<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl<T> Drop for Prefetch<T> {
    fn drop(&mut self) {
        // Disconnect first so a worker blocked on a full queue wakes up.
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("prefetch worker panicked");
            }
        }
    }
}
