//! Random under-sampling

use super::{check_class, class_indices, class_len_of, make_rng, origin_of, scan_labels};
use crate::data::{Sample, StreamSpec};
use crate::error::{Result, SampleError};
use crate::samples::{sealed, Samples};
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Under-sampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnderStrategy {
    /// Uniform draw without replacement
    #[default]
    Random,
}

/// View keeping a random subset of selected classes
///
/// Classes without a target and garbage samples pass through unchanged.
/// Surviving samples keep their backing order.
pub struct UnderSample<'a, S: Samples + ?Sized> {
    samples: &'a S,
    seed: Option<u64>,
    targets: BTreeMap<u32, (usize, UnderStrategy)>,
    origins: Vec<usize>,
    class_sizes: Vec<usize>,
}

impl<'a, S: Samples + ?Sized> UnderSample<'a, S> {
    /// Create a view that initially keeps every sample
    pub fn new(samples: &'a S) -> Result<Self> {
        let mut view = Self {
            samples,
            seed: None,
            targets: BTreeMap::new(),
            origins: Vec::new(),
            class_sizes: Vec::new(),
        };
        view.rebuild()?;
        Ok(view)
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Result<Self> {
        self.seed = Some(seed);
        self.rebuild()?;
        Ok(self)
    }

    /// Keep `count` samples of `class`
    pub fn set_under(&mut self, class: u32, count: usize, strategy: UnderStrategy) -> Result<()> {
        check_class(self.samples, class)?;
        let available = self.samples.class_len(class)?;
        if count > available {
            warn!("cannot keep {} of {} samples in class {}", count, available, class);
            return Err(SampleError::invalid(
                "count",
                format!("class {} holds only {} samples", class, available),
            ));
        }
        self.targets.insert(class, (count, strategy));
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<()> {
        let labels = scan_labels(self.samples)?;
        let n_classes = self.samples.class_count();
        let per_class = class_indices(&labels, n_classes);
        let mut rng = make_rng(self.seed);

        let mut keep = vec![true; labels.len()];
        self.class_sizes = per_class.iter().map(Vec::len).collect();
        for (&class, &(count, strategy)) in &self.targets {
            let members = &per_class[class as usize];
            match strategy {
                UnderStrategy::Random => {
                    let chosen = index::sample(&mut rng, members.len(), count);
                    for &i in members {
                        keep[i] = false;
                    }
                    for c in chosen.iter() {
                        keep[members[c]] = true;
                    }
                }
            }
            self.class_sizes[class as usize] = count;
        }

        self.origins = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        debug!(
            "under-sampled {} of {} samples",
            self.origins.len(),
            labels.len()
        );
        Ok(())
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for UnderSample<'_, S> {}

impl<S: Samples + ?Sized> Samples for UnderSample<'_, S> {
    fn len(&self) -> usize {
        self.origins.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        class_len_of(&self.class_sizes, class)
    }

    fn class_count(&self) -> usize {
        self.samples.class_count()
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        self.samples.class_name(class)
    }

    fn user_count(&self) -> usize {
        self.samples.user_count()
    }

    fn user_name(&self, user: u32) -> Result<&str> {
        self.samples.user_name(user)
    }

    fn stream_count(&self) -> usize {
        self.samples.stream_count()
    }

    fn stream(&self, index: usize) -> Result<&StreamSpec> {
        self.samples.stream(index)
    }

    fn has_missing_data(&self) -> bool {
        self.samples.has_missing_data()
    }

    fn supports_shallow_copy(&self) -> bool {
        self.samples.supports_shallow_copy()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples.get(origin_of(&self.origins, index)?)
    }
}
