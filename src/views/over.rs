//! Over-sampling by duplication or SMOTE

use super::{check_class, class_indices, class_len_of, make_rng, scan_labels};
use crate::data::{Sample, StreamSpec};
use crate::error::{Result, SampleError};
use crate::neighbors::find_nn;
use crate::samples::{sealed, Samples};
use crate::tools::stack_features;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Over-sampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverStrategy {
    /// Deep copies of randomly drawn class members
    #[default]
    Duplicate,
    /// Interpolation between a class member and one of its neighbors
    Smote,
}

/// View adding synthetic samples to selected classes
///
/// Indices `[0, n)` address the backing collection, indices from `n` on
/// address the synthetic samples.
pub struct OverSample<'a, S: Samples + ?Sized> {
    samples: &'a S,
    seed: Option<u64>,
    k_neighbors: usize,
    targets: BTreeMap<u32, (usize, OverStrategy)>,
    synthetic: Vec<Sample>,
    class_sizes: Vec<usize>,
}

impl<'a, S: Samples + ?Sized> OverSample<'a, S> {
    /// Create a view without synthetic samples
    pub fn new(samples: &'a S) -> Result<Self> {
        let mut view = Self {
            samples,
            seed: None,
            k_neighbors: 5,
            targets: BTreeMap::new(),
            synthetic: Vec::new(),
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

    /// Set number of SMOTE neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Result<Self> {
        self.k_neighbors = k.max(1);
        self.rebuild()?;
        Ok(self)
    }

    /// Add `count` synthetic samples to `class`
    pub fn set_over(&mut self, class: u32, count: usize, strategy: OverStrategy) -> Result<()> {
        check_class(self.samples, class)?;
        let previous = self.targets.insert(class, (count, strategy));
        if let Err(err) = self.rebuild() {
            match previous {
                Some(p) => self.targets.insert(class, p),
                None => self.targets.remove(&class),
            };
            self.rebuild()?;
            return Err(err);
        }
        Ok(())
    }

    /// Number of synthetic samples
    pub fn synthetic_len(&self) -> usize {
        self.synthetic.len()
    }

    fn rebuild(&mut self) -> Result<()> {
        let labels = scan_labels(self.samples)?;
        let per_class = class_indices(&labels, self.samples.class_count());
        let mut rng = make_rng(self.seed);

        let mut synthetic = Vec::new();
        let mut class_sizes: Vec<usize> = per_class.iter().map(Vec::len).collect();
        for (&class, &(count, strategy)) in &self.targets {
            if count == 0 {
                continue;
            }
            let members = &per_class[class as usize];
            match strategy {
                OverStrategy::Duplicate => {
                    self.duplicate(class, members, count, &mut rng, &mut synthetic)?
                }
                OverStrategy::Smote => self.smote(class, members, count, &mut rng, &mut synthetic)?,
            }
            class_sizes[class as usize] += count;
        }

        debug!("over-sampling added {} synthetic samples", synthetic.len());
        self.synthetic = synthetic;
        self.class_sizes = class_sizes;
        Ok(())
    }

    fn duplicate(
        &self,
        class: u32,
        members: &[usize],
        count: usize,
        rng: &mut Xoshiro256PlusPlus,
        out: &mut Vec<Sample>,
    ) -> Result<()> {
        if members.is_empty() {
            warn!("class {} has no samples to duplicate", class);
            return Err(SampleError::invalid(
                "class",
                format!("class {} has no samples", class),
            ));
        }
        for _ in 0..count {
            let pick = members[rng.gen_range(0..members.len())];
            out.push(self.samples.get(pick)?.deep_clone());
        }
        Ok(())
    }

    fn smote(
        &self,
        class: u32,
        members: &[usize],
        count: usize,
        rng: &mut Xoshiro256PlusPlus,
        out: &mut Vec<Sample>,
    ) -> Result<()> {
        if members.len() < 2 {
            warn!("class {} needs at least 2 samples for SMOTE", class);
            return Err(SampleError::InsufficientNeighbors {
                requested: 2,
                available: members.len(),
            });
        }
        let mut k = self.k_neighbors;
        if k > members.len() - 1 {
            warn!(
                "class {} has {} samples, using {} neighbors instead of {}",
                class,
                members.len(),
                members.len() - 1,
                k
            );
            k = members.len() - 1;
        }

        let class_samples = members
            .iter()
            .map(|&i| self.samples.get(i))
            .collect::<Result<Vec<_>>>()?;
        let matrix = stack_features(&class_samples, 0)?;

        for _ in 0..count {
            let base = rng.gen_range(0..class_samples.len());
            let query = matrix.row(base).to_vec();
            let nn = find_nn(&query, matrix.view(), k + 1)?;
            let candidates: Vec<usize> = nn
                .indices
                .iter()
                .copied()
                .filter(|&i| i != base)
                .take(k)
                .collect();
            let neighbor = matrix.row(candidates[rng.gen_range(0..candidates.len())]);

            let values: Vec<f64> = query
                .iter()
                .zip(neighbor.iter())
                .map(|(&b, &n)| {
                    let gap: f32 = rng.gen();
                    (b + gap * (n - b)) as f64
                })
                .collect();

            let mut sample = class_samples[base].deep_clone();
            sample.streams[0].set_values(&values)?;
            out.push(sample);
        }
        Ok(())
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for OverSample<'_, S> {}

impl<S: Samples + ?Sized> Samples for OverSample<'_, S> {
    fn len(&self) -> usize {
        self.samples.len() + self.synthetic.len()
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
        let n = self.samples.len();
        if index < n {
            return self.samples.get(index);
        }
        self.synthetic.get(index - n).cloned().ok_or_else(|| {
            warn!("sample index {} out of range", index);
            SampleError::out_of_range("sample", index, self.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Stream;
    use crate::samples::SampleList;

    fn list() -> SampleList {
        let mut list = SampleList::new();
        list.add_class_name("major");
        list.add_class_name("minor");
        list.add_user_name("u");
        for i in 0..8 {
            let x = i as f32;
            let stream = Stream::from_f32(&[x, 2.0 * x], 2, 1.0).unwrap();
            list.push(Sample::new(0, 0, i as f64, vec![stream])).unwrap();
        }
        for i in 0..3 {
            let x = 10.0 + i as f32;
            let stream = Stream::from_f32(&[x, -x], 2, 1.0).unwrap();
            list.push(Sample::new(1, 0, 8.0 + i as f64, vec![stream])).unwrap();
        }
        list
    }

    #[test]
    fn test_duplicate_counts() {
        let list = list();
        let mut view = OverSample::new(&list).unwrap().with_seed(3).unwrap();
        view.set_over(1, 5, OverStrategy::Duplicate).unwrap();
        assert_eq!(view.len(), 16);
        assert_eq!(view.class_len(1).unwrap(), 8);
        assert_eq!(view.class_len(0).unwrap(), 8);
        for i in list.len()..view.len() {
            assert_eq!(view.get(i).unwrap().class_id, 1);
        }
    }

    #[test]
    fn test_original_range_untouched() {
        let list = list();
        let mut view = OverSample::new(&list).unwrap().with_seed(3).unwrap();
        view.set_over(1, 2, OverStrategy::Smote).unwrap();
        for i in 0..list.len() {
            assert_eq!(view.get(i).unwrap(), list.get(i).unwrap());
        }
        assert!(view.get(view.len()).is_err());
    }

    #[test]
    fn test_smote_within_segment() {
        let list = list();
        let mut view = OverSample::new(&list)
            .unwrap()
            .with_seed(11)
            .unwrap()
            .with_k_neighbors(5)
            .unwrap();
        view.set_over(1, 20, OverStrategy::Smote).unwrap();
        for i in list.len()..view.len() {
            let values = view.get(i).unwrap().streams[0].values_f32().unwrap();
            assert!(values[0] >= 10.0 && values[0] <= 12.0);
            assert!(values[1] >= -12.0 && values[1] <= -10.0);
        }
    }

    #[test]
    fn test_smote_needs_two_samples() {
        let mut list = SampleList::new();
        list.add_class_name("solo");
        list.add_user_name("u");
        let stream = Stream::from_f32(&[1.0], 1, 1.0).unwrap();
        list.push(Sample::new(0, 0, 0.0, vec![stream])).unwrap();
        let mut view = OverSample::new(&list).unwrap();
        assert!(matches!(
            view.set_over(0, 1, OverStrategy::Smote),
            Err(SampleError::InsufficientNeighbors { .. })
        ));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_reproducible() {
        let list = list();
        let build = || {
            let mut view = OverSample::new(&list).unwrap().with_seed(5).unwrap();
            view.set_over(1, 4, OverStrategy::Smote).unwrap();
            view.set_over(0, 2, OverStrategy::Duplicate).unwrap();
            (0..view.len())
                .map(|i| view.get(i).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
