//! Owned in-memory sample list

use super::{sealed, Samples};
use crate::data::{
    Sample, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME, GARBAGE_USER_ID, GARBAGE_USER_NAME,
};
use crate::error::{Result, SampleError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How stream buffers are taken over by [`SampleList::add_sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CopyMode {
    /// Copy the bytes into buffers owned by the list
    #[default]
    Deep,
    /// Share the caller's buffers
    Shallow,
}

/// How class and user names are registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamePolicy {
    /// Always append; equal names get distinct indices
    #[default]
    Append,
    /// Return the index of an existing equal name
    Dedupe,
}

/// Owned collection of samples with class and user name tables
#[derive(Debug, Clone, Default)]
pub struct SampleList {
    samples: Vec<Sample>,
    class_names: Vec<String>,
    user_names: Vec<String>,
    streams: Vec<StreamSpec>,
    feature_names: Option<Vec<String>>,
    has_missing_data: bool,
    name_policy: NamePolicy,
}

impl SampleList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name registration policy
    pub fn with_name_policy(mut self, policy: NamePolicy) -> Self {
        self.name_policy = policy;
        self
    }

    pub fn name_policy(&self) -> NamePolicy {
        self.name_policy
    }

    /// Register a class name and return its index
    pub fn add_class_name(&mut self, name: &str) -> u32 {
        register(&mut self.class_names, name, self.name_policy)
    }

    /// Register a user name and return its index
    pub fn add_user_name(&mut self, name: &str) -> u32 {
        register(&mut self.user_names, name, self.name_policy)
    }

    /// Append a sample, copying or sharing its stream buffers
    pub fn add_sample(&mut self, sample: &Sample, mode: CopyMode) -> Result<()> {
        self.check(sample)?;
        let sample = match mode {
            CopyMode::Deep => sample.deep_clone(),
            CopyMode::Shallow => sample.clone(),
        };
        self.insert(sample);
        Ok(())
    }

    /// Append a sample, taking ownership of it
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        self.check(&sample)?;
        self.insert(sample);
        Ok(())
    }

    /// Stable sort by ascending timestamp
    pub fn sort(&mut self) {
        self.samples.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Remove all samples, names and stream templates
    pub fn clear(&mut self) {
        self.samples.clear();
        self.class_names.clear();
        self.user_names.clear();
        self.streams.clear();
        self.feature_names = None;
        self.has_missing_data = false;
    }

    pub fn set_missing_data(&mut self, missing: bool) {
        self.has_missing_data = missing;
    }

    /// Name the features; the count must equal [`Samples::feature_count`]
    pub fn set_feature_names(&mut self, names: Vec<String>) -> Result<()> {
        let expected = self.feature_count();
        if self.samples.is_empty() || names.len() != expected {
            warn!(
                "number of features ({}) not compatible to sample list ({})",
                names.len(),
                expected
            );
            return Err(SampleError::SchemaMismatch(format!(
                "{} feature names for {} features",
                names.len(),
                expected
            )));
        }
        self.feature_names = Some(names);
        Ok(())
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn user_names(&self) -> &[String] {
        &self.user_names
    }

    /// Borrow the sample at `index`
    pub fn sample(&self, index: usize) -> Result<&Sample> {
        let len = self.samples.len();
        self.samples.get(index).ok_or_else(|| {
            warn!("sample index {} out of range", index);
            SampleError::out_of_range("sample", index, len)
        })
    }

    /// Mutable sample access for tooling; stream shapes must be kept
    pub fn sample_mut(&mut self, index: usize) -> Result<&mut Sample> {
        let len = self.samples.len();
        self.samples.get_mut(index).ok_or_else(|| {
            warn!("sample index {} out of range", index);
            SampleError::out_of_range("sample", index, len)
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Sample> {
        self.samples.iter_mut()
    }

    fn check(&self, sample: &Sample) -> Result<()> {
        if sample.user_id != GARBAGE_USER_ID && sample.user_id as usize >= self.user_names.len() {
            warn!("sample exceeds user id");
            return Err(SampleError::out_of_range(
                "user",
                sample.user_id as usize,
                self.user_names.len(),
            ));
        }
        if sample.class_id != GARBAGE_CLASS_ID && sample.class_id as usize >= self.class_names.len()
        {
            warn!("sample exceeds class id");
            return Err(SampleError::out_of_range(
                "class",
                sample.class_id as usize,
                self.class_names.len(),
            ));
        }
        if self.samples.is_empty() {
            return Ok(());
        }
        if sample.streams.len() != self.streams.len() {
            warn!("#stream not compatible");
            return Err(SampleError::IncompatibleStream(format!(
                "sample has {} streams, list has {}",
                sample.streams.len(),
                self.streams.len()
            )));
        }
        for (i, (spec, stream)) in self.streams.iter().zip(&sample.streams).enumerate() {
            if !spec.is_compatible(stream) {
                warn!("stream#{:02} not compatible", i);
                return Err(SampleError::IncompatibleStream(format!(
                    "stream#{:02} is {}x{} {}, expected {}x{} {}",
                    i,
                    stream.dim(),
                    stream.byte(),
                    stream.data_type(),
                    spec.dim,
                    spec.byte,
                    spec.data_type
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, sample: Sample) {
        if self.samples.is_empty() {
            self.streams = sample.streams.iter().map(|s| s.spec()).collect();
        }
        if sample.has_missing_stream() {
            self.has_missing_data = true;
        }
        self.samples.push(sample);
    }
}

fn register(names: &mut Vec<String>, name: &str, policy: NamePolicy) -> u32 {
    if policy == NamePolicy::Dedupe {
        if let Some(index) = names.iter().position(|n| n == name) {
            return index as u32;
        }
    }
    names.push(name.to_string());
    (names.len() - 1) as u32
}

/// Resolve a name from a table, mapping the garbage id to `garbage`
pub(crate) fn lookup<'a>(
    names: &'a [String],
    id: u32,
    garbage_id: u32,
    garbage: &'static str,
    what: &'static str,
) -> Result<&'a str> {
    if id == garbage_id {
        return Ok(garbage);
    }
    names.get(id as usize).map(String::as_str).ok_or_else(|| {
        warn!("{} index {} out of range", what, id);
        SampleError::out_of_range(what, id as usize, names.len())
    })
}

pub(crate) fn stream_spec<'a>(streams: &'a [StreamSpec], index: usize) -> Result<&'a StreamSpec> {
    streams.get(index).ok_or_else(|| {
        warn!("index '{}' exceeds #streams '{}'", index, streams.len());
        SampleError::out_of_range("stream", index, streams.len())
    })
}

impl sealed::Sealed for SampleList {}

impl Samples for SampleList {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        if class as usize >= self.class_names.len() {
            warn!("class index {} out of range", class);
            return Err(SampleError::out_of_range(
                "class",
                class as usize,
                self.class_names.len(),
            ));
        }
        Ok(self.samples.iter().filter(|s| s.class_id == class).count())
    }

    fn class_count(&self) -> usize {
        self.class_names.len()
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        lookup(
            &self.class_names,
            class,
            GARBAGE_CLASS_ID,
            GARBAGE_CLASS_NAME,
            "class",
        )
    }

    fn user_count(&self) -> usize {
        self.user_names.len()
    }

    fn user_name(&self, user: u32) -> Result<&str> {
        lookup(
            &self.user_names,
            user,
            GARBAGE_USER_ID,
            GARBAGE_USER_NAME,
            "user",
        )
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn stream(&self, index: usize) -> Result<&StreamSpec> {
        stream_spec(&self.streams, index)
    }

    fn has_missing_data(&self) -> bool {
        self.has_missing_data
    }

    fn supports_shallow_copy(&self) -> bool {
        true
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.sample(index).cloned()
    }
}

impl<'a> IntoIterator for &'a SampleList {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, Stream};

    fn stream(values: &[f32]) -> Stream {
        Stream::from_f32(values, 2, 10.0).unwrap()
    }

    fn named_list() -> SampleList {
        let mut list = SampleList::new();
        list.add_class_name("walk");
        list.add_class_name("run");
        list.add_user_name("alice");
        list
    }

    #[test]
    fn test_add_and_count() {
        let mut list = named_list();
        list.push(Sample::new(0, 0, 1.0, vec![stream(&[1.0, 2.0])]))
            .unwrap();
        list.push(Sample::new(1, 0, 2.0, vec![stream(&[3.0, 4.0])]))
            .unwrap();
        list.push(Sample::new(1, 0, 3.0, vec![stream(&[5.0, 6.0])]))
            .unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.class_len(0).unwrap(), 1);
        assert_eq!(list.class_len(1).unwrap(), 2);
        assert!(list.class_len(2).is_err());
        assert_eq!(list.stream(0).unwrap().dim, 2);
        assert_eq!(list.feature_count(), 2);
    }

    #[test]
    fn test_deep_and_shallow_copy() {
        let mut list = named_list();
        let sample = Sample::new(0, 0, 0.0, vec![stream(&[1.0, 2.0])]);
        list.add_sample(&sample, CopyMode::Deep).unwrap();
        list.add_sample(&sample, CopyMode::Shallow).unwrap();
        assert!(!list.sample(0).unwrap().streams[0].shares_buffer(&sample.streams[0]));
        assert!(list.sample(1).unwrap().streams[0].shares_buffer(&sample.streams[0]));
        drop(sample);
        assert_eq!(
            list.sample(1).unwrap().streams[0].values_f32().unwrap(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn test_rejects_incompatible_stream() {
        let mut list = named_list();
        list.push(Sample::new(0, 0, 0.0, vec![stream(&[1.0, 2.0])]))
            .unwrap();
        let wide = Stream::from_f32(&[1.0, 2.0, 3.0], 3, 10.0).unwrap();
        let err = list.push(Sample::new(0, 0, 0.0, vec![wide])).unwrap_err();
        assert!(matches!(err, SampleError::IncompatibleStream(_)));

        let spec = StreamSpec::new(2, DataType::Double, 10.0);
        let double = Stream::from_values(&spec, &[1.0, 2.0]).unwrap();
        assert!(list.push(Sample::new(0, 0, 0.0, vec![double])).is_err());
        assert!(list.push(Sample::new(0, 0, 0.0, vec![])).is_err());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_labels() {
        let mut list = named_list();
        let err = list
            .push(Sample::new(5, 0, 0.0, vec![stream(&[1.0, 2.0])]))
            .unwrap_err();
        assert!(matches!(err, SampleError::IndexOutOfRange { what: "class", .. }));
        assert!(list
            .push(Sample::new(0, 3, 0.0, vec![stream(&[1.0, 2.0])]))
            .is_err());
        list.push(Sample::new(
            GARBAGE_CLASS_ID,
            GARBAGE_USER_ID,
            0.0,
            vec![stream(&[1.0, 2.0])],
        ))
        .unwrap();
        assert_eq!(list.garbage_len(), 1);
    }

    #[test]
    fn test_name_policy() {
        let mut list = SampleList::new();
        assert_eq!(list.add_class_name("a"), 0);
        assert_eq!(list.add_class_name("a"), 1);

        let mut list = SampleList::new().with_name_policy(NamePolicy::Dedupe);
        assert_eq!(list.add_class_name("a"), 0);
        assert_eq!(list.add_class_name("b"), 1);
        assert_eq!(list.add_class_name("a"), 0);
        assert_eq!(list.class_count(), 2);
    }

    #[test]
    fn test_garbage_names() {
        let list = named_list();
        assert_eq!(list.class_name(GARBAGE_CLASS_ID).unwrap(), "GARBAGE");
        assert_eq!(list.user_name(GARBAGE_USER_ID).unwrap(), "NOBODY");
        assert_eq!(list.class_name(1).unwrap(), "run");
        assert!(list.user_name(1).is_err());
    }

    #[test]
    fn test_sort_is_stable() {
        let mut list = named_list();
        for (class, time) in [(0, 3.0), (0, 1.0), (1, 1.0), (1, 2.0)] {
            list.push(Sample::new(class, 0, time, vec![stream(&[0.0, 0.0])]))
                .unwrap();
        }
        list.sort();
        let order: Vec<(u32, f64)> = list.iter().map(|s| (s.class_id, s.time)).collect();
        assert_eq!(order, vec![(0, 1.0), (1, 1.0), (1, 2.0), (0, 3.0)]);
    }

    #[test]
    fn test_missing_data_flag() {
        let mut list = named_list();
        list.push(Sample::new(0, 0, 0.0, vec![stream(&[1.0, 2.0])]))
            .unwrap();
        assert!(!list.has_missing_data());
        let mut empty = stream(&[1.0, 2.0]);
        empty.reset();
        list.push(Sample::new(0, 0, 1.0, vec![empty])).unwrap();
        assert!(list.has_missing_data());
    }

    #[test]
    fn test_feature_names() {
        let mut list = named_list();
        assert!(list.set_feature_names(vec!["x".into()]).is_err());
        list.push(Sample::new(0, 0, 0.0, vec![stream(&[1.0, 2.0])]))
            .unwrap();
        assert!(list.set_feature_names(vec!["x".into()]).is_err());
        list.set_feature_names(vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(list.feature_names().unwrap().len(), 2);
    }
}
