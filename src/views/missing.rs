//! Missing-data filter

use super::{class_len_of, count_classes, origin_of, scan_labels};
use crate::data::{Sample, StreamSpec};
use crate::error::{Result, SampleError};
use crate::samples::{sealed, Cursor, Samples};
use tracing::warn;

/// View dropping samples whose chosen stream is empty
///
/// Until a stream is chosen every sample passes.
pub struct MissingData<'a, S: Samples + ?Sized> {
    samples: &'a S,
    stream: Option<usize>,
    origins: Vec<usize>,
    class_sizes: Vec<usize>,
    has_missing_data: bool,
}

impl<'a, S: Samples + ?Sized> MissingData<'a, S> {
    pub fn new(samples: &'a S) -> Result<Self> {
        let labels = scan_labels(samples)?;
        Ok(Self {
            samples,
            stream: None,
            origins: (0..labels.len()).collect(),
            class_sizes: count_classes(labels.iter().map(|l| l.class_id), samples.class_count()),
            has_missing_data: samples.has_missing_data(),
        })
    }

    /// Keep only samples whose stream `index` has rows
    pub fn set_stream(&mut self, index: usize) -> Result<()> {
        if index >= self.samples.stream_count() {
            warn!("stream index {} out of range", index);
            return Err(SampleError::out_of_range(
                "stream",
                index,
                self.samples.stream_count(),
            ));
        }

        let mut origins = Vec::new();
        let mut classes = Vec::new();
        let mut has_missing_data = false;
        for (i, sample) in Cursor::new(self.samples).enumerate() {
            let sample = sample?;
            if sample.stream(index)?.is_missing() {
                continue;
            }
            has_missing_data |= sample.has_missing_stream();
            origins.push(i);
            classes.push(sample.class_id);
        }

        self.stream = Some(index);
        self.origins = origins;
        self.class_sizes = count_classes(classes, self.samples.class_count());
        self.has_missing_data = has_missing_data;
        Ok(())
    }

    /// Stream the filter applies to
    pub fn stream_index(&self) -> Option<usize> {
        self.stream
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for MissingData<'_, S> {}

impl<S: Samples + ?Sized> Samples for MissingData<'_, S> {
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
        self.has_missing_data
    }

    fn supports_shallow_copy(&self) -> bool {
        self.samples.supports_shallow_copy()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples.get(origin_of(&self.origins, index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Stream;
    use crate::samples::SampleList;

    fn list() -> SampleList {
        let mut list = SampleList::new();
        list.add_class_name("a");
        list.add_user_name("u");
        for i in 0..6 {
            let mut a = Stream::from_f32(&[i as f32], 1, 1.0).unwrap();
            let mut b = Stream::from_f32(&[i as f32, 0.0], 2, 1.0).unwrap();
            if i % 2 == 0 {
                a.reset();
            }
            if i == 1 {
                b.reset();
            }
            list.push(Sample::new(0, 0, i as f64, vec![a, b])).unwrap();
        }
        list
    }

    #[test]
    fn test_filters_missing() {
        let list = list();
        let mut view = MissingData::new(&list).unwrap();
        assert_eq!(view.len(), 6);
        view.set_stream(0).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.class_len(0).unwrap(), 3);
        assert!(view.has_missing_data());
        assert!((0..view.len()).all(|i| !view.get(i).unwrap().streams[0].is_missing()));
    }

    #[test]
    fn test_reselect_rebuilds() {
        let list = list();
        let mut view = MissingData::new(&list).unwrap();
        view.set_stream(0).unwrap();
        view.set_stream(1).unwrap();
        assert_eq!(view.len(), 5);
        view.set_stream(1).unwrap();
        assert_eq!(view.len(), 5);
        assert!(view.set_stream(2).is_err());
    }
}
