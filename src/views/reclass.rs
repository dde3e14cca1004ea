//! Arbitrary reclassification

use super::{class_len_of, count_classes};
use crate::data::{Sample, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME};
use crate::error::{Result, SampleError};
use crate::samples::{lookup, sealed, Samples};
use tracing::warn;

struct Relabeling {
    class_names: Vec<String>,
    labels: Vec<u32>,
    class_sizes: Vec<usize>,
}

/// View assigning a new class label to every backing sample
///
/// Until [`ReClass::set_reclass`] is called the view passes labels through.
pub struct ReClass<'a, S: Samples + ?Sized> {
    samples: &'a S,
    relabeling: Option<Relabeling>,
}

impl<'a, S: Samples + ?Sized> ReClass<'a, S> {
    pub fn new(samples: &'a S) -> Self {
        Self {
            samples,
            relabeling: None,
        }
    }

    /// Replace the class table and give each backing sample a label
    pub fn set_reclass(&mut self, class_names: Vec<String>, labels: Vec<u32>) -> Result<()> {
        if labels.len() != self.samples.len() {
            warn!(
                "{} labels for {} samples",
                labels.len(),
                self.samples.len()
            );
            return Err(SampleError::SchemaMismatch(format!(
                "{} labels for {} samples",
                labels.len(),
                self.samples.len()
            )));
        }
        if let Some(&bad) = labels
            .iter()
            .find(|&&l| l != GARBAGE_CLASS_ID && l as usize >= class_names.len())
        {
            warn!("class index {} out of range", bad);
            return Err(SampleError::out_of_range(
                "class",
                bad as usize,
                class_names.len(),
            ));
        }
        let class_sizes = count_classes(labels.iter().copied(), class_names.len());
        self.relabeling = Some(Relabeling {
            class_names,
            labels,
            class_sizes,
        });
        Ok(())
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for ReClass<'_, S> {}

impl<S: Samples + ?Sized> Samples for ReClass<'_, S> {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        match &self.relabeling {
            Some(r) => class_len_of(&r.class_sizes, class),
            None => self.samples.class_len(class),
        }
    }

    fn class_count(&self) -> usize {
        match &self.relabeling {
            Some(r) => r.class_names.len(),
            None => self.samples.class_count(),
        }
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        match &self.relabeling {
            Some(r) => lookup(
                &r.class_names,
                class,
                GARBAGE_CLASS_ID,
                GARBAGE_CLASS_NAME,
                "class",
            ),
            None => self.samples.class_name(class),
        }
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
        let mut sample = self.samples.get(index)?;
        if let Some(r) = &self.relabeling {
            sample.class_id = r.labels[index];
        }
        Ok(sample)
    }
}
