//! Class selection

use super::{check_class, class_len_of, origin_of, scan_labels};
use crate::data::{Sample, StreamSpec, GARBAGE_CLASS_ID};
use crate::error::{Result, SampleError};
use crate::samples::{sealed, CursorState, Samples};
use tracing::warn;

/// View restricted to a subset of classes
///
/// Selected classes are renumbered `0..m` in selection order. Garbage
/// samples are dropped.
pub struct SelectClass<'a, S: Samples + ?Sized> {
    samples: &'a S,
    selection: Vec<u32>,
    relabel: Vec<Option<u32>>,
    origins: Vec<usize>,
    labels: Vec<u32>,
    class_sizes: Vec<usize>,
}

impl<'a, S: Samples + ?Sized> SelectClass<'a, S> {
    /// Create a view selecting every class
    pub fn new(samples: &'a S) -> Result<Self> {
        let all: Vec<u32> = (0..samples.class_count() as u32).collect();
        let mut view = Self {
            samples,
            selection: Vec::new(),
            relabel: Vec::new(),
            origins: Vec::new(),
            labels: Vec::new(),
            class_sizes: Vec::new(),
        };
        view.set_selection(&all)?;
        Ok(view)
    }

    /// Select `classes`, renumbered in the given order
    pub fn set_selection(&mut self, classes: &[u32]) -> Result<()> {
        let mut relabel = vec![None; self.samples.class_count()];
        for (new, &class) in classes.iter().enumerate() {
            check_class(self.samples, class)?;
            if relabel[class as usize].is_some() {
                warn!("class {} selected twice", class);
                return Err(SampleError::invalid(
                    "classes",
                    format!("class {} selected twice", class),
                ));
            }
            relabel[class as usize] = Some(new as u32);
        }

        let mut origins = Vec::new();
        let mut labels = Vec::new();
        let mut class_sizes = vec![0; classes.len()];
        for (i, l) in scan_labels(self.samples)?.iter().enumerate() {
            if let Some(new) = self.map(&relabel, l.class_id) {
                origins.push(i);
                labels.push(new);
                class_sizes[new as usize] += 1;
            }
        }

        self.selection = classes.to_vec();
        self.relabel = relabel;
        self.origins = origins;
        self.labels = labels;
        self.class_sizes = class_sizes;
        Ok(())
    }

    /// Backing class ids in selection order
    pub fn selection(&self) -> &[u32] {
        &self.selection
    }

    fn map(&self, relabel: &[Option<u32>], class: u32) -> Option<u32> {
        if class == GARBAGE_CLASS_ID {
            return None;
        }
        relabel.get(class as usize).copied().flatten()
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for SelectClass<'_, S> {}

impl<S: Samples + ?Sized> Samples for SelectClass<'_, S> {
    fn len(&self) -> usize {
        self.origins.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        class_len_of(&self.class_sizes, class)
    }

    fn class_count(&self) -> usize {
        self.selection.len()
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        if class == GARBAGE_CLASS_ID {
            return self.samples.class_name(class);
        }
        match self.selection.get(class as usize) {
            Some(&origin) => self.samples.class_name(origin),
            None => {
                warn!("class index {} out of range", class);
                Err(SampleError::out_of_range(
                    "class",
                    class as usize,
                    self.selection.len(),
                ))
            }
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
        let mut sample = self.samples.get(origin_of(&self.origins, index)?)?;
        sample.class_id = self.labels[index];
        Ok(sample)
    }

    /// Walks the backing cursor and applies the selection on the fly
    fn advance(&self, state: &mut CursorState) -> Option<Result<Sample>> {
        loop {
            match self.samples.advance(state.inner_mut())? {
                Ok(mut sample) => {
                    if let Some(new) = self.map(&self.relabel, sample.class_id) {
                        sample.class_id = new;
                        state.position += 1;
                        return Some(Ok(sample));
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Stream;
    use crate::samples::{Cursor, SampleList};

    fn list() -> SampleList {
        let mut list = SampleList::new();
        for name in ["a", "b", "c"] {
            list.add_class_name(name);
        }
        list.add_user_name("u");
        for (i, class) in [0, 1, 2, GARBAGE_CLASS_ID, 2, 0, 1].into_iter().enumerate() {
            let stream = Stream::from_f32(&[i as f32], 1, 1.0).unwrap();
            list.push(Sample::new(class, 0, i as f64, vec![stream])).unwrap();
        }
        list
    }

    #[test]
    fn test_select_renumbers() {
        let list = list();
        let mut view = SelectClass::new(&list).unwrap();
        assert_eq!(view.len(), 6);
        view.set_selection(&[2, 0]).unwrap();
        assert_eq!(view.len(), 4);
        assert_eq!(view.class_count(), 2);
        assert_eq!(view.class_name(0).unwrap(), "c");
        assert_eq!(view.class_name(1).unwrap(), "a");
        assert_eq!(view.class_len(0).unwrap(), 2);
        let first = view.get(0).unwrap();
        assert_eq!((first.class_id, first.time), (1, 0.0));
        assert_eq!(list.get(0).unwrap().class_id, 0);
    }

    #[test]
    fn test_cursor_agrees_with_get() {
        let list = list();
        let mut view = SelectClass::new(&list).unwrap();
        view.set_selection(&[1, 2]).unwrap();
        let walked: Vec<Sample> = Cursor::new(&view).map(|s| s.unwrap()).collect();
        assert_eq!(walked.len(), view.len());
        for (i, sample) in walked.iter().enumerate() {
            assert_eq!(*sample, view.get(i).unwrap());
        }
    }

    #[test]
    fn test_invalid_selection() {
        let list = list();
        let mut view = SelectClass::new(&list).unwrap();
        assert!(view.set_selection(&[3]).is_err());
        assert!(view.set_selection(&[1, 1]).is_err());
        assert_eq!(view.class_count(), 3);
    }
}
