//! Sample collection contract
//!
//! [`Samples`] is the read interface shared by the owned [`SampleList`], the
//! file-backed [`SampleReader`](crate::storage::SampleReader) and every view
//! in [`crate::views`]. The set of implementations is closed: the trait is
//! sealed.
//!
//! Iteration state lives in a [`Cursor`], not in the collection, so one
//! collection can be walked by any number of cursors at once.

mod list;

pub use list::{CopyMode, NamePolicy, SampleList};
pub(crate) use list::{lookup, stream_spec};

use crate::data::{Sample, StreamSpec};
use crate::error::Result;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Read access to a labeled multimodal collection
///
/// Every accessor is bounds checked. Out-of-range indices are logged and
/// returned as [`SampleError::IndexOutOfRange`](crate::SampleError::IndexOutOfRange).
pub trait Samples: sealed::Sealed {
    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of samples labeled with `class`
    fn class_len(&self, class: u32) -> Result<usize>;

    /// Number of classes (the garbage class is not counted)
    fn class_count(&self) -> usize;

    /// Class name; the garbage id maps to `"GARBAGE"`
    fn class_name(&self, class: u32) -> Result<&str>;

    /// Number of users
    fn user_count(&self) -> usize;

    /// User name; the garbage id maps to `"NOBODY"`
    fn user_name(&self, user: u32) -> Result<&str>;

    /// Number of streams per sample
    fn stream_count(&self) -> usize;

    /// Shape template of stream `index`
    fn stream(&self, index: usize) -> Result<&StreamSpec>;

    /// Whether some sample carries an empty stream
    fn has_missing_data(&self) -> bool;

    /// Whether returned samples share buffers with the underlying storage
    fn supports_shallow_copy(&self) -> bool;

    /// Sample at `index`
    fn get(&self, index: usize) -> Result<Sample>;

    /// Produce the sample under `state` and move past it.
    ///
    /// Defaults to random access; implementations override this when
    /// sequential access is cheaper or the order differs.
    fn advance(&self, state: &mut CursorState) -> Option<Result<Sample>> {
        if state.position >= self.len() {
            return None;
        }
        let sample = self.get(state.position);
        state.position += 1;
        Some(sample)
    }

    /// Number of garbage samples
    fn garbage_len(&self) -> usize {
        let labeled: usize = (0..self.class_count() as u32)
            .filter_map(|c| self.class_len(c).ok())
            .sum();
        self.len().saturating_sub(labeled)
    }

    /// Sum of all stream dimensions
    fn feature_count(&self) -> usize {
        (0..self.stream_count())
            .filter_map(|i| self.stream(i).ok())
            .map(|s| s.dim)
            .sum()
    }

    /// New cursor at the first sample
    fn cursor(&self) -> Cursor<'_, Self>
    where
        Self: Sized,
    {
        Cursor::new(self)
    }
}

/// Position of a cursor
///
/// `inner` holds the position of a cursor over a backing collection for
/// views that walk their backing sequentially.
#[derive(Debug, Clone, Default)]
pub struct CursorState {
    pub(crate) position: usize,
    pub(crate) inner: Option<Box<CursorState>>,
}

impl CursorState {
    /// Number of samples produced so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn inner_mut(&mut self) -> &mut CursorState {
        self.inner.get_or_insert_with(Box::default)
    }
}

/// Iterator over a collection, independent of the collection itself
pub struct Cursor<'a, S: Samples + ?Sized> {
    samples: &'a S,
    state: CursorState,
}

impl<'a, S: Samples + ?Sized> Cursor<'a, S> {
    pub fn new(samples: &'a S) -> Self {
        Self {
            samples,
            state: CursorState::default(),
        }
    }

    /// Rewind to the first sample
    pub fn reset(&mut self) {
        self.state = CursorState::default();
    }

    pub fn position(&self) -> usize {
        self.state.position
    }
}

impl<'a, S: Samples + ?Sized> Iterator for Cursor<'a, S> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.samples.advance(&mut self.state)
    }
}
