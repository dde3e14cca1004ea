//! Views over sample collections
//!
//! Each view borrows a backing [`Samples`] collection and re-reads it
//! through an index map, a relabeling table or a value transform:
//! - [`NormView`] - per-stream SCALE / ZSCORE normalization
//! - [`UnderSample`] - random under-sampling per class
//! - [`OverSample`] - duplicate or SMOTE over-sampling per class
//! - [`SelectClass`] / [`SelectUser`] - subset and renumber labels
//! - [`ReClass`] - replace every class label
//! - [`MissingData`] - drop samples with an empty stream
//!
//! Views never modify the backing collection. Samples are returned owned,
//! with labels rewritten on the copy. Views compose, since every view is
//! itself a [`Samples`].

mod missing;
mod norm;
mod over;
mod reclass;
mod select_class;
mod select_user;
mod under;

pub use missing::MissingData;
pub use norm::{NormMethod, NormParams, NormView};
pub use over::{OverSample, OverStrategy};
pub use reclass::ReClass;
pub use select_class::SelectClass;
pub use select_user::SelectUser;
pub use under::{UnderSample, UnderStrategy};

use crate::data::GARBAGE_CLASS_ID;
use crate::error::{Result, SampleError};
use crate::samples::{Cursor, Samples};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::warn;

/// Labels of one backing sample
#[derive(Debug, Clone, Copy)]
pub(crate) struct Labels {
    pub class_id: u32,
    pub user_id: u32,
    pub missing: bool,
}

/// Read the labels of every backing sample in order
pub(crate) fn scan_labels<S: Samples + ?Sized>(samples: &S) -> Result<Vec<Labels>> {
    Cursor::new(samples)
        .map(|sample| {
            sample.map(|s| Labels {
                class_id: s.class_id,
                user_id: s.user_id,
                missing: s.has_missing_stream(),
            })
        })
        .collect()
}

/// Count samples per class, skipping garbage and unknown ids
pub(crate) fn count_classes(classes: impl IntoIterator<Item = u32>, n_classes: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_classes];
    for class in classes {
        if class != GARBAGE_CLASS_ID {
            if let Some(size) = sizes.get_mut(class as usize) {
                *size += 1;
            }
        }
    }
    sizes
}

/// Backing indices per class
pub(crate) fn class_indices(labels: &[Labels], n_classes: usize) -> Vec<Vec<usize>> {
    let mut indices = vec![Vec::new(); n_classes];
    for (i, l) in labels.iter().enumerate() {
        if let Some(list) = indices.get_mut(l.class_id as usize) {
            list.push(i);
        }
    }
    indices
}

pub(crate) fn class_len_of(sizes: &[usize], class: u32) -> Result<usize> {
    sizes.get(class as usize).copied().ok_or_else(|| {
        warn!("class index {} out of range", class);
        SampleError::out_of_range("class", class as usize, sizes.len())
    })
}

/// Fetch a mapped position, failing on an out-of-range view index
pub(crate) fn origin_of(origins: &[usize], index: usize) -> Result<usize> {
    origins.get(index).copied().ok_or_else(|| {
        warn!("sample index {} out of range", index);
        SampleError::out_of_range("sample", index, origins.len())
    })
}

/// Seeded or entropy-seeded generator
pub(crate) fn make_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Check a class id against the backing class count
pub(crate) fn check_class<S: Samples + ?Sized>(samples: &S, class: u32) -> Result<()> {
    if class as usize >= samples.class_count() {
        warn!("class index {} out of range", class);
        return Err(SampleError::out_of_range(
            "class",
            class as usize,
            samples.class_count(),
        ));
    }
    Ok(())
}
