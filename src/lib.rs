//! Sampleset - labeled multimodal sample collections
//!
//! This crate provides an in-memory and on-disk model of labeled samples,
//! each carrying one typed feature stream per modality, plus views for
//! rebalancing and relabeling them.
//!
//! # Modules
//!
//! ## Data model
//! - [`data`] - Typed streams and labeled samples
//! - [`samples`] - The [`Samples`](samples::Samples) contract, cursors and the owned list
//!
//! ## Views
//! - [`views`] - Normalization, under/over-sampling, class/user selection,
//!   relabeling and missing-data filtering
//! - [`neighbors`] - Brute-force k nearest neighbors
//!
//! ## Persistence
//! - [`storage`] - Versioned sample files (V2 inline, V3 side-car streams)
//!
//! ## Utilities
//! - [`tools`] - Feature matrices, copy/merge, synthetic test data
//! - [`cli`] - Command-line interface

pub mod error;

// Data model
pub mod data;
pub mod samples;

// Views
pub mod neighbors;
pub mod views;

// Persistence
pub mod storage;

// Utilities
pub mod tools;
pub mod cli;

pub use error::{Result, SampleError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, SampleError};

    // Data model
    pub use crate::data::{
        DataType, Sample, Stream, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_USER_ID,
    };
    pub use crate::samples::{CopyMode, Cursor, NamePolicy, SampleList, Samples};

    // Views
    pub use crate::views::{
        MissingData, NormMethod, NormParams, NormView, OverSample, OverStrategy, ReClass,
        SelectClass, SelectUser, UnderSample, UnderStrategy,
    };

    // Persistence
    pub use crate::storage::{FileType, SampleReader, SampleWriter, StorageConfig, Version};

    // Tools
    pub use crate::tools::{load_samples, save_samples, SamplesInfo};
}
