//! Data model
//!
//! Provides the two leaf types every collection is built from:
//! - [`Stream`] - a typed, fixed-dimension numeric buffer (one modality)
//! - [`Sample`] - one labeled observation holding one stream per modality
//!
//! Stream buffers are reference counted. Cloning a sample or a stream is
//! cheap and shares the bytes; [`Stream::deep_clone`] copies them.

mod sample;
mod stream;

pub use sample::{
    Sample, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME, GARBAGE_USER_ID, GARBAGE_USER_NAME,
};
pub use stream::{DataType, Stream, StreamSpec};
