//! Labeled multimodal samples

use super::stream::Stream;
use crate::error::{Result, SampleError};

/// Class id of samples without a class
pub const GARBAGE_CLASS_ID: u32 = u32::MAX;
/// User id of samples without a user
pub const GARBAGE_USER_ID: u32 = u32::MAX;
/// Name reported for the garbage class
pub const GARBAGE_CLASS_NAME: &str = "GARBAGE";
/// Name reported for the garbage user
pub const GARBAGE_USER_NAME: &str = "NOBODY";

/// One labeled observation with one stream per modality
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Class index or [`GARBAGE_CLASS_ID`]
    pub class_id: u32,
    /// User index or [`GARBAGE_USER_ID`]
    pub user_id: u32,
    /// Timestamp in seconds
    pub time: f64,
    /// Confidence score
    pub score: f32,
    /// Streams, one per modality
    pub streams: Vec<Stream>,
}

impl Sample {
    /// Create a new sample with score 1.0
    pub fn new(class_id: u32, user_id: u32, time: f64, streams: Vec<Stream>) -> Self {
        Self {
            class_id,
            user_id,
            time,
            score: 1.0,
            streams,
        }
    }

    /// Set the confidence score
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn is_garbage(&self) -> bool {
        self.class_id == GARBAGE_CLASS_ID
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Stream at `index`
    pub fn stream(&self, index: usize) -> Result<&Stream> {
        self.streams
            .get(index)
            .ok_or_else(|| SampleError::out_of_range("stream", index, self.streams.len()))
    }

    /// Whether any stream has no rows
    pub fn has_missing_stream(&self) -> bool {
        self.streams.iter().any(Stream::is_missing)
    }

    /// Copy with private stream buffers
    pub fn deep_clone(&self) -> Sample {
        Sample {
            streams: self.streams.iter().map(Stream::deep_clone).collect(),
            ..self.clone()
        }
    }
}
