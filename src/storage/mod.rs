//! Versioned on-disk persistence
//!
//! A collection is stored as an XML info file `<name>.samples` plus data:
//! - V2 keeps every record, streams included, in one file `<name>.samples~`
//! - V3 keeps the sample headers in `<name>.samples~` and writes one
//!   side-car pair `<name>.samples.#<i>.stream` / `.stream~` per stream
//!
//! The info file is only complete after the writer is closed.

mod codec;
mod config;
mod reader;
mod stream_file;
mod writer;

pub use config::StorageConfig;
pub use reader::SampleReader;
pub use stream_file::{StreamFileReader, StreamFileWriter};
pub use writer::SampleWriter;

pub(crate) use codec::{child_text, push_child, read_xml, text_element, write_xml};

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Info file extension
pub const SAMPLES_EXTENSION: &str = "samples";
/// Side-car header extension
pub const STREAM_EXTENSION: &str = "stream";
/// Suffix of every payload file
pub const DATA_SUFFIX: &str = "~";

/// Encoding of a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Binary,
    Ascii,
}

impl FileType {
    pub fn name(self) -> &'static str {
        match self {
            FileType::Binary => "BINARY",
            FileType::Ascii => "ASCII",
        }
    }

    /// Parse a header name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BINARY" => Some(FileType::Binary),
            "ASCII" => Some(FileType::Ascii),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Version {
    /// Single data file with inline streams
    V2,
    /// Header records plus one side-car file per stream
    #[default]
    V3,
}

impl Version {
    pub fn number(self) -> u32 {
        match self {
            Version::V2 => 2,
            Version::V3 => 3,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            2 => Some(Version::V2),
            3 => Some(Version::V3),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.number())
    }
}

/// Append `suffix` to the full path
pub(crate) fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Append `.<extension>` unless the path already ends with it
pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(extension) => path.to_path_buf(),
        _ => append(path, &format!(".{}", extension)),
    }
}

/// Info file of a collection
pub fn info_path(path: impl AsRef<Path>) -> PathBuf {
    with_extension(path.as_ref(), SAMPLES_EXTENSION)
}

/// Payload file next to a header file
pub fn data_path(header: &Path) -> PathBuf {
    append(header, DATA_SUFFIX)
}

/// Side-car base name of stream `index`, without the stream extension
pub(crate) fn stream_base(info: &Path, index: usize) -> PathBuf {
    append(info, &format!(".#{}", index))
}

/// Side-car header file of stream `index`
pub fn stream_path(info: &Path, index: usize) -> PathBuf {
    with_extension(&stream_base(info, index), STREAM_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(info_path("data/run"), PathBuf::from("data/run.samples"));
        assert_eq!(info_path("data/run.samples"), PathBuf::from("data/run.samples"));
        let info = info_path("run");
        assert_eq!(data_path(&info), PathBuf::from("run.samples~"));
        assert_eq!(stream_path(&info, 1), PathBuf::from("run.samples.#1.stream"));
    }

    #[test]
    fn test_names() {
        assert_eq!(FileType::from_name("ascii"), Some(FileType::Ascii));
        assert_eq!(FileType::from_name("XML"), None);
        assert_eq!(Version::from_number(3), Some(Version::V3));
        assert_eq!(Version::default(), Version::V3);
        assert_eq!(Version::V2.to_string(), "V2");
    }
}
