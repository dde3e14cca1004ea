//! Sample collection reader

use super::codec::{
    self, attr, children, parse_field, parse_id, read_bytes, read_f32, read_f64, read_u32,
};
use super::stream_file::{parse_file_type, StreamFileReader};
use super::{append, data_path, info_path, FileType, Version, STREAM_EXTENSION};
use crate::data::{
    DataType, Sample, Stream, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME, GARBAGE_USER_ID,
    GARBAGE_USER_NAME,
};
use crate::error::{Result, SampleError};
use crate::samples::{lookup, sealed, stream_spec, Samples};
use crate::views::class_len_of;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xmltree::Element;

/// Size of a binary V3 header record: user, class, score, time
const V3_RECORD_BYTES: u64 = 4 + 4 + 4 + 8;

enum Layout {
    /// Records are read in order; `position` is the next record index
    Legacy {
        data: BufReader<File>,
        position: usize,
    },
    /// Fixed or indexed header records plus one side-car file per stream
    Sidecar {
        data: BufReader<File>,
        line_offsets: Vec<u64>,
        streams: Vec<StreamFileReader>,
    },
}

/// File-backed collection opened from `<path>.samples`
///
/// V3 files support O(1) random access. V2 files are replayed from the
/// start when an earlier index is requested.
pub struct SampleReader {
    info_path: PathBuf,
    version: Version,
    file_type: FileType,
    delimiter: char,
    len: usize,
    garbage: usize,
    has_missing_data: bool,
    class_names: Vec<String>,
    class_sizes: Vec<usize>,
    user_names: Vec<String>,
    streams: Vec<StreamSpec>,
    layout: RefCell<Layout>,
}

impl SampleReader {
    /// Open a collection; the `.samples` extension is optional
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let info_path = info_path(path);
        let root = codec::read_xml(&info_path)?;
        if root.name != "samples" {
            return Err(SampleError::SchemaMismatch(format!(
                "'{}' is not a samples file",
                info_path.display()
            )));
        }
        let number: u32 = attr(&root, "ssi-v")?;
        let version = Version::from_number(number).ok_or_else(|| {
            warn!("unsupported version {} in '{}'", number, info_path.display());
            SampleError::SchemaMismatch(format!("unsupported version {}", number))
        })?;

        let info = root
            .get_child("info")
            .ok_or_else(|| SampleError::SchemaMismatch("missing <info> in <samples>".into()))?;
        let file_type = parse_file_type(info)?;
        let len: usize = attr(info, "size")?;
        let garbage: usize = attr(info, "garbage")?;
        let missing: String = attr(info, "missing")?;
        let has_missing_data = matches!(missing.as_str(), "1" | "true");
        let delimiter = info
            .attributes
            .get("delim")
            .and_then(|d| d.chars().next())
            .unwrap_or(' ');

        let (class_names, class_sizes) = read_names(section(&root, info, "classes"))?;
        let (user_names, _) = read_names(section(&root, info, "users"))?;

        let data_file = File::open(data_path(&info_path)).map_err(|e| {
            warn!("could not open '{}': {}", data_path(&info_path).display(), e);
            e
        })?;
        let mut data = BufReader::new(data_file);

        let (streams, layout) = match version {
            Version::V2 => {
                let streams = section(&root, info, "streams")
                    .map(|s| {
                        children(s, "item")
                            .map(read_stream_item)
                            .collect::<Result<Vec<_>>>()
                    })
                    .unwrap_or_else(|| Ok(Vec::new()))?;
                (streams, Layout::Legacy { data, position: 0 })
            }
            Version::V3 => {
                let dir = info_path.parent().map(Path::to_path_buf).unwrap_or_default();
                let readers = section(&root, info, "streams")
                    .map(|s| {
                        children(s, "item")
                            .map(|item| {
                                let name: String = attr(item, "path")?;
                                let header =
                                    append(&dir.join(name), &format!(".{}", STREAM_EXTENSION));
                                let reader = StreamFileReader::open(header)?;
                                if reader.len() != len {
                                    return Err(SampleError::SchemaMismatch(format!(
                                        "stream file holds {} chunks for {} samples",
                                        reader.len(),
                                        len
                                    )));
                                }
                                Ok(reader)
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .unwrap_or_else(|| Ok(Vec::new()))?;
                let streams: Vec<StreamSpec> = readers.iter().map(|r| *r.spec()).collect();
                let line_offsets = match file_type {
                    FileType::Ascii => index_lines(&mut data)?,
                    FileType::Binary => Vec::new(),
                };
                if file_type == FileType::Ascii && line_offsets.len() != len {
                    return Err(SampleError::SchemaMismatch(format!(
                        "data file holds {} records for {} samples",
                        line_offsets.len(),
                        len
                    )));
                }
                (
                    streams,
                    Layout::Sidecar {
                        data,
                        line_offsets,
                        streams: readers,
                    },
                )
            }
        };

        debug!(
            "opened '{}' ({}, {}, {} samples)",
            info_path.display(),
            version,
            file_type,
            len
        );
        Ok(Self {
            info_path,
            version,
            file_type,
            delimiter,
            len,
            garbage,
            has_missing_data,
            class_names,
            class_sizes,
            user_names,
            streams,
            layout: RefCell::new(layout),
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn info_path(&self) -> &Path {
        &self.info_path
    }

    fn read_legacy(&self, data: &mut BufReader<File>) -> Result<Sample> {
        let mut sample = match self.file_type {
            FileType::Ascii => {
                let line = codec::read_line(data)?;
                let fields = codec::split_fields(&line, ' ', 5)?;
                let mut sample = Sample::new(
                    parse_id(fields[1])?,
                    parse_id(fields[0])?,
                    parse_field(fields[2], "time")?,
                    Vec::new(),
                );
                sample.score = parse_field(fields[3], "score")?;
                let n: usize = parse_field(fields[4], "stream count")?;
                self.check_stream_count(n)?;
                for spec in &self.streams {
                    let num: usize = parse_field(&codec::read_line(data)?, "row count")?;
                    let bytes = codec::read_rows(data, spec, num, self.delimiter)?;
                    sample.streams.push(Stream::new(spec, num, bytes)?);
                }
                sample
            }
            FileType::Binary => {
                let user_id = read_u32(data)?;
                let class_id = read_u32(data)?;
                let time = read_f64(data)?;
                let score = read_f32(data)?;
                self.check_stream_count(read_u32(data)? as usize)?;
                let mut sample = Sample::new(class_id, user_id, time, Vec::new()).with_score(score);
                for spec in &self.streams {
                    let num = read_u32(data)? as usize;
                    let bytes = read_bytes(data, num * spec.row_bytes())?;
                    sample.streams.push(Stream::new(spec, num, bytes)?);
                }
                sample
            }
        };
        let time = sample.time;
        sample.streams.iter_mut().for_each(|s| s.set_time(time));
        Ok(sample)
    }

    fn replay(
        &self,
        data: &mut BufReader<File>,
        position: &mut usize,
        index: usize,
    ) -> Result<Sample> {
        if index < *position {
            data.seek(SeekFrom::Start(0))?;
            *position = 0;
        }
        while *position < index {
            self.read_legacy(data)?;
            *position += 1;
        }
        let sample = self.read_legacy(data)?;
        *position += 1;
        Ok(sample)
    }

    fn read_header(
        &self,
        data: &mut BufReader<File>,
        line_offsets: &[u64],
        index: usize,
    ) -> Result<Sample> {
        match self.file_type {
            FileType::Ascii => {
                data.seek(SeekFrom::Start(line_offsets[index]))?;
                let line = codec::read_line(data)?;
                let fields = codec::split_fields(&line, ' ', 4)?;
                Ok(Sample::new(
                    parse_id(fields[1])?,
                    parse_id(fields[0])?,
                    parse_field(fields[3], "time")?,
                    Vec::new(),
                )
                .with_score(parse_field(fields[2], "score")?))
            }
            FileType::Binary => {
                data.seek(SeekFrom::Start(index as u64 * V3_RECORD_BYTES))?;
                let user_id = read_u32(data)?;
                let class_id = read_u32(data)?;
                let score = read_f32(data)?;
                let time = read_f64(data)?;
                Ok(Sample::new(class_id, user_id, time, Vec::new()).with_score(score))
            }
        }
    }

    fn check_stream_count(&self, n: usize) -> Result<()> {
        if n != self.streams.len() {
            return Err(SampleError::SchemaMismatch(format!(
                "record holds {} streams, header declares {}",
                n,
                self.streams.len()
            )));
        }
        Ok(())
    }
}

impl sealed::Sealed for SampleReader {}

impl Samples for SampleReader {
    fn len(&self) -> usize {
        self.len
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        class_len_of(&self.class_sizes, class)
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
        false
    }

    fn garbage_len(&self) -> usize {
        self.garbage
    }

    fn get(&self, index: usize) -> Result<Sample> {
        if index >= self.len {
            warn!("sample index {} out of range", index);
            return Err(SampleError::out_of_range("sample", index, self.len));
        }
        let mut layout = self.layout.borrow_mut();
        match &mut *layout {
            Layout::Legacy { data, position } => {
                let sample = self.replay(data, position, index);
                if sample.is_err() {
                    // the stream position is unknown now, force a rewind
                    *position = usize::MAX;
                }
                sample
            }
            Layout::Sidecar {
                data,
                line_offsets,
                streams,
            } => {
                let mut sample = self.read_header(data, line_offsets, index)?;
                for reader in streams.iter_mut() {
                    sample.streams.push(reader.read(index)?);
                }
                Ok(sample)
            }
        }
    }
}

/// Look a section up inside `<info>` first, then next to it
fn section<'a>(root: &'a Element, info: &'a Element, name: &str) -> Option<&'a Element> {
    info.get_child(name).or_else(|| root.get_child(name))
}

fn read_names(element: Option<&Element>) -> Result<(Vec<String>, Vec<usize>)> {
    let mut names = Vec::new();
    let mut sizes = Vec::new();
    if let Some(element) = element {
        for item in children(element, "item") {
            names.push(attr::<String>(item, "name")?);
            sizes.push(attr::<usize>(item, "size")?);
        }
    }
    Ok((names, sizes))
}

fn read_stream_item(item: &Element) -> Result<StreamSpec> {
    let type_name: String = attr(item, "type")?;
    let data_type = DataType::from_name(&type_name)
        .ok_or_else(|| SampleError::SchemaMismatch(format!("unknown type '{}'", type_name)))?;
    Ok(StreamSpec {
        dim: attr(item, "dim")?,
        byte: attr(item, "byte")?,
        data_type,
        sample_rate: attr(item, "sr")?,
    })
}

/// Byte offsets of every non-empty line
fn index_lines(data: &mut BufReader<File>) -> Result<Vec<u64>> {
    let mut offsets = Vec::new();
    let mut offset = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let read = data.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        if !line.trim().is_empty() {
            offsets.push(offset);
        }
        offset += read as u64;
    }
    Ok(offsets)
}
