//! Per-stream side-car files
//!
//! A stream file is an XML header listing one chunk per written stream
//! plus a payload file holding the rows. Chunk `i` belongs to sample `i`,
//! so reading a stream by sample index is one seek.

use super::codec::{self, attr, children, push_child, set_attr};
use super::{data_path, FileType};
use crate::data::{DataType, Stream, StreamSpec};
use crate::error::{Result, SampleError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xmltree::Element;

const STREAM_FORMAT_VERSION: &str = "2";

/// Location of one stream inside the payload file
#[derive(Debug, Clone, Copy, PartialEq)]
struct Chunk {
    from: f64,
    to: f64,
    byte: u64,
    num: usize,
}

/// Writes streams of one shape to a side-car file pair
pub struct StreamFileWriter {
    path: PathBuf,
    spec: StreamSpec,
    file_type: FileType,
    delimiter: char,
    data: BufWriter<File>,
    chunks: Vec<Chunk>,
    offset: u64,
    closed: bool,
}

impl StreamFileWriter {
    /// Create `path` (the XML header) and its payload file
    pub fn create(
        path: impl AsRef<Path>,
        spec: StreamSpec,
        file_type: FileType,
        delimiter: char,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = File::create(data_path(&path)).map_err(|e| {
            warn!("could not create '{}': {}", data_path(&path).display(), e);
            e
        })?;
        debug!("opened stream file '{}'", path.display());
        Ok(Self {
            path,
            spec,
            file_type,
            delimiter,
            data: BufWriter::new(data),
            chunks: Vec::new(),
            offset: 0,
            closed: false,
        })
    }

    /// Append a stream as the next chunk
    pub fn write(&mut self, stream: &Stream, time: f64) -> Result<()> {
        if !self.spec.is_compatible(stream) {
            warn!("stream not compatible with '{}'", self.path.display());
            return Err(SampleError::IncompatibleStream(format!(
                "{}x{} {} does not match {}x{} {}",
                stream.dim(),
                stream.byte(),
                stream.data_type(),
                self.spec.dim,
                self.spec.byte,
                self.spec.data_type
            )));
        }
        let written = match self.file_type {
            FileType::Binary => {
                self.data.write_all(stream.bytes())?;
                stream.tot() as u64
            }
            FileType::Ascii => codec::write_rows(&mut self.data, stream, self.delimiter)?,
        };
        let duration = if self.spec.sample_rate > 0.0 {
            stream.num() as f64 / self.spec.sample_rate
        } else {
            0.0
        };
        self.chunks.push(Chunk {
            from: time,
            to: time + duration,
            byte: self.offset,
            num: stream.num(),
        });
        self.offset += written;
        Ok(())
    }

    /// Number of chunks written
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Flush the payload and write the header
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.data.flush()?;

        let mut root = Element::new("stream");
        set_attr(&mut root, "ssi-v", STREAM_FORMAT_VERSION);
        let mut info = Element::new("info");
        set_attr(&mut info, "ftype", self.file_type.name());
        set_attr(&mut info, "sr", self.spec.sample_rate);
        set_attr(&mut info, "dim", self.spec.dim);
        set_attr(&mut info, "byte", self.spec.byte);
        set_attr(&mut info, "type", self.spec.data_type.name());
        if self.file_type == FileType::Ascii {
            set_attr(&mut info, "delim", self.delimiter);
        }
        push_child(&mut root, info);
        for chunk in &self.chunks {
            let mut item = Element::new("chunk");
            set_attr(&mut item, "from", chunk.from);
            set_attr(&mut item, "to", chunk.to);
            set_attr(&mut item, "byte", chunk.byte);
            set_attr(&mut item, "num", chunk.num);
            push_child(&mut root, item);
        }
        codec::write_xml(&root, &self.path)?;
        debug!(
            "closed stream file '{}' ({} chunks)",
            self.path.display(),
            self.chunks.len()
        );
        Ok(())
    }
}

impl Drop for StreamFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("could not close '{}': {}", self.path.display(), e);
        }
    }
}

/// Random access to the chunks of a side-car file pair
pub struct StreamFileReader {
    path: PathBuf,
    spec: StreamSpec,
    file_type: FileType,
    delimiter: char,
    chunks: Vec<Chunk>,
    data: BufReader<File>,
}

impl StreamFileReader {
    /// Open `path` (the XML header) and its payload file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let root = codec::read_xml(&path)?;
        if root.name != "stream" {
            return Err(SampleError::SchemaMismatch(format!(
                "'{}' is not a stream file",
                path.display()
            )));
        }

        let info = root
            .get_child("info")
            .ok_or_else(|| SampleError::SchemaMismatch("missing <info> in <stream>".into()))?;
        let file_type = parse_file_type(info)?;
        let type_name: String = attr(info, "type")?;
        let data_type = DataType::from_name(&type_name).ok_or_else(|| {
            SampleError::SchemaMismatch(format!("unknown type '{}'", type_name))
        })?;
        let spec = StreamSpec {
            dim: attr(info, "dim")?,
            byte: attr(info, "byte")?,
            data_type,
            sample_rate: attr(info, "sr")?,
        };
        let delimiter = info
            .attributes
            .get("delim")
            .and_then(|d| d.chars().next())
            .unwrap_or(' ');

        let chunks = children(&root, "chunk")
            .map(|c| {
                Ok(Chunk {
                    from: attr(c, "from")?,
                    to: attr(c, "to")?,
                    byte: attr(c, "byte")?,
                    num: attr(c, "num")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let data = File::open(data_path(&path)).map_err(|e| {
            warn!("could not open '{}': {}", data_path(&path).display(), e);
            e
        })?;
        debug!("opened stream file '{}'", path.display());
        Ok(Self {
            path,
            spec,
            file_type,
            delimiter,
            chunks,
            data: BufReader::new(data),
        })
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Read chunk `index` as a stream stamped with the chunk start time
    pub fn read(&mut self, index: usize) -> Result<Stream> {
        let chunk = *self.chunks.get(index).ok_or_else(|| {
            warn!("chunk {} out of range in '{}'", index, self.path.display());
            SampleError::out_of_range("chunk", index, self.chunks.len())
        })?;
        self.data.seek(SeekFrom::Start(chunk.byte))?;
        let bytes = match self.file_type {
            FileType::Binary => {
                let len = chunk.num * self.spec.row_bytes();
                let mut buf = Vec::with_capacity(len);
                (&mut self.data).take(len as u64).read_to_end(&mut buf)?;
                if buf.len() != len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("chunk {} truncated in '{}'", index, self.path.display()),
                    )
                    .into());
                }
                buf
            }
            FileType::Ascii => codec::read_rows(&mut self.data, &self.spec, chunk.num, self.delimiter)?,
        };
        let mut stream = Stream::new(&self.spec, chunk.num, bytes)?;
        stream.set_time(chunk.from);
        Ok(stream)
    }
}

pub(crate) fn parse_file_type(info: &Element) -> Result<FileType> {
    let name: String = attr(info, "ftype")?;
    FileType::from_name(&name)
        .ok_or_else(|| SampleError::SchemaMismatch(format!("unknown file type '{}'", name)))
}
