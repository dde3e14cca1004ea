//! Sample collection writer

use super::codec::{self, format_id, push_child, set_attr, write_f32, write_f64, write_u32};
use super::stream_file::StreamFileWriter;
use super::{data_path, info_path, stream_base, stream_path, FileType, StorageConfig, Version};
use crate::data::{Sample, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_USER_ID};
use crate::error::{Result, SampleError};
use crate::samples::{Cursor, Samples};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xmltree::Element;

enum Layout {
    /// Records with inline streams in one data file
    Legacy { data: BufWriter<File> },
    /// Header records plus one side-car file per stream
    Sidecar {
        data: BufWriter<File>,
        streams: Vec<StreamFileWriter>,
    },
}

/// Writes a collection to `<path>.samples` and its data files
///
/// Class and user tables, counts and the missing-data flag are gathered
/// while writing and stored in the info file on [`SampleWriter::close`].
/// Until then the info file is not written; an interrupted write leaves
/// only data files behind.
pub struct SampleWriter {
    info_path: PathBuf,
    config: StorageConfig,
    class_names: Vec<String>,
    user_names: Vec<String>,
    streams: Vec<StreamSpec>,
    class_sizes: Vec<usize>,
    user_sizes: Vec<usize>,
    garbage: usize,
    len: usize,
    has_missing_data: bool,
    layout: Option<Layout>,
}

impl SampleWriter {
    /// Create a writer for samples shaped like `samples`
    pub fn create<S: Samples + ?Sized>(
        path: impl AsRef<Path>,
        samples: &S,
        config: &StorageConfig,
    ) -> Result<Self> {
        let class_names = (0..samples.class_count() as u32)
            .map(|c| samples.class_name(c).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let user_names = (0..samples.user_count() as u32)
            .map(|u| samples.user_name(u).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let streams = (0..samples.stream_count())
            .map(|i| samples.stream(i).copied())
            .collect::<Result<Vec<_>>>()?;
        Self::with_schema(path, class_names, user_names, streams, config)
    }

    /// Create a writer from explicit tables
    pub fn with_schema(
        path: impl AsRef<Path>,
        class_names: Vec<String>,
        user_names: Vec<String>,
        streams: Vec<StreamSpec>,
        config: &StorageConfig,
    ) -> Result<Self> {
        config.validate()?;
        let info_path = info_path(path);
        let data = BufWriter::new(create_file(&data_path(&info_path))?);
        let layout = match config.version {
            Version::V2 => Layout::Legacy { data },
            Version::V3 => {
                let writers = streams
                    .iter()
                    .enumerate()
                    .map(|(i, spec)| {
                        StreamFileWriter::create(
                            stream_path(&info_path, i),
                            *spec,
                            config.file_type,
                            config.delimiter,
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                Layout::Sidecar {
                    data,
                    streams: writers,
                }
            }
        };
        debug!(
            "opened '{}' for writing ({}, {})",
            info_path.display(),
            config.version,
            config.file_type
        );
        Ok(Self {
            info_path,
            config: config.clone(),
            class_sizes: vec![0; class_names.len()],
            user_sizes: vec![0; user_names.len()],
            class_names,
            user_names,
            streams,
            garbage: 0,
            len: 0,
            has_missing_data: false,
            layout: Some(layout),
        })
    }

    /// Number of samples written
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn info_path(&self) -> &Path {
        &self.info_path
    }

    /// Append one sample
    pub fn write(&mut self, sample: &Sample) -> Result<()> {
        self.validate(sample)?;
        let ascii = self.config.file_type == FileType::Ascii;
        let delimiter = self.config.delimiter;
        let layout = self.layout.as_mut().ok_or_else(|| {
            SampleError::IoFailure(std::io::Error::new(
                std::io::ErrorKind::Other,
                "writer is closed",
            ))
        })?;

        match layout {
            Layout::Legacy { data } => {
                if ascii {
                    writeln!(
                        data,
                        "{} {} {} {} {}",
                        format_id(sample.user_id),
                        format_id(sample.class_id),
                        sample.time,
                        sample.score,
                        sample.streams.len()
                    )?;
                    for stream in &sample.streams {
                        writeln!(data, "{}", stream.num())?;
                        codec::write_rows(data, stream, delimiter)?;
                    }
                } else {
                    write_u32(data, sample.user_id)?;
                    write_u32(data, sample.class_id)?;
                    write_f64(data, sample.time)?;
                    write_f32(data, sample.score)?;
                    write_u32(data, sample.streams.len() as u32)?;
                    for stream in &sample.streams {
                        write_u32(data, stream.num() as u32)?;
                        data.write_all(stream.bytes())?;
                    }
                }
            }
            Layout::Sidecar { data, streams } => {
                if ascii {
                    writeln!(
                        data,
                        "{} {} {} {}",
                        format_id(sample.user_id),
                        format_id(sample.class_id),
                        sample.score,
                        sample.time
                    )?;
                } else {
                    write_u32(data, sample.user_id)?;
                    write_u32(data, sample.class_id)?;
                    write_f32(data, sample.score)?;
                    write_f64(data, sample.time)?;
                }
                for (writer, stream) in streams.iter_mut().zip(&sample.streams) {
                    writer.write(stream, sample.time)?;
                }
            }
        }

        self.len += 1;
        if sample.class_id == GARBAGE_CLASS_ID {
            self.garbage += 1;
        } else {
            self.class_sizes[sample.class_id as usize] += 1;
        }
        if sample.user_id != GARBAGE_USER_ID {
            self.user_sizes[sample.user_id as usize] += 1;
        }
        if sample.has_missing_stream() {
            self.has_missing_data = true;
        }
        Ok(())
    }

    /// Append every sample of a collection
    pub fn write_all<S: Samples + ?Sized>(&mut self, samples: &S) -> Result<()> {
        for sample in Cursor::new(samples) {
            self.write(&sample?)?;
        }
        Ok(())
    }

    /// Flush all data files and write the info file
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn validate(&self, sample: &Sample) -> Result<()> {
        if sample.streams.len() != self.streams.len() {
            warn!("#stream not compatible");
            return Err(SampleError::IncompatibleStream(format!(
                "sample has {} streams, expected {}",
                sample.streams.len(),
                self.streams.len()
            )));
        }
        for (i, (spec, stream)) in self.streams.iter().zip(&sample.streams).enumerate() {
            if !spec.is_compatible(stream) {
                warn!("stream#{:02} not compatible", i);
                return Err(SampleError::IncompatibleStream(format!(
                    "stream#{:02} does not match the file",
                    i
                )));
            }
        }
        if sample.class_id != GARBAGE_CLASS_ID && sample.class_id as usize >= self.class_names.len()
        {
            warn!("sample exceeds class id");
            return Err(SampleError::out_of_range(
                "class",
                sample.class_id as usize,
                self.class_names.len(),
            ));
        }
        if sample.user_id != GARBAGE_USER_ID && sample.user_id as usize >= self.user_names.len() {
            warn!("sample exceeds user id");
            return Err(SampleError::out_of_range(
                "user",
                sample.user_id as usize,
                self.user_names.len(),
            ));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let layout = match self.layout.take() {
            Some(layout) => layout,
            None => return Ok(()),
        };

        let root = match layout {
            Layout::Legacy { mut data } => {
                data.flush()?;
                let mut info = self.info_element(if self.has_missing_data { "1" } else { "0" });
                push_child(&mut info, self.streams_element(None));
                push_child(&mut info, self.names_element("classes", &self.class_names, &self.class_sizes));
                push_child(&mut info, self.names_element("users", &self.user_names, &self.user_sizes));
                let mut root = self.root_element();
                push_child(&mut root, info);
                root
            }
            Layout::Sidecar { mut data, streams } => {
                data.flush()?;
                for writer in streams {
                    writer.close()?;
                }
                let mut root = self.root_element();
                push_child(
                    &mut root,
                    self.info_element(if self.has_missing_data { "true" } else { "false" }),
                );
                push_child(&mut root, self.streams_element(Some(&self.info_path)));
                push_child(&mut root, self.names_element("classes", &self.class_names, &self.class_sizes));
                push_child(&mut root, self.names_element("users", &self.user_names, &self.user_sizes));
                root
            }
        };

        codec::write_xml(&root, &self.info_path)?;
        info!(
            "wrote {} samples to '{}'",
            self.len,
            self.info_path.display()
        );
        Ok(())
    }

    fn root_element(&self) -> Element {
        let mut root = Element::new("samples");
        set_attr(&mut root, "ssi-v", self.config.version.number());
        root
    }

    fn info_element(&self, missing: &str) -> Element {
        let mut info = Element::new("info");
        set_attr(&mut info, "ftype", self.config.file_type.name());
        set_attr(&mut info, "size", self.len);
        set_attr(&mut info, "missing", missing);
        set_attr(&mut info, "garbage", self.garbage);
        if self.config.version == Version::V2 && self.config.file_type == FileType::Ascii {
            set_attr(&mut info, "delim", self.config.delimiter);
        }
        info
    }

    /// Stream items: shapes for V2, side-car names for V3
    fn streams_element(&self, sidecar_of: Option<&Path>) -> Element {
        let mut streams = Element::new("streams");
        for (i, spec) in self.streams.iter().enumerate() {
            let mut item = Element::new("item");
            match sidecar_of {
                Some(info) => {
                    let base = stream_base(info, i);
                    let name = base
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    set_attr(&mut item, "path", name);
                }
                None => {
                    set_attr(&mut item, "sr", spec.sample_rate);
                    set_attr(&mut item, "dim", spec.dim);
                    set_attr(&mut item, "byte", spec.byte);
                    set_attr(&mut item, "type", spec.data_type.name());
                }
            }
            push_child(&mut streams, item);
        }
        streams
    }

    fn names_element(&self, tag: &str, names: &[String], sizes: &[usize]) -> Element {
        let mut element = Element::new(tag);
        for (name, size) in names.iter().zip(sizes) {
            let mut item = Element::new("item");
            set_attr(&mut item, "name", name);
            set_attr(&mut item, "size", size);
            push_child(&mut element, item);
        }
        element
    }
}

impl Drop for SampleWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("could not close '{}': {}", self.info_path.display(), e);
        }
    }
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| {
        warn!("could not create '{}': {}", path.display(), e);
        e.into()
    })
}
