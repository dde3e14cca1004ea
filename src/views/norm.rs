//! Per-stream feature normalization
//!
//! Parameters are fitted once over every row of a stream (min/max for
//! SCALE, mean/population standard deviation for ZSCORE) and applied
//! per feature: `(x - center) / scale`. SCALE output is optionally mapped
//! from `[0, 1]` onto custom limits.

use crate::data::{DataType, Sample, StreamSpec};
use crate::error::{Result, SampleError};
use crate::samples::{sealed, Cursor, SampleList, Samples};
use crate::storage::{self, child_text, push_child, read_xml, text_element, write_xml, FileType};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};
use xmltree::Element;

const NORM_EXTENSION: &str = "norm";

/// Normalization method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormMethod {
    /// Values pass unchanged
    #[default]
    None,
    /// `(x - min) / (max - min)`, then mapped to the limits
    Scale,
    /// `(x - mean) / stdv`
    ZScore,
}

impl NormMethod {
    pub fn name(self) -> &'static str {
        match self {
            NormMethod::None => "None",
            NormMethod::Scale => "Scale",
            NormMethod::ZScore => "ZScore",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [NormMethod::None, NormMethod::Scale, NormMethod::ZScore]
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Fitted normalization parameters of one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormParams {
    pub method: NormMethod,
    /// Output range of SCALE
    pub limits: [f32; 2],
    /// Number of features (stream dimension)
    pub n_features: usize,
    /// Min for SCALE, mean for ZSCORE
    pub center: Vec<f32>,
    /// Range for SCALE, standard deviation for ZSCORE
    pub scale: Vec<f32>,
}

impl Default for NormParams {
    fn default() -> Self {
        Self::new(NormMethod::None)
    }
}

impl NormParams {
    /// Unfitted parameters
    pub fn new(method: NormMethod) -> Self {
        Self {
            method,
            limits: [0.0, 1.0],
            n_features: 0,
            center: Vec::new(),
            scale: Vec::new(),
        }
    }

    /// Set the output range of SCALE
    pub fn with_limits(mut self, lo: f32, hi: f32) -> Self {
        self.limits = [lo, hi];
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.method == NormMethod::None
            || (self.n_features > 0
                && self.center.len() == self.n_features
                && self.scale.len() == self.n_features)
    }

    /// Fit on every row of stream `stream` in `samples`
    pub fn fit<S: Samples + ?Sized>(&mut self, samples: &S, stream: usize) -> Result<()> {
        let dim = samples.stream(stream)?.dim;
        if dim == 0 {
            warn!("stream#{:02} has no features to normalize", stream);
            return Err(SampleError::IncompatibleStream(format!(
                "stream#{:02} has dimension 0",
                stream
            )));
        }
        let mut stats = ColumnStats::new(dim);
        for sample in Cursor::new(samples) {
            let values = sample?.stream(stream)?.values()?;
            for row in values.chunks_exact(dim) {
                stats.push(row);
            }
        }
        self.finish(stats)
    }

    /// Fit on the rows of a feature matrix
    pub fn fit_matrix(&mut self, matrix: ArrayView2<'_, f32>) -> Result<()> {
        if matrix.ncols() == 0 {
            warn!("cannot fit normalization on a matrix without columns");
            return Err(SampleError::IncompatibleStream(
                "matrix has no columns".to_string(),
            ));
        }
        let mut stats = ColumnStats::new(matrix.ncols());
        let mut row = vec![0.0f64; matrix.ncols()];
        for r in matrix.outer_iter() {
            for (dst, &src) in row.iter_mut().zip(r.iter()) {
                *dst = src as f64;
            }
            stats.push(&row);
        }
        self.finish(stats)
    }

    fn finish(&mut self, stats: ColumnStats) -> Result<()> {
        if stats.count == 0 {
            warn!("cannot fit normalization on an empty stream");
            return Err(SampleError::EmptyCollection);
        }
        let dim = stats.min.len();
        let (center, scale): (Vec<f64>, Vec<f64>) = match self.method {
            NormMethod::None => (vec![0.0; dim], vec![1.0; dim]),
            NormMethod::Scale => (
                stats.min.clone(),
                stats.min.iter().zip(&stats.max).map(|(lo, hi)| hi - lo).collect(),
            ),
            NormMethod::ZScore => (
                stats.mean.clone(),
                stats
                    .m2
                    .iter()
                    .map(|m2| (m2 / stats.count as f64).sqrt())
                    .collect(),
            ),
        };
        self.n_features = dim;
        self.center = center.iter().map(|&c| c as f32).collect();
        self.scale = scale
            .iter()
            .enumerate()
            .map(|(j, &s)| {
                if s == 0.0 || !s.is_finite() {
                    warn!("feature {} has no spread, using scale 1.0", j);
                    1.0
                } else {
                    s as f32
                }
            })
            .collect();
        debug!("fitted {} normalization on {} features", self.method.name(), dim);
        Ok(())
    }

    /// Normalize row-major values in place
    pub fn apply(&self, values: &mut [f64]) {
        if self.method == NormMethod::None || self.n_features == 0 {
            return;
        }
        let remap = self.method == NormMethod::Scale && self.limits != [0.0, 1.0];
        let (lo, span) = (self.limits[0] as f64, (self.limits[1] - self.limits[0]) as f64);
        for row in values.chunks_exact_mut(self.n_features) {
            for ((x, &c), &s) in row.iter_mut().zip(&self.center).zip(&self.scale) {
                *x = (*x - c as f64) / s as f64;
                if remap {
                    *x = *x * span + lo;
                }
            }
        }
    }

    /// Write `<path>.norm` and, unless the method is NONE, `<path>.norm~`
    pub fn save(&self, path: impl AsRef<Path>, file_type: FileType) -> Result<()> {
        let header = storage::with_extension(path.as_ref(), NORM_EXTENSION);
        let mut root = Element::new("norm");
        push_child(&mut root, text_element("method", self.method.name()));
        if self.method == NormMethod::Scale {
            push_child(
                &mut root,
                text_element("limits", &format!("{} {}", self.limits[0], self.limits[1])),
            );
        }
        push_child(&mut root, text_element("dim", &self.n_features.to_string()));
        push_child(&mut root, text_element("type", file_type.name()));
        write_xml(&root, &header)?;

        if self.method == NormMethod::None {
            return Ok(());
        }
        let mut out = BufWriter::new(File::create(storage::data_path(&header))?);
        match file_type {
            FileType::Binary => {
                for v in self.center.iter().chain(&self.scale) {
                    out.write_all(&v.to_le_bytes())?;
                }
            }
            FileType::Ascii => {
                for (c, s) in self.center.iter().zip(&self.scale) {
                    writeln!(out, "{} {}", c, s)?;
                }
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Read parameters written by [`NormParams::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let header = storage::with_extension(path.as_ref(), NORM_EXTENSION);
        let root = read_xml(&header)?;
        let method_name = child_text(&root, "method")?;
        let method = NormMethod::from_name(&method_name).ok_or_else(|| {
            SampleError::SchemaMismatch(format!("unknown method '{}'", method_name))
        })?;
        let mut params = NormParams::new(method);
        params.n_features = parse(&child_text(&root, "dim")?, "dim")?;
        if method == NormMethod::Scale {
            let limits = child_text(&root, "limits")?;
            let parts: Vec<&str> = limits.split_whitespace().collect();
            if parts.len() != 2 {
                warn!("could not parse limits '{}'", limits);
                return Err(SampleError::SchemaMismatch(format!("bad limits '{}'", limits)));
            }
            params.limits = [parse(parts[0], "limits")?, parse(parts[1], "limits")?];
        }
        let type_name = child_text(&root, "type")?;
        let file_type = FileType::from_name(&type_name).ok_or_else(|| {
            warn!("unknown type '{}'", type_name);
            SampleError::SchemaMismatch(format!("unknown type '{}'", type_name))
        })?;
        if method == NormMethod::None {
            return Ok(params);
        }

        let n = params.n_features;
        let mut input = BufReader::new(File::open(storage::data_path(&header))?);
        match file_type {
            FileType::Binary => {
                let mut buf = vec![0u8; 8 * n];
                input.read_exact(&mut buf)?;
                let values: Vec<f32> = buf
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                params.center = values[..n].to_vec();
                params.scale = values[n..].to_vec();
            }
            FileType::Ascii => {
                for line in input.lines().take(n) {
                    let line = line?;
                    let mut parts = line.split_whitespace();
                    let (c, s) = match (parts.next(), parts.next()) {
                        (Some(c), Some(s)) => (c, s),
                        _ => {
                            return Err(SampleError::SchemaMismatch(format!(
                                "bad parameter line '{}'",
                                line
                            )))
                        }
                    };
                    params.center.push(parse(c, "center")?);
                    params.scale.push(parse(s, "scale")?);
                }
                if params.center.len() != n {
                    return Err(SampleError::SchemaMismatch(format!(
                        "expected {} parameter lines, found {}",
                        n,
                        params.center.len()
                    )));
                }
            }
        }
        Ok(params)
    }
}

fn parse<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| SampleError::SchemaMismatch(format!("cannot parse {} from '{}'", what, text)))
}

/// Running min, max, mean and squared deviations per column
struct ColumnStats {
    count: usize,
    min: Vec<f64>,
    max: Vec<f64>,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl ColumnStats {
    fn new(dim: usize) -> Self {
        Self {
            count: 0,
            min: vec![f64::INFINITY; dim],
            max: vec![f64::NEG_INFINITY; dim],
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    fn push(&mut self, row: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for (j, &x) in row.iter().enumerate() {
            self.min[j] = self.min[j].min(x);
            self.max[j] = self.max[j].max(x);
            let delta = x - self.mean[j];
            self.mean[j] += delta / n;
            self.m2[j] += delta * (x - self.mean[j]);
        }
    }
}

/// View returning normalized copies of the backing samples
pub struct NormView<'a, S: Samples + ?Sized> {
    samples: &'a S,
    params: Vec<Option<NormParams>>,
}

impl<'a, S: Samples + ?Sized> NormView<'a, S> {
    /// Create a view without normalization
    pub fn new(samples: &'a S) -> Self {
        Self {
            samples,
            params: vec![None; samples.stream_count()],
        }
    }

    /// Normalize stream `stream`, fitting `params` on the backing
    /// collection unless they are already fitted
    pub fn set_norm(&mut self, stream: usize, mut params: NormParams) -> Result<()> {
        let spec = *self.samples.stream(stream)?;
        if !matches!(spec.data_type, DataType::Float | DataType::Double) {
            warn!("stream#{:02} is {}, normalization needs FLOAT or DOUBLE", stream, spec.data_type);
            return Err(SampleError::IncompatibleStream(format!(
                "cannot normalize {} values",
                spec.data_type
            )));
        }
        if params.method != NormMethod::None {
            if params.is_fitted() {
                if params.n_features != spec.dim {
                    warn!(
                        "wrong stream dimension '{}' != '{}'",
                        spec.dim, params.n_features
                    );
                    return Err(SampleError::SchemaMismatch(format!(
                        "parameters for {} features, stream has {}",
                        params.n_features, spec.dim
                    )));
                }
            } else {
                params.fit(self.samples, stream)?;
            }
        }
        self.params[stream] = Some(params);
        Ok(())
    }

    /// Parameters of stream `stream`, if set
    pub fn params(&self, stream: usize) -> Option<&NormParams> {
        self.params.get(stream).and_then(Option::as_ref)
    }

    /// Normalize the streams of `sample` in place
    pub fn normalize_sample(&self, sample: &mut Sample) -> Result<()> {
        for (i, params) in self.params.iter().enumerate() {
            let params = match params {
                Some(p) if p.method != NormMethod::None => p,
                _ => continue,
            };
            let stream = sample
                .streams
                .get_mut(i)
                .ok_or_else(|| SampleError::out_of_range("stream", i, self.params.len()))?;
            if stream.is_missing() {
                continue;
            }
            let mut values = stream.values()?;
            params.apply(&mut values);
            stream.set_values(&values)?;
        }
        Ok(())
    }

    /// Normalize every sample of `list` in place
    pub fn normalize_list(&self, list: &mut SampleList) -> Result<()> {
        for sample in list.iter_mut() {
            self.normalize_sample(sample)?;
        }
        Ok(())
    }

    /// Normalize sample `index` into `scratch`, reusing its buffers
    pub fn get_into(&self, index: usize, scratch: &mut Sample) -> Result<()> {
        let source = self.samples.get(index)?;
        scratch.class_id = source.class_id;
        scratch.user_id = source.user_id;
        scratch.time = source.time;
        scratch.score = source.score;
        scratch.streams.truncate(source.streams.len());
        for (i, stream) in source.streams.iter().enumerate() {
            match scratch.streams.get_mut(i) {
                Some(target) => target.copy_from(stream),
                None => scratch.streams.push(stream.deep_clone()),
            }
        }
        self.normalize_sample(scratch)
    }
}

impl<S: Samples + ?Sized> sealed::Sealed for NormView<'_, S> {}

impl<S: Samples + ?Sized> Samples for NormView<'_, S> {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn class_len(&self, class: u32) -> Result<usize> {
        self.samples.class_len(class)
    }

    fn class_count(&self) -> usize {
        self.samples.class_count()
    }

    fn class_name(&self, class: u32) -> Result<&str> {
        self.samples.class_name(class)
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
        false
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let mut sample = self.samples.get(index)?;
        self.normalize_sample(&mut sample)?;
        Ok(sample)
    }
}
