//! Helpers around sample collections
//!
//! Feature matrices for numeric code, copy and merge, synthetic test
//! collections and whole-collection persistence.

use crate::data::{Sample, Stream, StreamSpec, GARBAGE_CLASS_ID, GARBAGE_USER_ID};
use crate::error::{Result, SampleError};
use crate::samples::{CopyMode, Cursor, NamePolicy, SampleList, Samples};
use crate::storage::{SampleReader, SampleWriter, StorageConfig};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Stack stream `stream` of every sample into one row per sample
///
/// Rows are the flattened stream values; every stream must hold the same
/// number of values.
pub fn stack_features(samples: &[Sample], stream: usize) -> Result<Array2<f32>> {
    let mut rows = FeatureRows::default();
    for sample in samples {
        rows.push(sample, stream)?;
    }
    rows.finish()
}

/// Feature matrix of stream `stream` plus the class id of each row
pub fn sample_matrix<S: Samples + ?Sized>(
    samples: &S,
    stream: usize,
) -> Result<(Array2<f32>, Vec<u32>)> {
    samples.stream(stream)?;
    let mut rows = FeatureRows::default();
    let mut classes = Vec::with_capacity(samples.len());
    for sample in Cursor::new(samples) {
        let sample = sample?;
        rows.push(&sample, stream)?;
        classes.push(sample.class_id);
    }
    Ok((rows.finish()?, classes))
}

#[derive(Default)]
struct FeatureRows {
    width: Option<usize>,
    count: usize,
    values: Vec<f32>,
}

impl FeatureRows {
    fn push(&mut self, sample: &Sample, stream: usize) -> Result<()> {
        let source = sample.stream(stream)?;
        if source.is_missing() {
            warn!("stream#{:02} is missing, cannot build a feature row", stream);
            return Err(SampleError::IncompatibleStream(format!(
                "sample {} has an empty stream#{:02}",
                self.count, stream
            )));
        }
        let row = source.values_f32()?;
        let width = *self.width.get_or_insert(row.len());
        if row.len() != width {
            warn!("feature rows differ in length");
            return Err(SampleError::SchemaMismatch(format!(
                "row {} has {} values, expected {}",
                self.count,
                row.len(),
                width
            )));
        }
        self.values.extend_from_slice(&row);
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> Result<Array2<f32>> {
        let width = self.width.ok_or(SampleError::EmptyCollection)?;
        Ok(Array2::from_shape_vec((self.count, width), self.values)?)
    }
}

/// Deep copy of a collection with the same class and user indices
pub fn copy_sample_list<S: Samples + ?Sized>(from: &S) -> Result<SampleList> {
    let mut list = SampleList::new();
    for c in 0..from.class_count() as u32 {
        list.add_class_name(from.class_name(c)?);
    }
    for u in 0..from.user_count() as u32 {
        list.add_user_name(from.user_name(u)?);
    }
    for sample in Cursor::new(from) {
        list.add_sample(&sample?, CopyMode::Deep)?;
    }
    list.set_missing_data(from.has_missing_data());
    Ok(list)
}

/// Merge collections into one, matching classes and users by name
///
/// Names keep the order of first appearance. All collections must share
/// the same stream layout.
pub fn merge_samples(sources: &[&dyn Samples]) -> Result<SampleList> {
    let mut list = SampleList::new().with_name_policy(NamePolicy::Dedupe);
    let mut missing = false;
    for source in sources {
        let classes = (0..source.class_count() as u32)
            .map(|c| Ok(list.add_class_name(source.class_name(c)?)))
            .collect::<Result<Vec<u32>>>()?;
        let users = (0..source.user_count() as u32)
            .map(|u| Ok(list.add_user_name(source.user_name(u)?)))
            .collect::<Result<Vec<u32>>>()?;
        for sample in Cursor::new(*source) {
            let mut sample = sample?.deep_clone();
            sample.class_id = remap(&classes, sample.class_id, GARBAGE_CLASS_ID, "class")?;
            sample.user_id = remap(&users, sample.user_id, GARBAGE_USER_ID, "user")?;
            list.push(sample)?;
        }
        missing |= source.has_missing_data();
    }
    list.set_missing_data(missing);
    debug!(
        "merged {} collections into {} samples",
        sources.len(),
        list.len()
    );
    Ok(list)
}

fn remap(map: &[u32], id: u32, garbage: u32, what: &'static str) -> Result<u32> {
    if id == garbage {
        return Ok(garbage);
    }
    map.get(id as usize)
        .copied()
        .ok_or_else(|| SampleError::out_of_range(what, id as usize, map.len()))
}

/// Append Gaussian test samples to `list`
///
/// Creates `classes` classes named `A`, `B`, ... and one user. Each sample
/// carries `streams` FLOAT streams of one 2-dim row at 10 Hz, drawn around
/// `(distr[c][0], distr[c][1])` with standard deviation `distr[c][2]`.
/// Timestamps increase by a random step below one minute.
pub fn create_test_samples<R: Rng + ?Sized>(
    list: &mut SampleList,
    classes: usize,
    per_class: usize,
    streams: usize,
    distr: &[[f32; 3]],
    user: &str,
    rng: &mut R,
) -> Result<()> {
    if classes > distr.len() {
        return Err(SampleError::invalid(
            "distr",
            format!("{} classes but {} distributions", classes, distr.len()),
        ));
    }
    if classes > 26 {
        return Err(SampleError::invalid("classes", "at most 26 classes"));
    }

    let user_id = list.add_user_name(user);
    let class_ids: Vec<u32> = (0..classes)
        .map(|c| list.add_class_name(&char::from(b'A' + c as u8).to_string()))
        .collect();
    let spec = StreamSpec::float(2, 10.0);

    let mut time = rng.gen_range(0.0..60.0);
    for (&class_id, &[cx, cy, spread]) in class_ids.iter().zip(distr) {
        let invalid = |e: rand_distr::NormalError| SampleError::invalid("distr", e.to_string());
        let x = Normal::new(cx, spread).map_err(invalid)?;
        let y = Normal::new(cy, spread).map_err(invalid)?;
        for _ in 0..per_class {
            let data = (0..streams)
                .map(|_| {
                    let row = [x.sample(rng) as f64, y.sample(rng) as f64];
                    Stream::from_values(&spec, &row)
                })
                .collect::<Result<Vec<_>>>()?;
            list.push(Sample::new(class_id, user_id, time, data).with_score(0.0))?;
            time += rng.gen_range(0.0..60.0);
        }
    }
    debug!(
        "created {} test samples in {} classes",
        classes * per_class,
        classes
    );
    Ok(())
}

/// Empty each stream with probability `1 - prob` and flag missing data
pub fn create_missing_data<R: Rng + ?Sized>(list: &mut SampleList, prob: f64, rng: &mut R) {
    for sample in list.iter_mut() {
        for stream in sample.streams.iter_mut() {
            if rng.gen::<f64>() > prob {
                stream.reset();
            }
        }
    }
    list.set_missing_data(true);
}

/// Printable summary of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct SamplesInfo {
    pub len: usize,
    pub class_sizes: Vec<usize>,
    pub garbage: usize,
    pub class_names: Vec<String>,
    pub user_names: Vec<String>,
    pub streams: Vec<StreamSpec>,
    pub has_missing_data: bool,
}

impl SamplesInfo {
    pub fn of<S: Samples + ?Sized>(samples: &S) -> Result<Self> {
        let class_sizes = (0..samples.class_count() as u32)
            .map(|c| samples.class_len(c))
            .collect::<Result<Vec<_>>>()?;
        let class_names = (0..samples.class_count() as u32)
            .map(|c| samples.class_name(c).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let user_names = (0..samples.user_count() as u32)
            .map(|u| samples.user_name(u).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let streams = (0..samples.stream_count())
            .map(|i| samples.stream(i).copied())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            len: samples.len(),
            class_sizes,
            garbage: samples.garbage_len(),
            class_names,
            user_names,
            streams,
            has_missing_data: samples.has_missing_data(),
        })
    }
}

impl fmt::Display for SamplesInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "samples:   {}x{}", self.len, self.streams.len())?;
        write!(f, "per class:")?;
        for size in &self.class_sizes {
            write!(f, " {}", size)?;
        }
        writeln!(f)?;
        if self.garbage > 0 {
            writeln!(f, "garbage:   {}", self.garbage)?;
        }
        writeln!(
            f,
            "names:     {} ( {} )",
            self.class_names.len(),
            self.class_names.join(" ")
        )?;
        writeln!(
            f,
            "users:     {} ( {} )",
            self.user_names.len(),
            self.user_names.join(" ")
        )?;
        write!(f, "streams:   {} (", self.streams.len())?;
        for spec in &self.streams {
            write!(f, " {}x{}", spec.dim, spec.data_type)?;
        }
        writeln!(f, " )")?;
        write!(f, "missing:   {}", if self.has_missing_data { "yes" } else { "no" })
    }
}

/// Write a whole collection
pub fn save_samples<S: Samples + ?Sized>(
    samples: &S,
    path: impl AsRef<Path>,
    config: &StorageConfig,
) -> Result<()> {
    let mut writer = SampleWriter::create(path, samples, config)?;
    writer.write_all(samples)?;
    writer.close()
}

/// Read a whole collection into memory
pub fn load_samples(path: impl AsRef<Path>) -> Result<SampleList> {
    let reader = SampleReader::open(path)?;
    let list = copy_sample_list(&reader)?;
    info!(
        "loaded {} samples from '{}'",
        list.len(),
        reader.info_path().display()
    );
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    const DISTR: [[f32; 3]; 3] = [[0.3, 0.3, 0.2], [0.3, 0.6, 0.2], [0.6, 0.3, 0.2]];

    fn test_list(per_class: usize) -> SampleList {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut list = SampleList::new();
        create_test_samples(&mut list, 3, per_class, 2, &DISTR, "user", &mut rng).unwrap();
        list
    }

    #[test]
    fn test_create_test_samples() {
        let list = test_list(4);
        assert_eq!(list.len(), 12);
        assert_eq!(list.class_count(), 3);
        assert_eq!(list.class_name(2).unwrap(), "C");
        assert_eq!(list.class_len(1).unwrap(), 4);
        assert_eq!(list.stream_count(), 2);
        assert_eq!(*list.stream(0).unwrap(), StreamSpec::float(2, 10.0));
        let times: Vec<f64> = list.iter().map(|s| s.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_create_test_samples_needs_distributions() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut list = SampleList::new();
        let result = create_test_samples(&mut list, 4, 1, 1, &DISTR, "user", &mut rng);
        assert!(matches!(result, Err(SampleError::InvalidParameter { .. })));
    }

    #[test]
    fn test_sample_matrix() {
        let list = test_list(2);
        let (matrix, classes) = sample_matrix(&list, 1).unwrap();
        assert_eq!(matrix.dim(), (6, 2));
        assert_eq!(classes, vec![0, 0, 1, 1, 2, 2]);
        let row = list.sample(3).unwrap().streams[1].values_f32().unwrap();
        assert_eq!(matrix.row(3).to_vec(), row);
    }

    #[test]
    fn test_matrix_rejects_missing_stream() {
        let mut list = test_list(2);
        list.sample_mut(1).unwrap().streams[0].reset();
        assert!(matches!(
            sample_matrix(&list, 0),
            Err(SampleError::IncompatibleStream(_))
        ));
        assert!(matches!(
            stack_features(&[], 0),
            Err(SampleError::EmptyCollection)
        ));
    }

    #[test]
    fn test_create_missing_data() {
        let mut list = test_list(10);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        create_missing_data(&mut list, 0.5, &mut rng);
        assert!(list.has_missing_data());
        assert!(list.iter().any(|s| s.has_missing_stream()));

        let mut full = test_list(3);
        create_missing_data(&mut full, 1.0, &mut rng);
        assert!(!full.iter().any(|s| s.has_missing_stream()));
    }

    #[test]
    fn test_copy_is_deep() {
        let list = test_list(2);
        let copy = copy_sample_list(&list).unwrap();
        assert_eq!(copy.len(), list.len());
        assert_eq!(copy.class_names(), list.class_names());
        let (a, b) = (list.sample(0).unwrap(), copy.sample(0).unwrap());
        assert_eq!(a, b);
        assert!(!a.streams[0].shares_buffer(&b.streams[0]));
    }

    #[test]
    fn test_merge_remaps_names() {
        let first = test_list(1);
        let mut second = SampleList::new();
        second.add_class_name("C");
        second.add_class_name("Z");
        second.add_user_name("other");
        let stream = Stream::from_f32(&[1.0, 2.0], 2, 10.0).unwrap();
        second
            .push(Sample::new(0, 0, 1.0, vec![stream.clone(), stream.clone()]))
            .unwrap();
        second
            .push(Sample::new(1, GARBAGE_USER_ID, 2.0, vec![stream.clone(), stream]))
            .unwrap();

        let merged = merge_samples(&[&first, &second]).unwrap();
        assert_eq!(merged.len(), 5);
        assert_eq!(merged.class_names(), ["A", "B", "C", "Z"]);
        assert_eq!(merged.user_names(), ["user", "other"]);
        assert_eq!(merged.sample(3).unwrap().class_id, 2);
        assert_eq!(merged.sample(3).unwrap().user_id, 1);
        assert_eq!(merged.sample(4).unwrap().class_id, 3);
        assert_eq!(merged.sample(4).unwrap().user_id, GARBAGE_USER_ID);
        assert_eq!(merged.class_len(2).unwrap(), 2);
    }

    #[test]
    fn test_info_display() {
        let list = test_list(2);
        let text = SamplesInfo::of(&list).unwrap().to_string();
        assert!(text.contains("samples:   6x2"));
        assert!(text.contains("per class: 2 2 2"));
        assert!(text.contains("( A B C )"));
        assert!(text.contains("2xFLOAT"));
    }
}
