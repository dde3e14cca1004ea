//! Integration tests for on-disk persistence

use std::collections::HashMap;
use std::fs;

use sampleset::prelude::*;
use sampleset::storage::{data_path, info_path, stream_path, StreamFileReader, StreamFileWriter};
use sampleset::tools::{load_samples, save_samples};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

/// Three classes, two users, a FLOAT stream with varying row counts and an
/// INT stream; includes garbage labels and missing streams
fn mixed_list() -> SampleList {
    let mut list = SampleList::new();
    for name in ["rest", "walk", "run"] {
        list.add_class_name(name);
    }
    list.add_user_name("anna");
    list.add_user_name("ben");

    let float = StreamSpec::float(3, 25.0);
    let int = StreamSpec::new(1, DataType::Int, 1.0);
    for i in 0..9usize {
        let rows = i % 4;
        let values: Vec<f64> = (0..rows * 3).map(|j| (i * 10 + j) as f64 * 0.37 - 4.0).collect();
        let motion = Stream::from_values(&float, &values).unwrap();
        let steps = Stream::from_values(&int, &[i as f64 * 100.0 - 300.0]).unwrap();
        let class_id = if i == 4 { GARBAGE_CLASS_ID } else { (i % 3) as u32 };
        let user_id = if i == 7 { GARBAGE_USER_ID } else { (i % 2) as u32 };
        let sample = Sample::new(class_id, user_id, 0.5 + i as f64 * 1.25, vec![motion, steps])
            .with_score(i as f32 / 9.0);
        list.push(sample).unwrap();
    }
    list
}

/// Two classes, three users, one 4-dim stream, ten samples per class
fn scenario_a() -> SampleList {
    let mut list = SampleList::new();
    list.add_class_name("no");
    list.add_class_name("yes");
    for user in ["u1", "u2", "u3"] {
        list.add_user_name(user);
    }
    for i in 0..20u32 {
        let values: Vec<f32> = (0..4).map(|j| (i * 4 + j) as f32 / 7.0).collect();
        let stream = Stream::from_f32(&values, 4, 50.0).unwrap();
        list.push(Sample::new(i / 10, i % 3, i as f64 * 0.1, vec![stream]))
            .unwrap();
    }
    list
}

fn assert_same_collection<S: Samples>(read: &S, written: &SampleList) {
    assert_eq!(read.len(), written.len());
    assert_eq!(read.class_count(), written.class_count());
    for c in 0..written.class_count() as u32 {
        assert_eq!(read.class_name(c).unwrap(), written.class_name(c).unwrap());
        assert_eq!(read.class_len(c).unwrap(), written.class_len(c).unwrap());
    }
    assert_eq!(read.user_count(), written.user_count());
    for u in 0..written.user_count() as u32 {
        assert_eq!(read.user_name(u).unwrap(), written.user_name(u).unwrap());
    }
    assert_eq!(read.stream_count(), written.stream_count());
    for s in 0..written.stream_count() {
        assert_eq!(read.stream(s).unwrap(), written.stream(s).unwrap());
    }
    assert_eq!(read.has_missing_data(), written.has_missing_data());
    assert_eq!(read.garbage_len(), written.garbage_len());
    for i in 0..written.len() {
        let got = read.get(i).unwrap();
        let expected = written.sample(i).unwrap();
        assert_eq!(got.class_id, expected.class_id);
        assert_eq!(got.user_id, expected.user_id);
        assert_eq!(got.time, expected.time);
        assert_eq!(got.score, expected.score);
        for (a, b) in got.streams.iter().zip(&expected.streams) {
            assert_eq!(a.num(), b.num());
            assert_eq!(a.bytes(), b.bytes());
        }
    }
}

fn roundtrip(version: Version, file_type: FileType, delimiter: char) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed");
    let list = mixed_list();
    let config = StorageConfig::new()
        .with_version(version)
        .with_file_type(file_type)
        .with_delimiter(delimiter);
    save_samples(&list, &path, &config).unwrap();

    let reader = SampleReader::open(&path).unwrap();
    assert_eq!(reader.version(), version);
    assert_eq!(reader.file_type(), file_type);
    assert!(!reader.supports_shallow_copy());
    assert_same_collection(&reader, &list);
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_roundtrip_v3_binary() {
    roundtrip(Version::V3, FileType::Binary, ' ');
}

#[test]
fn test_roundtrip_v3_ascii() {
    roundtrip(Version::V3, FileType::Ascii, ';');
}

#[test]
fn test_roundtrip_v2_binary() {
    roundtrip(Version::V2, FileType::Binary, ' ');
}

#[test]
fn test_roundtrip_v2_ascii() {
    roundtrip(Version::V2, FileType::Ascii, '\t');
}

#[test]
fn test_v3_layout_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("layout");
    save_samples(&mixed_list(), &path, &StorageConfig::default()).unwrap();

    let info = info_path(&path);
    assert!(info.exists());
    assert!(data_path(&info).exists());
    for i in 0..2 {
        let header = stream_path(&info, i);
        assert!(header.exists());
        assert!(data_path(&header).exists());
    }
    let text = fs::read_to_string(&info).unwrap();
    assert!(text.contains("ssi-v=\"3\""));
    // 9 fixed-size header records
    assert_eq!(fs::metadata(data_path(&info)).unwrap().len(), 9 * 20);
}

#[test]
fn test_v3_mixed_stream_encodings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed_enc");
    let list = mixed_list();
    let config = StorageConfig::new()
        .with_version(Version::V3)
        .with_file_type(FileType::Binary);
    save_samples(&list, &path, &config).unwrap();

    // Rewrite the second side-car as ASCII, leaving the first binary
    let info = info_path(&path);
    let header = stream_path(&info, 1);
    let mut source = StreamFileReader::open(&header).unwrap();
    let spec = *source.spec();
    let streams: Vec<Stream> = (0..source.len()).map(|i| source.read(i).unwrap()).collect();
    drop(source);
    let mut writer = StreamFileWriter::create(&header, spec, FileType::Ascii, ',').unwrap();
    for (stream, sample) in streams.iter().zip(list.iter()) {
        writer.write(stream, sample.time).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(
        StreamFileReader::open(stream_path(&info, 0)).unwrap().file_type(),
        FileType::Binary
    );
    assert_eq!(StreamFileReader::open(&header).unwrap().file_type(), FileType::Ascii);

    let reader = SampleReader::open(&path).unwrap();
    assert_same_collection(&reader, &list);
}

#[test]
fn test_scenario_b_match_by_time() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.samples");
    let list = scenario_a();
    let mut under = UnderSample::new(&list).unwrap().with_seed(3).unwrap();
    under.set_under(0, 4, UnderStrategy::Random).unwrap();
    let config = StorageConfig::new()
        .with_version(Version::V3)
        .with_file_type(FileType::Binary);
    save_samples(&under, &path, &config).unwrap();

    let loaded = load_samples(&path).unwrap();
    assert_eq!(loaded.len(), 14);
    assert_eq!(loaded.class_len(0).unwrap(), 4);
    assert_eq!(loaded.class_len(1).unwrap(), 10);
    assert_eq!(loaded.user_names(), ["u1", "u2", "u3"]);

    let by_time: HashMap<u64, &Sample> = list.iter().map(|s| (s.time.to_bits(), s)).collect();
    for sample in loaded.iter() {
        let original = by_time[&sample.time.to_bits()];
        assert_eq!(sample, original);
    }
}

#[test]
fn test_v2_random_access_backwards() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy");
    let list = mixed_list();
    let config = StorageConfig::new().with_version(Version::V2);
    save_samples(&list, &path, &config).unwrap();

    let reader = SampleReader::open(&path).unwrap();
    for i in [6, 2, 8, 0, 0, 5] {
        assert_eq!(&reader.get(i).unwrap(), list.sample(i).unwrap());
    }
    assert!(matches!(
        reader.get(9),
        Err(SampleError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_convert_between_versions() {
    let dir = tempdir().unwrap();
    let v2 = dir.path().join("old");
    let v3 = dir.path().join("new");
    let list = mixed_list();
    save_samples(
        &list,
        &v2,
        &StorageConfig::new()
            .with_version(Version::V2)
            .with_file_type(FileType::Ascii),
    )
    .unwrap();

    let legacy = SampleReader::open(&v2).unwrap();
    save_samples(&legacy, &v3, &StorageConfig::default()).unwrap();
    let current = SampleReader::open(&v3).unwrap();
    assert_eq!(current.version(), Version::V3);
    assert_same_collection(&current, &list);
}

// ============================================================================
// Writer behavior
// ============================================================================

#[test]
fn test_writer_rejects_invalid_samples() {
    let dir = tempdir().unwrap();
    let list = mixed_list();
    let mut writer =
        SampleWriter::create(dir.path().join("bad"), &list, &StorageConfig::default()).unwrap();

    let mut wrong_class = list.get(0).unwrap();
    wrong_class.class_id = 3;
    assert!(matches!(
        writer.write(&wrong_class),
        Err(SampleError::IndexOutOfRange { what: "class", .. })
    ));

    let mut wrong_shape = list.get(1).unwrap();
    wrong_shape.streams.pop();
    assert!(matches!(
        writer.write(&wrong_shape),
        Err(SampleError::IncompatibleStream(_))
    ));

    writer.write(list.sample(1).unwrap()).unwrap();
    assert_eq!(writer.len(), 1);
    writer.close().unwrap();

    let reader = SampleReader::open(dir.path().join("bad")).unwrap();
    assert_eq!(reader.len(), 1);
    assert_eq!(&reader.get(0).unwrap(), list.sample(1).unwrap());
}

#[test]
fn test_info_written_only_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pending");
    let list = scenario_a();
    {
        let mut writer = SampleWriter::create(&path, &list, &StorageConfig::default()).unwrap();
        writer.write_all(&list).unwrap();
        assert!(!info_path(&path).exists());
    }
    // Dropping closes the writer
    let reader = SampleReader::open(&path).unwrap();
    assert_eq!(reader.len(), 20);
}

#[test]
fn test_config_from_json() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("storage.json");
    fs::write(
        &config_path,
        r#"{"version": "V2", "file_type": "Ascii", "delimiter": ","}"#,
    )
    .unwrap();
    let config = StorageConfig::from_file(&config_path).unwrap();
    let path = dir.path().join("csv");
    save_samples(&scenario_a(), &path, &config).unwrap();

    let text = fs::read_to_string(data_path(&info_path(&path))).unwrap();
    assert!(text.contains(','));
    assert_eq!(load_samples(&path).unwrap().len(), 20);
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn test_open_missing_file() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        SampleReader::open(dir.path().join("nothing")),
        Err(SampleError::IoFailure(_))
    ));
}

#[test]
fn test_open_corrupt_info() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.samples");
    fs::write(&path, "<samples ssi-v=\"3\"><info").unwrap();
    assert!(matches!(
        SampleReader::open(&path),
        Err(SampleError::SchemaMismatch(_))
    ));

    fs::write(&path, "<samples ssi-v=\"7\"><info/></samples>").unwrap();
    assert!(matches!(
        SampleReader::open(&path),
        Err(SampleError::SchemaMismatch(_))
    ));
}

#[test]
fn test_truncated_legacy_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short");
    save_samples(
        &scenario_a(),
        &path,
        &StorageConfig::new().with_version(Version::V2),
    )
    .unwrap();
    let data = data_path(&info_path(&path));
    let bytes = fs::read(&data).unwrap();
    fs::write(&data, &bytes[..bytes.len() / 2]).unwrap();

    let reader = SampleReader::open(&path).unwrap();
    assert!(reader.get(0).is_ok());
    assert!(matches!(reader.get(19), Err(SampleError::IoFailure(_))));
    // Earlier samples are still reachable after the failure
    assert!(reader.get(1).is_ok());
}
