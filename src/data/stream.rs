//! Typed stream buffers

use crate::error::{Result, SampleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Element type of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Undef,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    LDouble,
    Struct,
    Image,
    Bool,
}

impl DataType {
    /// All types in tag order
    pub const ALL: [DataType; 15] = [
        DataType::Undef,
        DataType::Char,
        DataType::UChar,
        DataType::Short,
        DataType::UShort,
        DataType::Int,
        DataType::UInt,
        DataType::Long,
        DataType::ULong,
        DataType::Float,
        DataType::Double,
        DataType::LDouble,
        DataType::Struct,
        DataType::Image,
        DataType::Bool,
    ];

    /// Name used in info headers
    pub fn name(self) -> &'static str {
        match self {
            DataType::Undef => "UNDEF",
            DataType::Char => "CHAR",
            DataType::UChar => "UCHAR",
            DataType::Short => "SHORT",
            DataType::UShort => "USHORT",
            DataType::Int => "INT",
            DataType::UInt => "UINT",
            DataType::Long => "LONG",
            DataType::ULong => "ULONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::LDouble => "LDOUBLE",
            DataType::Struct => "STRUCT",
            DataType::Image => "IMAGE",
            DataType::Bool => "BOOL",
        }
    }

    /// Parse a header name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Byte width of a single element
    pub fn default_byte(self) -> usize {
        match self {
            DataType::Char | DataType::UChar | DataType::Bool => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Int | DataType::UInt | DataType::Float => 4,
            DataType::Long | DataType::ULong | DataType::Double | DataType::LDouble => 8,
            DataType::Undef | DataType::Struct | DataType::Image => 1,
        }
    }

    /// Whether elements can be read as numbers
    pub fn is_numeric(self) -> bool {
        !matches!(self, DataType::Undef | DataType::Struct | DataType::Image)
    }

    /// Decode one little-endian element
    pub fn decode(self, chunk: &[u8]) -> Option<f64> {
        let value = match self {
            DataType::Char => i8::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::UChar => u8::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::Short => i16::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::UShort => u16::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::Int => i32::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::UInt => u32::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::Long => i64::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::ULong => u64::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::Float => f32::from_le_bytes(chunk.try_into().ok()?) as f64,
            DataType::Double | DataType::LDouble => f64::from_le_bytes(chunk.try_into().ok()?),
            DataType::Bool => {
                if *chunk.first()? != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            DataType::Undef | DataType::Struct | DataType::Image => return None,
        };
        Some(value)
    }

    /// Encode one element little-endian, appending to `out`
    pub fn encode(self, value: f64, out: &mut Vec<u8>) -> Option<()> {
        match self {
            DataType::Char => out.extend_from_slice(&(value as i8).to_le_bytes()),
            DataType::UChar => out.extend_from_slice(&(value as u8).to_le_bytes()),
            DataType::Short => out.extend_from_slice(&(value as i16).to_le_bytes()),
            DataType::UShort => out.extend_from_slice(&(value as u16).to_le_bytes()),
            DataType::Int => out.extend_from_slice(&(value as i32).to_le_bytes()),
            DataType::UInt => out.extend_from_slice(&(value as u32).to_le_bytes()),
            DataType::Long => out.extend_from_slice(&(value as i64).to_le_bytes()),
            DataType::ULong => out.extend_from_slice(&(value as u64).to_le_bytes()),
            DataType::Float => out.extend_from_slice(&(value as f32).to_le_bytes()),
            DataType::Double | DataType::LDouble => out.extend_from_slice(&value.to_le_bytes()),
            DataType::Bool => out.push(u8::from(value != 0.0)),
            DataType::Undef | DataType::Struct | DataType::Image => return None,
        }
        Some(())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape template of a stream: everything except the data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Values per row
    pub dim: usize,
    /// Bytes per value
    pub byte: usize,
    /// Element type
    pub data_type: DataType,
    /// Sample rate in Hz
    pub sample_rate: f64,
}

impl StreamSpec {
    /// Create a new spec with the default byte width of `data_type`
    pub fn new(dim: usize, data_type: DataType, sample_rate: f64) -> Self {
        Self {
            dim,
            byte: data_type.default_byte(),
            data_type,
            sample_rate,
        }
    }

    /// Spec of a FLOAT stream
    pub fn float(dim: usize, sample_rate: f64) -> Self {
        Self::new(dim, DataType::Float, sample_rate)
    }

    /// Whether a stream has the same dim, byte width and type.
    /// The sample rate is not part of compatibility.
    pub fn is_compatible(&self, stream: &Stream) -> bool {
        self.dim == stream.dim && self.byte == stream.byte && self.data_type == stream.data_type
    }

    /// Bytes of one row
    pub fn row_bytes(&self) -> usize {
        self.dim * self.byte
    }
}

/// A typed numeric buffer of `num` rows with `dim` values each
#[derive(Debug, Clone)]
pub struct Stream {
    num: usize,
    dim: usize,
    byte: usize,
    data_type: DataType,
    sample_rate: f64,
    time: f64,
    data: Arc<Vec<u8>>,
}

impl Stream {
    /// Wrap raw bytes; the length must be `num * dim * byte`
    pub fn new(spec: &StreamSpec, num: usize, data: Vec<u8>) -> Result<Self> {
        let expected = num * spec.row_bytes();
        if data.len() != expected {
            return Err(SampleError::IncompatibleStream(format!(
                "buffer holds {} bytes, {}x{}x{} requires {}",
                data.len(),
                num,
                spec.dim,
                spec.byte,
                expected
            )));
        }
        Ok(Self {
            num,
            dim: spec.dim,
            byte: spec.byte,
            data_type: spec.data_type,
            sample_rate: spec.sample_rate,
            time: 0.0,
            data: Arc::new(data),
        })
    }

    /// Empty (missing) stream of the given shape
    pub fn empty(spec: &StreamSpec) -> Self {
        Self {
            num: 0,
            dim: spec.dim,
            byte: spec.byte,
            data_type: spec.data_type,
            sample_rate: spec.sample_rate,
            time: 0.0,
            data: Arc::new(Vec::new()),
        }
    }

    /// FLOAT stream from row-major values
    pub fn from_f32(values: &[f32], dim: usize, sample_rate: f64) -> Result<Self> {
        if dim == 0 || values.len() % dim != 0 {
            return Err(SampleError::IncompatibleStream(format!(
                "{} values do not fill rows of dimension {}",
                values.len(),
                dim
            )));
        }
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(&StreamSpec::float(dim, sample_rate), values.len() / dim, data)
    }

    /// Stream of any numeric type from row-major values
    pub fn from_values(spec: &StreamSpec, values: &[f64]) -> Result<Self> {
        if spec.dim == 0 || values.len() % spec.dim != 0 {
            return Err(SampleError::IncompatibleStream(format!(
                "{} values do not fill rows of dimension {}",
                values.len(),
                spec.dim
            )));
        }
        let data = encode_all(spec.data_type, spec.byte, values)?;
        Self::new(spec, values.len() / spec.dim, data)
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn byte(&self) -> usize {
        self.byte
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Shape template of this stream
    pub fn spec(&self) -> StreamSpec {
        StreamSpec {
            dim: self.dim,
            byte: self.byte,
            data_type: self.data_type,
            sample_rate: self.sample_rate,
        }
    }

    /// A stream without rows marks missing data
    pub fn is_missing(&self) -> bool {
        self.num == 0
    }

    /// Total number of bytes (`num * dim * byte`)
    pub fn tot(&self) -> usize {
        self.data.len()
    }

    /// Raw little-endian bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable bytes; copies the buffer first if it is shared
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Whether both streams point at the same buffer
    pub fn shares_buffer(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy with a private buffer
    pub fn deep_clone(&self) -> Stream {
        Stream {
            data: Arc::new(self.data.as_ref().clone()),
            ..self.clone()
        }
    }

    /// Take over shape and bytes of `other`, reusing this buffer when unshared
    pub fn copy_from(&mut self, other: &Stream) {
        let buffer = Arc::make_mut(&mut self.data);
        buffer.clear();
        buffer.extend_from_slice(other.bytes());
        self.num = other.num;
        self.dim = other.dim;
        self.byte = other.byte;
        self.data_type = other.data_type;
        self.sample_rate = other.sample_rate;
        self.time = other.time;
    }

    /// Drop all rows, turning the stream into missing data
    pub fn reset(&mut self) {
        self.num = 0;
        self.data = Arc::new(Vec::new());
    }

    /// Decode all values as `f64`
    pub fn values(&self) -> Result<Vec<f64>> {
        self.check_numeric()?;
        self.data
            .chunks_exact(self.byte)
            .map(|chunk| {
                self.data_type.decode(chunk).ok_or_else(|| {
                    SampleError::IncompatibleStream(format!("cannot decode {}", self.data_type))
                })
            })
            .collect()
    }

    /// Decode all values as `f32`
    pub fn values_f32(&self) -> Result<Vec<f32>> {
        if self.data_type == DataType::Float && self.byte == 4 {
            return Ok(self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect());
        }
        Ok(self.values()?.into_iter().map(|v| v as f32).collect())
    }

    /// Overwrite all values, keeping the shape
    pub fn set_values(&mut self, values: &[f64]) -> Result<()> {
        let count = self.num * self.dim;
        if values.len() != count {
            return Err(SampleError::IncompatibleStream(format!(
                "expected {} values, got {}",
                count,
                values.len()
            )));
        }
        self.check_numeric()?;
        let encoded = encode_all(self.data_type, self.byte, values)?;
        *Arc::make_mut(&mut self.data) = encoded;
        Ok(())
    }

    fn check_numeric(&self) -> Result<()> {
        if !self.data_type.is_numeric() || self.byte != self.data_type.default_byte() {
            return Err(SampleError::IncompatibleStream(format!(
                "{} values of {} bytes are not numeric",
                self.data_type, self.byte
            )));
        }
        Ok(())
    }
}

/// Equality covers shape, sample rate and bytes; timestamps are ignored.
impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num
            && self.dim == other.dim
            && self.byte == other.byte
            && self.data_type == other.data_type
            && self.sample_rate == other.sample_rate
            && self.data == other.data
    }
}

fn encode_all(data_type: DataType, byte: usize, values: &[f64]) -> Result<Vec<u8>> {
    if !data_type.is_numeric() || byte != data_type.default_byte() {
        return Err(SampleError::IncompatibleStream(format!(
            "cannot encode {} values of {} bytes",
            data_type, byte
        )));
    }
    let mut data = Vec::with_capacity(values.len() * byte);
    for &v in values {
        data_type
            .encode(v, &mut data)
            .ok_or_else(|| SampleError::IncompatibleStream(format!("cannot encode {}", data_type)))?;
    }
    Ok(data)
}
