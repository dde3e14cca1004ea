//! Record encoding shared by the readers and writers

use crate::data::{DataType, Stream, StreamSpec, GARBAGE_CLASS_ID};
use crate::error::{Result, SampleError};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;
use xmltree::{Element, EmitterConfig, XMLNode};

// Binary primitives, little-endian

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub(crate) fn write_f32<W: Write>(w: &mut W, value: f32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub(crate) fn write_f64<W: Write>(w: &mut W, value: f64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    read_array::<R, 4>(r).map(u32::from_le_bytes)
}

pub(crate) fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    read_array::<R, 4>(r).map(f32::from_le_bytes)
}

pub(crate) fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    read_array::<R, 8>(r).map(f64::from_le_bytes)
}

pub(crate) fn read_bytes<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

// Text fields

/// Labels are written signed so the garbage id reads as -1
pub(crate) fn format_id(id: u32) -> String {
    if id == GARBAGE_CLASS_ID {
        "-1".to_string()
    } else {
        id.to_string()
    }
}

pub(crate) fn parse_id(text: &str) -> Result<u32> {
    let value: i64 = parse_field(text, "label")?;
    match value {
        -1 => Ok(GARBAGE_CLASS_ID),
        v if (0..GARBAGE_CLASS_ID as i64).contains(&v) => Ok(v as u32),
        v => Err(SampleError::SchemaMismatch(format!("invalid label {}", v))),
    }
}

pub(crate) fn parse_field<T: FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| SampleError::SchemaMismatch(format!("cannot parse {} from '{}'", what, text)))
}

/// Read one line without its terminator; end of file is an error
pub(crate) fn read_line<R: BufRead>(r: &mut R) -> Result<String> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of file").into());
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Split a line into exactly `count` fields
pub(crate) fn split_fields(line: &str, delimiter: char, count: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = if delimiter.is_whitespace() {
        line.split_whitespace().collect()
    } else {
        line.split(delimiter).map(str::trim).collect()
    };
    if fields.len() != count {
        return Err(SampleError::SchemaMismatch(format!(
            "expected {} fields, found {} in '{}'",
            count,
            fields.len(),
            line
        )));
    }
    Ok(fields)
}

fn format_element(data_type: DataType, chunk: &[u8]) -> Option<String> {
    macro_rules! text {
        ($t:ty) => {
            <$t>::from_le_bytes(chunk.try_into().ok()?).to_string()
        };
    }
    let text = match data_type {
        DataType::Char => text!(i8),
        DataType::UChar | DataType::Bool => text!(u8),
        DataType::Short => text!(i16),
        DataType::UShort => text!(u16),
        DataType::Int => text!(i32),
        DataType::UInt => text!(u32),
        DataType::Long => text!(i64),
        DataType::ULong => text!(u64),
        DataType::Float => text!(f32),
        DataType::Double | DataType::LDouble => text!(f64),
        DataType::Undef | DataType::Struct | DataType::Image => return None,
    };
    Some(text)
}

fn parse_element(data_type: DataType, text: &str, out: &mut Vec<u8>) -> Option<()> {
    macro_rules! parse {
        ($t:ty) => {
            out.extend_from_slice(&text.parse::<$t>().ok()?.to_le_bytes())
        };
    }
    match data_type {
        DataType::Char => parse!(i8),
        DataType::UChar | DataType::Bool => parse!(u8),
        DataType::Short => parse!(i16),
        DataType::UShort => parse!(u16),
        DataType::Int => parse!(i32),
        DataType::UInt => parse!(u32),
        DataType::Long => parse!(i64),
        DataType::ULong => parse!(u64),
        DataType::Float => parse!(f32),
        DataType::Double | DataType::LDouble => parse!(f64),
        DataType::Undef | DataType::Struct | DataType::Image => return None,
    }
    Some(())
}

fn check_text_type(spec: &StreamSpec) -> Result<()> {
    if !spec.data_type.is_numeric() || spec.byte != spec.data_type.default_byte() {
        return Err(SampleError::IncompatibleStream(format!(
            "{} values of {} bytes cannot be stored as text",
            spec.data_type, spec.byte
        )));
    }
    Ok(())
}

/// Write the rows of a stream as delimited text lines, returning the byte count
pub(crate) fn write_rows<W: Write>(w: &mut W, stream: &Stream, delimiter: char) -> Result<u64> {
    let spec = stream.spec();
    check_text_type(&spec)?;
    let mut written = 0u64;
    let mut line = String::new();
    for row in stream.bytes().chunks_exact(spec.row_bytes().max(1)) {
        line.clear();
        for (j, chunk) in row.chunks_exact(spec.byte).enumerate() {
            if j > 0 {
                line.push(delimiter);
            }
            let text = format_element(spec.data_type, chunk).ok_or_else(|| {
                SampleError::IncompatibleStream(format!("cannot format {}", spec.data_type))
            })?;
            line.push_str(&text);
        }
        line.push('\n');
        w.write_all(line.as_bytes())?;
        written += line.len() as u64;
    }
    Ok(written)
}

/// Read `num` delimited text rows into a raw buffer
pub(crate) fn read_rows<R: BufRead>(
    r: &mut R,
    spec: &StreamSpec,
    num: usize,
    delimiter: char,
) -> Result<Vec<u8>> {
    check_text_type(spec)?;
    let mut data = Vec::with_capacity(num * spec.row_bytes());
    for _ in 0..num {
        let line = read_line(r)?;
        for field in split_fields(&line, delimiter, spec.dim)? {
            parse_element(spec.data_type, field, &mut data).ok_or_else(|| {
                SampleError::SchemaMismatch(format!("cannot parse {} from '{}'", spec.data_type, field))
            })?;
        }
    }
    Ok(data)
}

// XML helpers

/// `<name>text</name>`
pub(crate) fn text_element(name: &str, text: &str) -> Element {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    element
}

/// Text of a required child element
pub(crate) fn child_text(parent: &Element, name: &str) -> Result<String> {
    parent
        .get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| SampleError::SchemaMismatch(format!("missing <{}> in <{}>", name, parent.name)))
}

/// Required attribute, parsed
pub(crate) fn attr<T: FromStr>(element: &Element, name: &str) -> Result<T> {
    let text = element.attributes.get(name).ok_or_else(|| {
        SampleError::SchemaMismatch(format!("missing attribute '{}' in <{}>", name, element.name))
    })?;
    parse_field(text, name)
}

pub(crate) fn set_attr(element: &mut Element, name: &str, value: impl ToString) {
    element.attributes.insert(name.to_string(), value.to_string());
}

/// Child elements with the given tag
pub(crate) fn children<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |e| e.name == name)
}

pub(crate) fn push_child(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

pub(crate) fn write_xml(root: &Element, path: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    root.write_with_config(&mut file, EmitterConfig::new().perform_indent(true))
        .map_err(|e| {
            warn!("could not write '{}': {}", path.display(), e);
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;
    file.flush()?;
    Ok(())
}

pub(crate) fn read_xml(path: &Path) -> Result<Element> {
    let file = File::open(path).map_err(|e| {
        warn!("could not open '{}': {}", path.display(), e);
        e
    })?;
    Ok(Element::parse(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ids() {
        assert_eq!(format_id(GARBAGE_CLASS_ID), "-1");
        assert_eq!(parse_id("-1").unwrap(), GARBAGE_CLASS_ID);
        assert_eq!(parse_id(" 7").unwrap(), 7);
        assert!(parse_id("-2").is_err());
        assert!(parse_id("x").is_err());
    }

    #[test]
    fn test_text_rows() {
        let stream = Stream::from_f32(&[0.1, -2.5, 1e-7, 3.0], 2, 1.0).unwrap();
        let mut buf = Vec::new();
        let written = write_rows(&mut buf, &stream, ' ').unwrap();
        assert_eq!(written as usize, buf.len());
        let data = read_rows(&mut Cursor::new(buf), &stream.spec(), 2, ' ').unwrap();
        assert_eq!(data, stream.bytes());
    }

    #[test]
    fn test_short_read_fails() {
        let spec = StreamSpec::float(2, 1.0);
        let err = read_rows(&mut Cursor::new(b"1 2\n".to_vec()), &spec, 2, ' ').unwrap_err();
        assert!(matches!(err, SampleError::IoFailure(_)));
        let err = read_rows(&mut Cursor::new(b"1\n".to_vec()), &spec, 1, ' ').unwrap_err();
        assert!(matches!(err, SampleError::SchemaMismatch(_)));
    }

    #[test]
    fn test_binary_primitives() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 9).unwrap();
        write_f64(&mut buf, 1.5).unwrap();
        let mut r = Cursor::new(buf);
        assert_eq!(read_u32(&mut r).unwrap(), 9);
        assert_eq!(read_f64(&mut r).unwrap(), 1.5);
        assert!(read_f32(&mut r).is_err());
    }
}
