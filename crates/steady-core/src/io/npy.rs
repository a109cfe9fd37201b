use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{Result, SteadyError};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Read a one-dimensional integer `.npy` array as `i64` values.
///
/// Accepts any signed or unsigned integer dtype of either byte order.
pub fn read_npy_indices(path: &Path) -> Result<Vec<i64>> {
    let bytes = std::fs::read(path)?;
    parse_npy_indices(&bytes)
}

pub fn parse_npy_indices(bytes: &[u8]) -> Result<Vec<i64>> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(SteadyError::InvalidNpy("missing NUMPY magic".into()));
    }
    let major = bytes[6];
    let mut cursor = Cursor::new(&bytes[8..]);
    let header_len = match major {
        1 => cursor.read_u16::<LittleEndian>()? as usize,
        2 | 3 => cursor.read_u32::<LittleEndian>()? as usize,
        v => return Err(SteadyError::InvalidNpy(format!("unsupported version {v}"))),
    };
    let mut header = vec![0u8; header_len];
    cursor
        .read_exact(&mut header)
        .map_err(|_| SteadyError::InvalidNpy("header truncated".into()))?;
    let header = String::from_utf8_lossy(&header);

    let descr = dict_value(&header, "descr")
        .ok_or_else(|| SteadyError::InvalidNpy("header has no descr".into()))?;
    let descr = descr.trim_matches(|c| c == '\'' || c == '"');
    let count = shape_len(&header)?;

    let mut chars = descr.chars();
    let order = chars.next().unwrap_or('|');
    let kind = chars.next().unwrap_or('?');
    let size: usize = chars
        .as_str()
        .parse()
        .map_err(|_| SteadyError::InvalidNpy(format!("unsupported dtype {descr}")))?;
    let big = order == '>';

    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let v = read_int(&mut cursor, kind, size, big)
            .map_err(|_| SteadyError::InvalidNpy("data truncated".into()))?
            .ok_or_else(|| SteadyError::InvalidNpy(format!("unsupported dtype {descr}")))?;
        out.push(v);
    }
    Ok(out)
}

fn read_int(cursor: &mut Cursor<&[u8]>, kind: char, size: usize, big: bool) -> std::io::Result<Option<i64>> {
    macro_rules! rd {
        ($method:ident) => {
            if big {
                cursor.$method::<BigEndian>()? as i64
            } else {
                cursor.$method::<LittleEndian>()? as i64
            }
        };
    }
    let v = match (kind, size) {
        ('i', 1) => cursor.read_i8()? as i64,
        ('u', 1) | ('b', 1) => cursor.read_u8()? as i64,
        ('i', 2) => rd!(read_i16),
        ('u', 2) => rd!(read_u16),
        ('i', 4) => rd!(read_i32),
        ('u', 4) => rd!(read_u32),
        ('i', 8) => rd!(read_i64),
        ('u', 8) => rd!(read_u64),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{key}'"))? + key.len() + 2;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn shape_len(header: &str) -> Result<usize> {
    let start = header
        .find("'shape'")
        .ok_or_else(|| SteadyError::InvalidNpy("header has no shape".into()))?;
    let rest = &header[start..];
    let open = rest
        .find('(')
        .ok_or_else(|| SteadyError::InvalidNpy("malformed shape".into()))?;
    let close = rest
        .find(')')
        .ok_or_else(|| SteadyError::InvalidNpy("malformed shape".into()))?;
    let dims: Vec<usize> = rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| SteadyError::InvalidNpy("malformed shape".into()))?;
    match dims.as_slice() {
        [] => Ok(1),
        [n] => Ok(*n),
        _ => Err(SteadyError::InvalidNpy(format!(
            "expected a 1-D index array, got shape {dims:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npy(descr: &str, shape: &str, data: &[u8]) -> Vec<u8> {
        let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut out = NPY_MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_parse_int64_little_endian() {
        let data: Vec<u8> = [3i64, 7, 11].iter().flat_map(|v| v.to_le_bytes()).collect();
        let parsed = parse_npy_indices(&npy("<i8", "(3,)", &data)).unwrap();
        assert_eq!(parsed, vec![3, 7, 11]);
    }

    #[test]
    fn test_parse_uint16_big_endian() {
        let data: Vec<u8> = [5u16, 300].iter().flat_map(|v| v.to_be_bytes()).collect();
        let parsed = parse_npy_indices(&npy(">u2", "(2,)", &data)).unwrap();
        assert_eq!(parsed, vec![5, 300]);
    }

    #[test]
    fn test_rejects_float_dtype_and_garbage() {
        let data = 1.0f64.to_le_bytes();
        assert!(parse_npy_indices(&npy("<f8", "(1,)", &data)).is_err());
        assert!(parse_npy_indices(b"not an npy file").is_err());
    }
}
