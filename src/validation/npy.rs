//! Minimal `.npy` support for the golden tensors.
//!
//! Reads format versions 1.0, 2.0 and 3.0 holding little-endian `f4` or `f8` data in C order.
//! Writes `f4` version 1.0 files.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use ndarray::{ArrayD, IxDyn};
use thiserror::Error;

const NPY_MAGIC_PREFIX: [u8; 6] = [0x93, b'N', b'U', b'M', b'P', b'Y'];
const MAX_HEADER_BYTES: usize = 65_536;
const HEADER_ALIGNMENT: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not an npy file (bad magic or unsupported version)")]
    MagicInvalid,

    #[error("Malformed npy header: {0}")]
    HeaderInvalid(&'static str),

    #[error("Unsupported dtype {0:?}; expected little-endian f4 or f8")]
    UnsupportedDType(String),

    #[error("Fortran-ordered arrays are not supported")]
    FortranOrder,

    #[error("Payload holds {actual} bytes but the header declares {expected}")]
    PayloadLength { expected: usize, actual: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DType {
    F32,
    F64,
}

impl DType {
    fn decode(descr: &str) -> Result<Self, NpyError> {
        match descr {
            "<f4" | "f4" => Ok(DType::F32),
            "<f8" | "f8" => Ok(DType::F64),
            other => Err(NpyError::UnsupportedDType(other.to_string())),
        }
    }

    fn item_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

#[derive(Debug)]
struct Header {
    dtype: DType,
    shape: Vec<usize>,
}

fn header_span(payload: &[u8]) -> Result<(usize, usize), NpyError> {
    if payload.len() < 8 || payload[..6] != NPY_MAGIC_PREFIX {
        return Err(NpyError::MagicInvalid);
    }
    let (offset, len) = match (payload[6], payload[7]) {
        (1, 0) => {
            if payload.len() < 10 {
                return Err(NpyError::HeaderInvalid("truncated before v1 header length"));
            }
            (10, usize::from(u16::from_le_bytes([payload[8], payload[9]])))
        }
        (2, 0) | (3, 0) => {
            if payload.len() < 12 {
                return Err(NpyError::HeaderInvalid("truncated before v2/v3 header length"));
            }
            let raw = u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
            let len = usize::try_from(raw)
                .map_err(|_| NpyError::HeaderInvalid("header length exceeds usize"))?;
            (12, len)
        }
        _ => return Err(NpyError::MagicInvalid),
    };
    if len == 0 || len > MAX_HEADER_BYTES {
        return Err(NpyError::HeaderInvalid("header length out of bounds"));
    }
    if payload.len() < offset + len {
        return Err(NpyError::HeaderInvalid("truncated before end of header"));
    }
    Ok((offset, len))
}

fn value_after_key<'a>(dictionary: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let single = format!("'{key}'");
    let double = format!("\"{key}\"");
    let (start, quoted_len) = match dictionary.find(&single) {
        Some(start) => (start, single.len()),
        None => (
            dictionary
                .find(&double)
                .ok_or(NpyError::HeaderInvalid("required key missing"))?,
            double.len(),
        ),
    };
    dictionary[start + quoted_len..]
        .trim_start()
        .strip_prefix(':')
        .map(str::trim_start)
        .ok_or(NpyError::HeaderInvalid("key without ':' separator"))
}

fn quoted(value: &str) -> Result<&str, NpyError> {
    let quote = value
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or(NpyError::HeaderInvalid("descr must be a quoted string"))?;
    let tail = &value[1..];
    let end = tail
        .find(quote)
        .ok_or(NpyError::HeaderInvalid("unterminated string"))?;
    Ok(&tail[..end])
}

fn shape_tuple(value: &str) -> Result<Vec<usize>, NpyError> {
    let inner = value
        .strip_prefix('(')
        .ok_or(NpyError::HeaderInvalid("shape must be a tuple"))?;
    let end = inner
        .find(')')
        .ok_or(NpyError::HeaderInvalid("unterminated shape tuple"))?;
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| NpyError::HeaderInvalid("shape entries must be integers"))
        })
        .collect()
}

fn parse_header(bytes: &[u8]) -> Result<Header, NpyError> {
    let dictionary = std::str::from_utf8(bytes)
        .map_err(|_| NpyError::HeaderInvalid("header is not ASCII"))?
        .trim_end();
    if !(dictionary.starts_with('{') && dictionary.ends_with('}')) {
        return Err(NpyError::HeaderInvalid("header is not a dictionary"));
    }

    let dtype = DType::decode(quoted(value_after_key(dictionary, "descr")?)?)?;

    let fortran = value_after_key(dictionary, "fortran_order")?;
    if fortran.starts_with("True") {
        return Err(NpyError::FortranOrder);
    } else if !fortran.starts_with("False") {
        return Err(NpyError::HeaderInvalid("fortran_order must be True or False"));
    }

    let shape = shape_tuple(value_after_key(dictionary, "shape")?)?;
    Ok(Header { dtype, shape })
}

/// Decodes an in-memory npy file. `f8` data is narrowed to `f32`.
pub fn decode(payload: &[u8]) -> Result<ArrayD<f32>, NpyError> {
    let (offset, len) = header_span(payload)?;
    let header = parse_header(&payload[offset..offset + len])?;
    let body = &payload[offset + len..];

    let expected = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .and_then(|count| count.checked_mul(header.dtype.item_size()))
        .ok_or(NpyError::HeaderInvalid("shape overflows the addressable size"))?;
    if body.len() != expected {
        return Err(NpyError::PayloadLength {
            expected,
            actual: body.len(),
        });
    }

    let values: Vec<f32> = match header.dtype {
        DType::F32 => body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        DType::F64 => body
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
    };

    ArrayD::from_shape_vec(IxDyn(&header.shape), values)
        .map_err(|_| NpyError::HeaderInvalid("shape does not match element count"))
}

pub fn read(path: &Path) -> Result<ArrayD<f32>, NpyError> {
    let payload = std::fs::read(path).map_err(|source| NpyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&payload)
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        dims => format!(
            "({})",
            dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Encodes as a version 1.0 `<f4` file in C order.
pub fn encode(array: &ArrayD<f32>) -> Vec<u8> {
    let dictionary = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(array.shape())
    );
    // magic + version + u16 length
    let prefix_len = NPY_MAGIC_PREFIX.len() + 2 + 2;
    let unpadded = prefix_len + dictionary.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    let header_len = dictionary.len() + padding + 1;

    let mut out = Vec::with_capacity(prefix_len + header_len + array.len() * 4);
    out.extend_from_slice(&NPY_MAGIC_PREFIX);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dictionary.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    // `iter()` walks in logical (C) order regardless of memory layout.
    for value in array.iter() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn write(path: &Path, array: &ArrayD<f32>) -> Result<(), NpyError> {
    let io_err = |source| NpyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    file.write_all(&encode(array)).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(version: u8, header: &str, body: &[u8]) -> Vec<u8> {
        let mut out = NPY_MAGIC_PREFIX.to_vec();
        out.extend_from_slice(&[version, 0]);
        if version == 1 {
            out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn encoded_header_is_aligned() {
        let array = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0f32; 6]).unwrap();
        let bytes = encode(&array);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGNMENT, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(decode(&bytes).unwrap(), array);
    }

    #[test]
    fn reads_f8_version_two() {
        let body: Vec<u8> = [1.5f64, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = manual(
            2,
            "{'descr': '<f8', 'fortran_order': False, 'shape': (2,), }\n",
            &body,
        );
        let array = decode(&bytes).unwrap();
        assert_eq!(array.shape(), &[2]);
        assert_eq!(array.as_slice().unwrap(), &[1.5f32, -2.0]);
    }

    #[test]
    fn rejects_unsupported_inputs() {
        assert!(matches!(decode(b"not numpy"), Err(NpyError::MagicInvalid)));
        let big_endian = manual(1, "{'descr': '>f4', 'fortran_order': False, 'shape': (1,), }", &[0; 4]);
        assert!(matches!(decode(&big_endian), Err(NpyError::UnsupportedDType(_))));
        let fortran = manual(1, "{'descr': '<f4', 'fortran_order': True, 'shape': (1,), }", &[0; 4]);
        assert!(matches!(decode(&fortran), Err(NpyError::FortranOrder)));
        let short = manual(1, "{'descr': '<f4', 'fortran_order': False, 'shape': (2,), }", &[0; 4]);
        assert!(matches!(
            decode(&short),
            Err(NpyError::PayloadLength { expected: 8, actual: 4 })
        ));
    }

    #[test]
    fn oversized_shape_is_an_error() {
        let huge = manual(
            1,
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4294967296, 4294967296, 4294967296), }",
            &[0; 16],
        );
        assert!(matches!(decode(&huge), Err(NpyError::HeaderInvalid(_))));

        let too_wide = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
            usize::MAX / 4
        );
        assert!(matches!(
            decode(&manual(1, &too_wide, &[0; 8])),
            Err(NpyError::HeaderInvalid(_))
        ));
    }

    #[test]
    fn scalar_shape_round_trips() {
        let scalar = ArrayD::from_shape_vec(IxDyn(&[]), vec![7.0f32]).unwrap();
        assert_eq!(decode(&encode(&scalar)).unwrap(), scalar);
    }
}
