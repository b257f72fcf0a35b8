//! Vector utilities and the embedding matrix codec.
//!
//! - [`l2_normalize`]: scale a vector to unit length (with a small epsilon
//!   so zero vectors stay finite)
//! - [`dot`]: inner product, the similarity of two normalized vectors
//! - [`Matrix`]: a dense row-major `rows × dim` f32 matrix
//! - [`encode_npy`] / [`decode_npy`]: NumPy `.npy` v1.0 (`<f4`, C order)
//!
//! # `.npy` layout
//!
//! ```text
//! \x93NUMPY  major minor  header_len(u16 LE)  header...\n  rows*dim f32 LE
//! ```
//!
//! The header is a Python dict literal padded with spaces so the payload
//! starts on a 64-byte boundary.

use std::path::Path;

use crate::error::{RagError, Result};

/// Added to the norm before dividing.
pub const NORM_EPSILON: f32 = 1e-9;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Scale `v` in place to unit L2 norm.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= denom;
    }
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode floats as little-endian bytes.
pub fn f32s_to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian bytes into floats. Trailing bytes that do not form
/// a whole `f32` are ignored.
pub fn le_bytes_to_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Dense row-major matrix; row `i` is the embedding of corpus chunk `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Empty matrix with a fixed dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            rows: 0,
            dim,
            data: Vec::new(),
        }
    }

    /// Stack `rows`, each of which must have exactly `dim` elements.
    pub fn from_rows(rows: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(RagError::validation(format!(
                    "embedding row {} has {} elements, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            dim,
            data,
        })
    }

    /// Wrap a flat buffer; `data.len()` must equal `rows * dim`.
    pub fn from_flat(rows: usize, dim: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(dim) != Some(data.len()) {
            return Err(RagError::validation(format!(
                "matrix buffer has {} values, expected {} x {}",
                data.len(),
                rows,
                dim
            )));
        }
        Ok(Self { rows, dim, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero size
        self.data.chunks_exact(self.dim.max(1)).take(self.rows)
    }

    /// L2-normalize every row in place.
    pub fn normalize_rows(&mut self) {
        if self.dim == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(self.dim) {
            l2_normalize(row);
        }
    }
}

/// Serialize a matrix as `.npy` v1.0 bytes.
pub fn encode_npy(matrix: &Matrix) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        matrix.rows, matrix.dim
    );
    // magic + version + u16 length
    let preamble = NPY_MAGIC.len() + 2 + 2;
    let unpadded = preamble + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(preamble + header_len + matrix.data.len() * 4);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    out.extend_from_slice(&f32s_to_le_bytes(&matrix.data));
    out
}

/// Parse `.npy` bytes read from `path`. Only 2-D little-endian f32 arrays in
/// C order are accepted.
pub fn decode_npy(bytes: &[u8], path: &Path) -> Result<Matrix> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(RagError::corrupt(path, "not an .npy file"));
    }
    let major = bytes[6];
    let (header_start, header_len) = match major {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(RagError::corrupt(path, "truncated .npy preamble"));
            }
            (
                12,
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            )
        }
        v => return Err(RagError::corrupt(path, format!("unsupported .npy version {}", v))),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(RagError::corrupt(path, "truncated .npy header"));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| RagError::corrupt(path, "non-UTF-8 .npy header"))?;

    let descr = header_value(header, "descr")
        .ok_or_else(|| RagError::corrupt(path, "missing descr"))?;
    if !descr.starts_with("'<f4'") {
        return Err(RagError::corrupt(path, format!("unsupported dtype {}", descr)));
    }
    let fortran = header_value(header, "fortran_order")
        .ok_or_else(|| RagError::corrupt(path, "missing fortran_order"))?;
    if !fortran.starts_with("False") {
        return Err(RagError::corrupt(path, "fortran-ordered arrays are not supported"));
    }
    let (rows, dim) = parse_shape(header).ok_or_else(|| RagError::corrupt(path, "bad shape"))?;

    let payload = &bytes[data_start..];
    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| RagError::corrupt(path, "shape overflows"))?;
    if payload.len() != expected {
        return Err(RagError::corrupt(
            path,
            format!(
                "payload is {} bytes, shape ({}, {}) needs {}",
                payload.len(),
                rows,
                dim,
                expected
            ),
        ));
    }

    Matrix::from_flat(rows, dim, le_bytes_to_f32s(payload))
}

/// Text following `'key':` in a header dict, left-trimmed.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{}':", key);
    let at = header.find(&needle)?;
    Some(header[at + needle.len()..].trim_start())
}

fn parse_shape(header: &str) -> Option<(usize, usize)> {
    let value = header_value(header, "shape")?;
    let inner = value.strip_prefix('(')?;
    let inner = &inner[..inner.find(')')?];
    let dims: Vec<usize> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match dims.as_slice() {
        [rows, dim] => Some((*rows, *dim)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("embeddings.npy")
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_finite() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]], 2).unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn test_npy_header_aligned() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 3).unwrap();
        let bytes = encode_npy(&m);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }"));
        assert_eq!(decode_npy(&bytes, &p()).unwrap(), m);
    }

    #[test]
    fn test_npy_empty_matrix() {
        let m = Matrix::empty(512);
        let decoded = decode_npy(&encode_npy(&m), &p()).unwrap();
        assert_eq!(decoded.rows(), 0);
        assert_eq!(decoded.dim(), 512);
    }

    #[test]
    fn test_npy_rejects_truncated_payload() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0]], 2).unwrap();
        let mut bytes = encode_npy(&m);
        bytes.pop();
        let err = decode_npy(&bytes, &p()).unwrap_err();
        assert!(matches!(err, RagError::Corrupt { .. }));
    }

    #[test]
    fn test_npy_rejects_other_dtype() {
        let m = Matrix::from_rows(vec![vec![1.0]], 1).unwrap();
        let mut bytes = encode_npy(&m);
        let at = bytes.windows(3).position(|w| w == b"<f4").unwrap();
        bytes[at + 2] = b'8';
        let err = decode_npy(&bytes, &p()).unwrap_err();
        assert!(err.to_string().contains("unsupported dtype"), "{}", err);
    }

    #[test]
    fn test_iter_rows() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        let rows: Vec<&[f32]> = m.iter_rows().collect();
        assert_eq!(rows, vec![&[1.0, 2.0][..], &[3.0, 4.0][..]]);
    }
}
