//! SLFC: checkpoint container for surface light field training runs.
//!
//! - Stores the frequency basis that conditions the regression network
//!   (an N x D f32 matrix plus optional per-row phase offsets).
//! - Stores the global step counter so a resumed run continues its schedule.
//! - Optionally carries an opaque model-state blob owned by the trainer.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"SLFC"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => phase offsets present (rows f32)
//!                 bit 1 => model state present
//!   0C  : u32     basis kind (0 = gaussian, 1 = importance)
//!   10  : u64     step
//!   18  : u32     rows
//!   1C  : u32     cols
//!   20  : f32[rows*cols] matrix, row-major
//!   ..  : f32[rows]      phases        (if bit0)
//!   ..  : u64 len, [u8; len] model     (if bit1)
//!
//! Values are stored as raw IEEE-754 bits, so a reloaded basis is
//! bit-identical to the one that was written.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

pub const SLFC_MAGIC: [u8; 4] = *b"SLFC";
pub const SLFC_VERSION: u32 = 1;
pub const SLFC_HEADER_LEN: usize = 32;

const FLAG_PHASES: u32 = 1 << 0;
const FLAG_MODEL: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BasisKind {
    /// Scaled standard-normal projection, no phases.
    Gaussian = 0,
    /// Importance-sampled projection with uniform phases.
    Importance = 1,
}

impl BasisKind {
    fn from_u32(v: u32) -> io::Result<Self> {
        match v {
            0 => Ok(BasisKind::Gaussian),
            1 => Ok(BasisKind::Importance),
            x => Err(bad(&format!("unknown basis kind {}", x))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlfcCheckpoint {
    pub kind: BasisKind,
    pub step: u64,
    pub rows: u32,
    pub cols: u32,
    /// Row-major `rows * cols` projection coefficients.
    pub matrix: Vec<f32>,
    pub phases: Option<Vec<f32>>,
    pub model_state: Option<Vec<u8>>,
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated SLFC"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_u64(buf: &mut &[u8]) -> io::Result<u64> {
    let b = take(buf, 8)?;
    Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Decode `count` little-endian f32 values, reinterpreting in place when the
/// slice happens to be aligned.
fn le_f32_block(buf: &mut &[u8], count: usize) -> io::Result<Vec<f32>> {
    let bytes = count
        .checked_mul(4)
        .ok_or_else(|| bad("f32 block size overflow"))?;
    let raw = take(buf, bytes)?;

    #[cfg(target_endian = "little")]
    {
        if let Ok(values) = bytemuck::try_cast_slice::<u8, f32>(raw) {
            return Ok(values.to_vec());
        }
    }

    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Parse SLFC from a contiguous byte slice.
pub fn parse_slfc_bytes(mut p: &[u8]) -> io::Result<SlfcCheckpoint> {
    if take(&mut p, 4)? != SLFC_MAGIC {
        return Err(bad("bad SLFC magic"));
    }

    let version = le_u32(&mut p)?;
    if version != SLFC_VERSION {
        return Err(bad("unsupported SLFC version"));
    }

    let flags = le_u32(&mut p)?;
    let has_phases = (flags & FLAG_PHASES) != 0;
    let has_model = (flags & FLAG_MODEL) != 0;

    let kind = BasisKind::from_u32(le_u32(&mut p)?)?;
    let step = le_u64(&mut p)?;
    let rows = le_u32(&mut p)?;
    let cols = le_u32(&mut p)?;
    if rows == 0 || cols == 0 {
        return Err(bad("basis must have at least one row and one column"));
    }

    let count = (rows as usize)
        .checked_mul(cols as usize)
        .ok_or_else(|| bad("matrix size overflow"))?;
    let matrix = le_f32_block(&mut p, count)?;

    let phases = if has_phases {
        Some(le_f32_block(&mut p, rows as usize)?)
    } else {
        None
    };

    let model_state = if has_model {
        let len = usize::try_from(le_u64(&mut p)?).map_err(|_| bad("model state too large"))?;
        Some(take(&mut p, len)?.to_vec())
    } else {
        None
    };

    if !p.is_empty() {
        return Err(bad("trailing bytes after SLFC payload"));
    }

    Ok(SlfcCheckpoint {
        kind,
        step,
        rows,
        cols,
        matrix,
        phases,
        model_state,
    })
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<SlfcCheckpoint> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_slfc_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<SlfcCheckpoint> {
    let bytes = std::fs::read(path)?;
    parse_slfc_bytes(&bytes)
}

pub fn write_slfc<W: Write>(w: &mut W, ckpt: &SlfcCheckpoint) -> io::Result<()> {
    let expected = (ckpt.rows as usize)
        .checked_mul(ckpt.cols as usize)
        .ok_or_else(|| bad("matrix size overflow"))?;
    if ckpt.rows == 0 || ckpt.cols == 0 || ckpt.matrix.len() != expected {
        return Err(bad("matrix length != rows * cols"));
    }

    let mut flags = 0u32;

    if let Some(phases) = ckpt.phases.as_ref() {
        if phases.len() != ckpt.rows as usize {
            return Err(bad("phases length != rows"));
        }
        flags |= FLAG_PHASES;
    }

    if ckpt.model_state.is_some() {
        flags |= FLAG_MODEL;
    }

    w.write_all(&SLFC_MAGIC)?;

    write_u32(w, SLFC_VERSION)?;
    write_u32(w, flags)?;
    write_u32(w, ckpt.kind as u32)?;
    write_u64(w, ckpt.step)?;
    write_u32(w, ckpt.rows)?;
    write_u32(w, ckpt.cols)?;

    for &v in &ckpt.matrix {
        write_f32(w, v)?;
    }

    if let Some(phases) = ckpt.phases.as_ref() {
        for &v in phases {
            write_f32(w, v)?;
        }
    }

    if let Some(model) = ckpt.model_state.as_ref() {
        write_u64(w, model.len() as u64)?;
        w.write_all(model)?;
    }

    Ok(())
}

pub fn write_file<P: AsRef<Path>>(path: P, ckpt: &SlfcCheckpoint) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_slfc(&mut file, ckpt)?;
    file.flush()?;
    Ok(())
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_bits().to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_checkpoint() -> SlfcCheckpoint {
        SlfcCheckpoint {
            kind: BasisKind::Importance,
            step: 12_345,
            rows: 3,
            cols: 2,
            matrix: vec![1.5, -0.0, f32::MIN_POSITIVE, 3.25e7, -7.0, 0.1],
            phases: Some(vec![0.0, 3.1, 6.2]),
            model_state: Some(b"opaque weights".to_vec()),
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        write_slfc(&mut buf, &sample_checkpoint()).unwrap();

        assert_eq!(&buf[0..4], b"SLFC");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), SLFC_VERSION);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 0b11);
        assert_eq!(u64::from_le_bytes(buf[16..24].try_into().unwrap()), 12_345);
        assert_eq!(buf.len(), SLFC_HEADER_LEN + 6 * 4 + 3 * 4 + 8 + 14);
    }

    #[test]
    fn test_reload_is_bit_exact() {
        let ckpt = sample_checkpoint();
        let mut buf = Vec::new();
        write_slfc(&mut buf, &ckpt).unwrap();

        let back = parse_slfc_bytes(&buf).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back.matrix), bits(&ckpt.matrix));
        assert_eq!(bits(back.phases.as_deref().unwrap()), bits(ckpt.phases.as_deref().unwrap()));
        assert_eq!(back.model_state, ckpt.model_state);
        assert_eq!(back.kind, BasisKind::Importance);
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let mut buf = Vec::new();
        write_slfc(&mut buf, &sample_checkpoint()).unwrap();
        buf.truncate(buf.len() - 3);

        let err = parse_slfc_bytes(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_writer_rejects_inconsistent_shape() {
        let mut ckpt = sample_checkpoint();
        ckpt.matrix.pop();
        let err = write_slfc(&mut Vec::new(), &ckpt).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_final.slfc");
        let ckpt = SlfcCheckpoint {
            kind: BasisKind::Gaussian,
            phases: None,
            model_state: None,
            ..sample_checkpoint()
        };
        write_file(&path, &ckpt).unwrap();
        assert_eq!(read_file(&path).unwrap(), ckpt);
    }
}
