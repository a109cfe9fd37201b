//! Headerless little-endian `u16` frame streams.
//!
//! A stream is a flat sequence of frames, each `Ly * Lx` pixels in
//! row-major order. Streams are memory-mapped; batches are decoded to `f32`
//! on read and rounded/clamped back to `u16` on write.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use ndarray::{Array2, Array3, ArrayView3};

use crate::consts::BYTES_PER_PIXEL;
use crate::error::{Result, SteadyError};

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(m) => m,
            Mapping::ReadWrite(m) => m,
        }
    }
}

/// Memory-mapped binary movie of `nframes` frames of `ly x lx` pixels.
pub struct BinaryMovie {
    path: PathBuf,
    mapping: Mapping,
    ly: usize,
    lx: usize,
    nframes: usize,
}

impl std::fmt::Debug for BinaryMovie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryMovie")
            .field("path", &self.path)
            .field("ly", &self.ly)
            .field("lx", &self.lx)
            .field("nframes", &self.nframes)
            .field("writable", &matches!(self.mapping, Mapping::ReadWrite(_)))
            .finish()
    }
}

/// Number of whole frames stored in the file at `path`.
pub fn frames_in_file(path: &Path, ly: usize, lx: usize) -> Result<usize> {
    if !path.exists() {
        return Err(SteadyError::MissingStream(path.to_path_buf()));
    }
    let frame_bytes = (ly * lx * BYTES_PER_PIXEL) as u64;
    if frame_bytes == 0 {
        return Err(SteadyError::InvalidDimensions { width: lx, height: ly });
    }
    let len = std::fs::metadata(path)?.len();
    Ok((len / frame_bytes) as usize)
}

impl BinaryMovie {
    /// Map an existing stream read-only.
    pub fn open(path: &Path, ly: usize, lx: usize, nframes: usize) -> Result<Self> {
        let file = open_existing(path, false)?;
        check_length(&file, path, ly, lx, nframes)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            mapping: Mapping::ReadOnly(mmap),
            ly,
            lx,
            nframes,
        })
    }

    /// Map an existing stream for in-place rewriting.
    pub fn open_mut(path: &Path, ly: usize, lx: usize, nframes: usize) -> Result<Self> {
        let file = open_existing(path, true)?;
        check_length(&file, path, ly, lx, nframes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            mapping: Mapping::ReadWrite(mmap),
            ly,
            lx,
            nframes,
        })
    }

    /// Open a writable stream of at least `nframes` frames, creating or
    /// growing the file as needed. Frames past `nframes` in an existing file
    /// are left untouched.
    pub fn create(path: &Path, ly: usize, lx: usize, nframes: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let needed = (nframes * ly * lx * BYTES_PER_PIXEL) as u64;
        if file.metadata()?.len() < needed {
            file.set_len(needed)?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            mapping: Mapping::ReadWrite(mmap),
            ly,
            lx,
            nframes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ly(&self) -> usize {
        self.ly
    }

    pub fn lx(&self) -> usize {
        self.lx
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }

    fn frame_bytes(&self) -> usize {
        self.ly * self.lx * BYTES_PER_PIXEL
    }

    fn check_range(&self, start: usize, count: usize) -> Result<()> {
        if start + count > self.nframes {
            return Err(SteadyError::FrameRangeOutOfBounds {
                start,
                end: start + count,
                total: self.nframes,
            });
        }
        Ok(())
    }

    /// Decode `count` frames starting at `start` into a `(count, ly, lx)` stack.
    pub fn read_frames(&self, start: usize, count: usize) -> Result<Array3<f32>> {
        self.check_range(start, count)?;
        let fb = self.frame_bytes();
        let bytes = &self.mapping.bytes()[start * fb..(start + count) * fb];
        let mut raw = vec![0u16; count * self.ly * self.lx];
        LittleEndian::read_u16_into(bytes, &mut raw);
        let data = raw.into_iter().map(f32::from).collect();
        Array3::from_shape_vec((count, self.ly, self.lx), data).map_err(|_| SteadyError::ShapeMismatch {
            expected: vec![count, self.ly, self.lx],
            actual: vec![bytes.len() / BYTES_PER_PIXEL],
        })
    }

    pub fn read_frame(&self, index: usize) -> Result<Array2<f32>> {
        self.check_range(index, 1)?;
        let fb = self.frame_bytes();
        let bytes = &self.mapping.bytes()[index * fb..(index + 1) * fb];
        let mut raw = vec![0u16; self.ly * self.lx];
        LittleEndian::read_u16_into(bytes, &mut raw);
        let data = raw.into_iter().map(f32::from).collect();
        Array2::from_shape_vec((self.ly, self.lx), data).map_err(|_| SteadyError::ShapeMismatch {
            expected: vec![self.ly, self.lx],
            actual: vec![bytes.len() / BYTES_PER_PIXEL],
        })
    }

    /// Encode `frames` back into the stream starting at frame `start`.
    pub fn write_frames(&mut self, start: usize, frames: &ArrayView3<f32>) -> Result<()> {
        let (count, h, w) = frames.dim();
        if (h, w) != (self.ly, self.lx) {
            return Err(SteadyError::ShapeMismatch {
                expected: vec![self.ly, self.lx],
                actual: vec![h, w],
            });
        }
        self.check_range(start, count)?;
        let fb = self.frame_bytes();
        let mmap = match &mut self.mapping {
            Mapping::ReadWrite(m) => m,
            Mapping::ReadOnly(_) => {
                return Err(SteadyError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("{} is mapped read-only", self.path.display()),
                )))
            }
        };
        let encoded: Vec<u16> = frames.iter().map(|&v| to_u16(v)).collect();
        LittleEndian::write_u16_into(&encoded, &mut mmap[start * fb..(start + count) * fb]);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        if let Mapping::ReadWrite(m) = &self.mapping {
            m.flush()?;
        }
        Ok(())
    }
}

/// Round and clamp a pixel value into the `u16` range.
pub fn to_u16(v: f32) -> u16 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

fn open_existing(path: &Path, writable: bool) -> Result<File> {
    if !path.exists() {
        return Err(SteadyError::MissingStream(path.to_path_buf()));
    }
    Ok(OpenOptions::new().read(true).write(writable).open(path)?)
}

fn check_length(file: &File, path: &Path, ly: usize, lx: usize, nframes: usize) -> Result<()> {
    let expected = (nframes * ly * lx * BYTES_PER_PIXEL) as u64;
    let actual = file.metadata()?.len();
    if actual < expected {
        return Err(SteadyError::TruncatedStream {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Where a channel's frames are read from and where the corrected frames go.
///
/// Registering in place reads and writes the same stream; registering from a
/// preserved raw stream reads the raw file and writes a separate one.
#[derive(Debug)]
pub struct FrameStream {
    source: BinaryMovie,
    sink: Option<BinaryMovie>,
}

impl FrameStream {
    pub fn in_place(movie: BinaryMovie) -> Self {
        Self {
            source: movie,
            sink: None,
        }
    }

    pub fn with_sink(source: BinaryMovie, sink: BinaryMovie) -> Result<Self> {
        if (source.ly, source.lx) != (sink.ly, sink.lx) || sink.nframes < source.nframes {
            return Err(SteadyError::ShapeMismatch {
                expected: vec![source.nframes, source.ly, source.lx],
                actual: vec![sink.nframes, sink.ly, sink.lx],
            });
        }
        Ok(Self {
            source,
            sink: Some(sink),
        })
    }

    pub fn source(&self) -> &BinaryMovie {
        &self.source
    }

    pub fn nframes(&self) -> usize {
        self.source.nframes
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.source.ly, self.source.lx)
    }

    pub fn read(&self, start: usize, count: usize) -> Result<Array3<f32>> {
        self.source.read_frames(start, count)
    }

    pub fn write(&mut self, start: usize, frames: &ArrayView3<f32>) -> Result<()> {
        match &mut self.sink {
            Some(sink) => sink.write_frames(start, frames),
            None => self.source.write_frames(start, frames),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match &self.sink {
            Some(sink) => sink.flush(),
            None => self.source.flush(),
        }
    }
}
