#![allow(dead_code)]

use std::path::Path;

use ndarray::{Array2, Array3, Axis};

use steady_core::io::binary::to_u16;
use steady_core::pipeline::config::RegistrationConfig;

/// Smooth synthetic scene of Gaussian blobs, defined at any real coordinate
/// so shifted copies have no fill-in at the borders.
pub struct BlobScene {
    blobs: Vec<(f32, f32, f32, f32)>,
    background: f32,
}

impl BlobScene {
    /// Deterministic scene covering an `ly x lx` frame (plus a margin).
    pub fn new(ly: usize, lx: usize, seed: u64) -> Self {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f32) / (1u64 << 31) as f32
        };
        let count = (ly * lx) / 24;
        let margin = 12.0;
        let blobs = (0..count)
            .map(|_| {
                let y = next() * (ly as f32 + 2.0 * margin) - margin;
                let x = next() * (lx as f32 + 2.0 * margin) - margin;
                let amp = 800.0 + 2400.0 * next();
                let sigma = 1.2 + 1.8 * next();
                (y, x, amp, sigma)
            })
            .collect();
        Self {
            blobs,
            background: 300.0,
        }
    }

    pub fn value(&self, y: f32, x: f32) -> f32 {
        let mut v = self.background;
        for &(by, bx, amp, sigma) in &self.blobs {
            let d2 = (y - by).powi(2) + (x - bx).powi(2);
            if d2 < 36.0 * sigma * sigma {
                v += amp * (-d2 / (2.0 * sigma * sigma)).exp();
            }
        }
        v
    }

    /// Frame whose content is displaced by `(dy, dx)` from the scene.
    pub fn render(&self, ly: usize, lx: usize, dy: f32, dx: f32) -> Array2<f32> {
        Array2::from_shape_fn((ly, lx), |(r, c)| self.value(r as f32 - dy, c as f32 - dx))
    }

    /// Frame whose content is displaced per pixel by `shift(y, x)`.
    pub fn render_field<F>(&self, ly: usize, lx: usize, shift: F) -> Array2<f32>
    where
        F: Fn(usize, usize) -> (f32, f32),
    {
        Array2::from_shape_fn((ly, lx), |(r, c)| {
            let (dy, dx) = shift(r, c);
            self.value(r as f32 - dy, c as f32 - dx)
        })
    }
}

/// Round to the values a `u16` stream can hold.
pub fn quantize(frame: &Array2<f32>) -> Array2<f32> {
    frame.mapv(|v| to_u16(v) as f32)
}

/// Write frames as a headerless little-endian `u16` movie.
pub fn write_movie(path: &Path, frames: &[Array2<f32>]) {
    let mut bytes = Vec::new();
    for frame in frames {
        for &v in frame.iter() {
            bytes.extend_from_slice(&to_u16(v).to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// Read a whole headerless `u16` movie back as `f32`.
pub fn read_movie(path: &Path, ly: usize, lx: usize) -> Array3<f32> {
    let bytes = std::fs::read(path).unwrap();
    let n = bytes.len() / (2 * ly * lx);
    let data: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32)
        .collect();
    Array3::from_shape_vec((n, ly, lx), data).unwrap()
}

/// Known per-frame content displacement for the rigid scenario:
/// frames cycle through rest, `(2, -1)`, rest, `(-1, 3)`.
pub fn cyclic_shift(t: usize) -> (f32, f32) {
    match t % 4 {
        1 => (2.0, -1.0),
        3 => (-1.0, 3.0),
        _ => (0.0, 0.0),
    }
}

pub fn rigid_movie(scene: &BlobScene, n: usize, ly: usize, lx: usize) -> Vec<Array2<f32>> {
    (0..n)
        .map(|t| {
            let (dy, dx) = cyclic_shift(t);
            scene.render(ly, lx, dy, dx)
        })
        .collect()
}

/// Rigid-only configuration rooted at `dir`.
pub fn session_config(dir: &Path, ly: usize, lx: usize) -> RegistrationConfig {
    RegistrationConfig {
        ly,
        lx,
        batch_size: 16,
        nonrigid: false,
        nimg_init: 60,
        save_path: dir.to_path_buf(),
        ..RegistrationConfig::default()
    }
}

/// Pearson correlation of two images.
pub fn correlation(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    let ma = a.mean().unwrap();
    let mb = b.mean().unwrap();
    let mut num = 0.0f64;
    let mut da = 0.0f64;
    let mut db = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = ((x - ma) as f64, (y - mb) as f64);
        num += x * y;
        da += x * x;
        db += y * y;
    }
    (num / (da.sqrt() * db.sqrt())) as f32
}

pub fn frame(stack: &Array3<f32>, t: usize) -> Array2<f32> {
    stack.index_axis(Axis(0), t).to_owned()
}

/// Write a version 1.0 `.npy` file holding a 1-D little-endian `i64` array.
pub fn write_npy_i64(path: &Path, values: &[i64]) {
    let mut header = format!(
        "{{'descr': '<i8', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');
    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}
