//! Precomputed 2-D analysis windows.
//!
//! Windows are separable: a 1-D taper is computed per axis and the per-pixel
//! coefficient is the product of the row and column factors. Coefficients are
//! cached globally per (kind, width, height) since they depend only on the
//! analysis-window dimensions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, RwLock};

/// Window selection controlling spectral leakage characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Rectangular,
    Hann,
}

impl WindowKind {
    /// 1-D coefficients for one axis of length `len`.
    ///
    /// The Hann taper is `0.5 * (1 + cos(2πx))` with `x = (i - len/2) / len`
    /// normalized to `[-0.5, 0.5)`, so the center sample is exactly 1.0 and the
    /// edge sample is exactly 0.0.
    pub(crate) fn axis_coefficients(self, len: usize) -> Vec<f32> {
        match self {
            WindowKind::Rectangular => vec![1.0; len],
            WindowKind::Hann => {
                let half = (len / 2) as f32;
                (0..len)
                    .map(|i| {
                        let x = (i as f32 - half) / len as f32;
                        let phase = core::f32::consts::TAU * x;
                        0.5 * (1.0 + phase.cos())
                    })
                    .collect()
            }
        }
    }

    /// Row-major 2-D coefficients, the separable product of the axis tapers.
    pub fn coefficients(self, width: usize, height: usize) -> Vec<f32> {
        let wx = self.axis_coefficients(width);
        let wy = self.axis_coefficients(height);
        let mut out = Vec::with_capacity(width * height);
        for row in &wy {
            for col in &wx {
                out.push(row * col);
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct WindowKey {
    kind: WindowKind,
    width: usize,
    height: usize,
}

struct WindowCache {
    entries: RwLock<FxHashMap<WindowKey, Arc<[f32]>>>,
}

impl WindowCache {
    fn global() -> &'static WindowCache {
        static INSTANCE: OnceLock<WindowCache> = OnceLock::new();
        INSTANCE.get_or_init(|| WindowCache {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    fn get(&self, kind: WindowKind, width: usize, height: usize) -> Arc<[f32]> {
        if width == 0 || height == 0 {
            return Arc::from([]);
        }

        let key = WindowKey {
            kind,
            width,
            height,
        };
        if let Some(existing) = self.entries.read().unwrap().get(&key) {
            return Arc::clone(existing);
        }

        let mut write = self.entries.write().unwrap();
        Arc::clone(
            write
                .entry(key)
                .or_insert_with(|| Arc::from(kind.coefficients(width, height))),
        )
    }
}

/// Fetch (or build and cache) the 2-D window for the given dimensions.
pub fn window_coefficients(kind: WindowKind, width: usize, height: usize) -> Arc<[f32]> {
    WindowCache::global().get(kind, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_center_is_unity_and_edge_is_zero() {
        for len in [16usize, 64, 128] {
            let axis = WindowKind::Hann.axis_coefficients(len);
            assert!((axis[len / 2] - 1.0).abs() < 1e-6, "center at len={len}");
            assert!(axis[0].abs() < 1e-6, "edge at len={len}");
        }
    }

    #[test]
    fn hann_is_mirror_symmetric_about_center() {
        let len = 64;
        let axis = WindowKind::Hann.axis_coefficients(len);
        for i in 1..len {
            let mirrored = axis[len - i];
            assert!(
                (axis[i] - mirrored).abs() < 1e-6,
                "asymmetry at {i}: {} vs {mirrored}",
                axis[i]
            );
        }
    }

    #[test]
    fn two_d_window_is_symmetric_both_axes() {
        let (w, h) = (32, 24);
        let win = WindowKind::Hann.coefficients(w, h);
        for y in 1..h {
            for x in 1..w {
                let a = win[y * w + x];
                let horiz = win[y * w + (w - x)];
                let vert = win[(h - y) * w + x];
                assert!((a - horiz).abs() < 1e-6);
                assert!((a - vert).abs() < 1e-6);
            }
        }
        assert!((win[(h / 2) * w + w / 2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cache_returns_shared_instances() {
        let a = window_coefficients(WindowKind::Hann, 48, 48);
        let b = window_coefficients(WindowKind::Hann, 48, 48);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 48 * 48);
    }

    #[test]
    fn rectangular_window_is_flat() {
        let win = WindowKind::Rectangular.coefficients(8, 4);
        assert!(win.iter().all(|&v| v == 1.0));
    }
}
