//! The Cache Directory: an ordered map from image path to per-image cache
//! state, plus the handful of operations that install/evict resident
//! mipmaps and keep the GPU texture in sync with them.
//!
//! Grounded on the original `Texture_Streamer`'s `textures` member
//! (`sorted_vector<Cached_Texture>`, binary-search ordered by filepath) and
//! its `add_texture`/`remove_texture`/`evict_mip`/`update_texture_object`/
//! `cache_mips` methods (`texture_streamer.hpp`). `BTreeMap<PathBuf, _>` is
//! the direct Rust analogue of a sorted vector keyed by filepath: genuine
//! O(log n) lookup, no manual binary search, no separate sort step.
//!
//! Every method here runs on the render thread only; see
//! `crate::streamer::StreamerController` for the per-frame orchestration
//! that calls into this module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::StreamerError;
use crate::gpu::{GpuTextureBackend, GpuTextureHandle, MipUpload};
use crate::mipmap::{mip_memory_size, mipmap_sizes_px, MipImage};

/// One level of a cached image's pyramid. `size_px` never changes after
/// `add`; `image` is `Some` iff this level is currently resident in host
/// memory.
pub struct MipmapLevel {
    pub size_px: (u32, u32),
    pub image: Option<Vec<u8>>,
    pub priority: f64,
}

impl MipmapLevel {
    pub fn is_resident(&self) -> bool {
        self.image.is_some()
    }
}

/// Per-image cache record. See the Data Model for the invariants this type
/// must maintain; they are enforced by `CacheDirectory`'s methods, never by
/// direct field mutation from outside this module.
pub struct CachedTexture {
    pub filepath: PathBuf,
    /// Smallest first, largest (full size) last.
    pub mips: Vec<MipmapLevel>,
    pub cached_mips: usize,
    pub desired_cached_mips: usize,
    pub tex: Option<Box<dyn GpuTextureHandle>>,
    pub order_priority: f64,
    pub was_queried: bool,
    pub job_in_flight: bool,
}

impl CachedTexture {
    pub fn get_memory_size(&self) -> u64 {
        self.mips
            .iter()
            .filter(|level| level.is_resident())
            .map(|level| mip_memory_size(level.size_px.0, level.size_px.1))
            .sum()
    }

    /// `min(S_last_resident.w/onscreen.w, S_last_resident.h/onscreen.h)`,
    /// or 0 if nothing is resident yet.
    pub fn get_displayable_pixel_density(&self, onscreen_size_px: (u32, u32)) -> f64 {
        if self.cached_mips == 0 {
            return 0.0;
        }
        let (w, h) = self.mips[self.cached_mips - 1].size_px;
        let ratio_w = f64::from(w) / f64::from(onscreen_size_px.0.max(1));
        let ratio_h = f64::from(h) / f64::from(onscreen_size_px.1.max(1));
        ratio_w.min(ratio_h)
    }

    pub fn all_mips_displayable(&self) -> bool {
        self.cached_mips == self.mips.len()
    }
}

/// The ordered cache of all known images, parameterized over the GPU
/// backend so unit tests can run against `gpu::test_support`'s null backend
/// instead of a real `wgpu::Device`.
pub struct CacheDirectory<B: GpuTextureBackend> {
    map: BTreeMap<PathBuf, CachedTexture>,
    cache_memory_used: u64,
    cache_memory_budget: u64,
    backend: B,
}

impl<B: GpuTextureBackend> CacheDirectory<B> {
    pub fn new(cache_memory_budget: u64, backend: B) -> Self {
        Self {
            map: BTreeMap::new(),
            cache_memory_used: 0,
            cache_memory_budget,
            backend,
        }
    }

    pub fn cache_memory_used(&self) -> u64 {
        self.cache_memory_used
    }

    pub fn cache_memory_budget(&self) -> u64 {
        self.cache_memory_budget
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn find(&self, path: &Path) -> Option<&CachedTexture> {
        self.map.get(path)
    }

    pub fn find_mut(&mut self, path: &Path) -> Option<&mut CachedTexture> {
        self.map.get_mut(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &CachedTexture)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut CachedTexture)> {
        self.map.iter_mut()
    }

    /// Insert a new, data-less `CachedTexture` for `path` whose pyramid
    /// descriptor is derived from `full_size_px`.
    pub fn add(&mut self, path: PathBuf, full_size_px: (u32, u32)) -> Result<&mut CachedTexture, StreamerError> {
        if self.map.contains_key(&path) {
            return Err(StreamerError::AlreadyPresent(path));
        }

        let mips = mipmap_sizes_px(full_size_px)
            .into_iter()
            .map(|size_px| MipmapLevel {
                size_px,
                image: None,
                priority: f64::INFINITY,
            })
            .collect();

        let texture = CachedTexture {
            filepath: path.clone(),
            mips,
            cached_mips: 0,
            desired_cached_mips: 0,
            tex: None,
            order_priority: f64::INFINITY,
            was_queried: false,
            job_in_flight: false,
        };

        self.map.insert(path.clone(), texture);
        Ok(self.map.get_mut(&path).expect("just inserted"))
    }

    /// Evict every resident mip, release the GPU handle, and erase the
    /// entry. Must only be called with no job in flight for `path`.
    pub fn remove(&mut self, path: &Path) {
        if let Some(mut texture) = self.map.remove(path) {
            let freed: u64 = texture
                .mips
                .iter_mut()
                .filter_map(|level| {
                    level
                        .image
                        .take()
                        .map(|_| mip_memory_size(level.size_px.0, level.size_px.1))
                })
                .sum();
            self.cache_memory_used = self.cache_memory_used.saturating_sub(freed);
            texture.tex = None;
        }
    }

    /// Release only the host image at level `k`; does not re-upload. Callers
    /// that shrink a resident prefix must follow up with
    /// `update_texture_object`.
    pub fn evict_mip(&mut self, path: &Path, level: usize) {
        let freed = match self.map.get_mut(path) {
            Some(texture) => {
                let mip = &mut texture.mips[level];
                mip.image
                    .take()
                    .map(|_| mip_memory_size(mip.size_px.0, mip.size_px.1))
                    .unwrap_or(0)
            }
            None => 0,
        };
        self.cache_memory_used = self.cache_memory_used.saturating_sub(freed);
    }

    /// Shrink the resident prefix down to `new_cached_mips`, evicting every
    /// level above it and rebuilding the GPU texture. Direct implementation
    /// of Step C's `desired_cached_mips < cached_mips` branch.
    pub fn shrink_resident_prefix(&mut self, path: &Path, new_cached_mips: usize) {
        let cached_mips = match self.map.get(path) {
            Some(texture) => texture.cached_mips,
            None => return,
        };

        for level in new_cached_mips..cached_mips {
            self.evict_mip(path, level);
        }

        if let Some(texture) = self.map.get_mut(path) {
            texture.cached_mips = new_cached_mips;
        }

        self.update_texture_object(path);
    }

    /// Tear down the current GPU handle and, if `cached_mips > 0`, build a
    /// fresh one uploading exactly the resident prefix.
    pub fn update_texture_object(&mut self, path: &Path) {
        let cached_mips = match self.map.get(path) {
            Some(texture) => texture.cached_mips,
            None => return,
        };

        let new_tex = if cached_mips > 0 {
            let texture = self.map.get(path).expect("checked above");
            let uploads: Vec<MipUpload<'_>> = texture.mips[0..cached_mips]
                .iter()
                .map(|level| MipUpload {
                    width: level.size_px.0,
                    height: level.size_px.1,
                    pixels: level
                        .image
                        .as_ref()
                        .expect("resident prefix invariant violated: hole in [0, cached_mips)"),
                })
                .collect();
            Some(self.backend.create_texture(&uploads))
        } else {
            None
        };

        if let Some(texture) = self.map.get_mut(path) {
            texture.tex = new_tex;
        }
    }

    /// Install a freshly-decoded pyramid. Clears whatever was previously
    /// resident, then installs the first
    /// `min(desired_cached_mips, new_mip_images.len())` entries as the new
    /// resident prefix. On a level-count or per-level size mismatch against
    /// the descriptor captured at `add` time, the descriptor is reset from
    /// `new_mip_images` and `SizeMismatch` is returned so the controller can
    /// schedule a fresh reconciliation rather than install stale data.
    pub fn cache_mips(
        &mut self,
        path: &Path,
        new_mip_images: smallvec::SmallVec<[MipImage; 16]>,
    ) -> Result<(), StreamerError> {
        let (cached_mips, desired_cached_mips) = match self.map.get(path) {
            Some(texture) => (texture.cached_mips, texture.desired_cached_mips),
            None => return Ok(()),
        };

        for level in 0..cached_mips {
            self.evict_mip(path, level);
        }

        let texture = self
            .map
            .get_mut(path)
            .expect("checked present above, render thread is the sole mutator");

        let descriptor_matches = texture.mips.len() == new_mip_images.len()
            && texture
                .mips
                .iter()
                .zip(new_mip_images.iter())
                .all(|(level, mip)| level.size_px == mip.size_px());

        if !descriptor_matches {
            let expected = texture.mips.last().map(|l| l.size_px).unwrap_or((0, 0));
            let actual = new_mip_images.last().map(|m| m.size_px()).unwrap_or((0, 0));
            texture.mips = new_mip_images
                .iter()
                .map(|mip| MipmapLevel {
                    size_px: mip.size_px(),
                    image: None,
                    priority: f64::INFINITY,
                })
                .collect();
            texture.cached_mips = 0;
            texture.desired_cached_mips = 0;
            texture.tex = None;
            return Err(StreamerError::SizeMismatch {
                path: path.to_path_buf(),
                level: texture.mips.len().saturating_sub(1),
                expected,
                actual,
            });
        }

        let install_count = desired_cached_mips.min(new_mip_images.len());
        let mut installed_bytes = 0u64;
        for (level, mip) in new_mip_images.into_iter().enumerate().take(install_count) {
            installed_bytes += mip.memory_size();
            texture.mips[level].image = Some(mip.pixels);
        }
        texture.cached_mips = install_count;
        self.cache_memory_used += installed_bytes;

        self.update_texture_object(path);
        Ok(())
    }
}
