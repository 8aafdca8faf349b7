//! GPU texture creation/teardown for the Cache Directory.
//!
//! The specification is explicit that window/GPU-context bring-up is out of
//! scope, but *using* an already-created `wgpu::Device`/`wgpu::Queue` to
//! build the resident mip chain is squarely the Cache Directory's job (see
//! `update_texture_object`). The teacher's own (if currently unwired)
//! `renderer.rs` shows the idiom this module generalizes: a `TextureDescriptor`
//! with an explicit `mip_level_count`, one `queue.write_texture` call per
//! level, and a `Sampler` with mipmapped-linear filtering and clamp-to-edge
//! addressing. `egui`/`eframe` (the teacher's actual UI dependency) has no
//! public API for hand-rolled per-level mip textures, so that dependency is
//! not reused here — see DESIGN.md.
//!
//! The backend is expressed as a trait so the Cache Directory's bookkeeping
//! (what to do with `GpuUploadFailed`, when to destroy-and-recreate) can be
//! unit-tested without a real GPU adapter.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque handle exposed to the renderer via
/// `CachedTextureHandle::get_gpu_texture`. Carries no meaning beyond
/// identity/equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// One mip level's pixels, ordered the same way `CachedTexture::mips` is
/// (smallest first); `create_texture` is responsible for translating that
/// into the graphics API's own mip-index convention.
pub struct MipUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// A live GPU texture owned by exactly one `CachedTexture`.
pub trait GpuTextureHandle: Send + Sync + Any {
    fn id(&self) -> TextureId;
    fn as_any(&self) -> &dyn Any;
}

/// Creates/destroys GPU textures on behalf of the Cache Directory. The
/// render thread owns the one implementation in use; workers never see this
/// trait.
pub trait GpuTextureBackend: Send + Sync {
    /// Build a brand-new texture uploading exactly `mips` (smallest-first,
    /// non-empty) as the GPU's mip chain, mipmapped-linear filtered and
    /// edge-clamped. The spec requires destroy-then-recreate on every
    /// change, so there is no `update`/`append` operation — only `create`.
    fn create_texture(&self, mips: &[MipUpload<'_>]) -> Box<dyn GpuTextureHandle>;
}

/// `wgpu`-backed implementation.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    sampler: wgpu::Sampler,
    next_id: AtomicU64,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texture-streamer mip sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            sampler,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

pub struct WgpuTextureHandle {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    id: TextureId,
    resident_mips: u32,
}

impl WgpuTextureHandle {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn resident_mip_count(&self) -> u32 {
        self.resident_mips
    }
}

impl GpuTextureHandle for WgpuTextureHandle {
    fn id(&self) -> TextureId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl GpuTextureBackend for WgpuBackend {
    fn create_texture(&self, mips: &[MipUpload<'_>]) -> Box<dyn GpuTextureHandle> {
        assert!(!mips.is_empty(), "create_texture requires at least one resident mip");

        let mip_level_count = mips.len() as u32;
        let (full_w, full_h) = {
            let largest = mips.last().expect("non-empty");
            (largest.width, largest.height)
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture-streamer cached texture"),
            size: wgpu::Extent3d {
                width: full_w,
                height: full_h,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // `mips` is smallest-first; the graphics API always wants mip 0 to
        // be the largest. Level i in our array maps to wgpu mip
        // (mips.len() - 1 - i), exactly mirroring the original
        // `to_opengl_mip_index`.
        for (i, mip) in mips.iter().enumerate() {
            let gpu_mip_level = (mips.len() - 1 - i) as u32;
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: gpu_mip_level,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                mip.pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * mip.width),
                    rows_per_image: Some(mip.height),
                },
                wgpu::Extent3d {
                    width: mip.width,
                    height: mip.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("texture-streamer cached texture view"),
            base_mip_level: 0,
            mip_level_count: Some(mip_level_count),
            ..Default::default()
        });

        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed));

        Box::new(WgpuTextureHandle {
            texture,
            view,
            id,
            resident_mips: mip_level_count,
        })
    }
}

/// An in-memory test double that tracks create/destroy counts without
/// touching a real GPU. Used by `cache`/`streamer` unit tests, which need to
/// verify lifecycle invariants (at most one texture per `CachedTexture`,
/// destroy-then-recreate semantics) on machines with no GPU adapter
/// available.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct NullBackend {
        next_id: AtomicU64,
        pub live_count: AtomicUsize,
        pub created_total: AtomicUsize,
    }

    pub struct NullHandle {
        id: TextureId,
        pub mip_count: usize,
        live_count: Arc<AtomicUsize>,
    }

    impl GpuTextureHandle for NullHandle {
        fn id(&self) -> TextureId {
            self.id
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl Drop for NullHandle {
        fn drop(&mut self) {
            self.live_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub struct NullBackendHandleFactory {
        next_id: Arc<AtomicU64>,
        live_count: Arc<AtomicUsize>,
        pub created_total: Arc<AtomicUsize>,
    }

    impl NullBackendHandleFactory {
        pub fn new() -> Self {
            Self {
                next_id: Arc::new(AtomicU64::new(1)),
                live_count: Arc::new(AtomicUsize::new(0)),
                created_total: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn live_count(&self) -> usize {
            self.live_count.load(Ordering::SeqCst)
        }

        pub fn created_total(&self) -> usize {
            self.created_total.load(Ordering::SeqCst)
        }
    }

    impl GpuTextureBackend for NullBackendHandleFactory {
        fn create_texture(&self, mips: &[MipUpload<'_>]) -> Box<dyn GpuTextureHandle> {
            assert!(!mips.is_empty());
            let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed));
            self.live_count.fetch_add(1, Ordering::SeqCst);
            self.created_total.fetch_add(1, Ordering::SeqCst);
            Box::new(NullHandle {
                id,
                mip_count: mips.len(),
                live_count: self.live_count.clone(),
            })
        }
    }
}
