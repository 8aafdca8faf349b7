//! The Streamer Controller: the per-frame state machine that ties the
//! Blocking Job Queue, Worker Pool, Mipmap Pyramid Generator and Cache
//! Directory together.
//!
//! Grounded on the original `Texture_Streamer::queries_begin` / `query` /
//! `queries_end` (`texture_streamer.hpp`) — Steps A through F below are a
//! line-for-line port of that method's control flow, not a reinterpretation
//! of it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::cache::{CacheDirectory, CachedTexture};
use crate::decoder::Decoder;
use crate::gpu::{GpuTextureBackend, TextureId};
use crate::mipmap::{generate_mipmaps, mip_memory_size, MipImage, ResampleFilter};
use crate::queue::BlockingQueue;
use crate::worker_pool::WorkerPool;

/// What a worker reports back for one decode job. An empty `mip_images` is
/// the sentinel for "decode failed"; see 4.5's failure semantics.
pub struct JobResult {
    pub filepath: PathBuf,
    pub mip_images: SmallVec<[MipImage; 16]>,
}

fn process_job(decoder: &dyn Decoder, path: PathBuf, filter: ResampleFilter) -> JobResult {
    match decoder.decode(&path) {
        Ok(image) => JobResult {
            filepath: path,
            mip_images: generate_mipmaps(image, filter),
        },
        Err(error) => {
            warn!(path = %path.display(), %error, "decode failed; reporting empty mip list");
            JobResult {
                filepath: path,
                mip_images: SmallVec::new(),
            }
        }
    }
}

/// The external, read-only view of a `CachedTexture` handed to the
/// renderer. Keeps cache-internal bookkeeping fields (`cached_mips`,
/// `job_in_flight`, ...) out of the public surface the renderer sees.
pub struct CachedTextureHandle<'a> {
    texture: &'a CachedTexture,
}

impl<'a> CachedTextureHandle<'a> {
    pub fn get_gpu_texture(&self) -> Option<TextureId> {
        self.texture.tex.as_ref().map(|handle| handle.id())
    }

    pub fn get_displayable_pixel_density(&self, onscreen_size_px: (u32, u32)) -> f64 {
        self.texture.get_displayable_pixel_density(onscreen_size_px)
    }

    pub fn all_mips_displayable(&self) -> bool {
        self.texture.all_mips_displayable()
    }
}

/// `min(size_px / needed_size_px)` across axes, biased by `order_priority`.
/// Lower is more urgent. See 4.5.2 for the full rationale.
pub fn calc_priority(size_px: (u32, u32), needed_size_px: (u32, u32), order_priority: f64) -> f64 {
    let ratio_w = f64::from(size_px.0) / f64::from(needed_size_px.0.max(1));
    let ratio_h = f64::from(size_px.1) / f64::from(needed_size_px.1.max(1));
    let density_ratio = ratio_w.min(ratio_h);
    let order_bias = order_priority.clamp(0.0, 1.0);
    let bias = 1.0 + 0.25 * order_bias; // lerp(1, 1.25, order_priority)
    density_ratio * bias
}

/// Owns the cache, the job/result queues (via the worker pool) and the
/// per-frame upload budget. One long-lived instance per render loop, passed
/// explicitly — never hidden process-wide state.
pub struct StreamerController<B: GpuTextureBackend> {
    cache: CacheDirectory<B>,
    pool: WorkerPool<PathBuf, JobResult>,
    per_frame_upload_budget: Duration,
}

impl<B: GpuTextureBackend> StreamerController<B> {
    pub fn new<D: Decoder>(
        cache_memory_budget: u64,
        per_frame_upload_budget: Duration,
        worker_count: usize,
        backend: B,
        decoder: D,
    ) -> Self {
        Self::with_resample_filter(
            cache_memory_budget,
            per_frame_upload_budget,
            worker_count,
            backend,
            decoder,
            ResampleFilter::Bilinear,
        )
    }

    pub fn with_resample_filter<D: Decoder>(
        cache_memory_budget: u64,
        per_frame_upload_budget: Duration,
        worker_count: usize,
        backend: B,
        decoder: D,
        resample_filter: ResampleFilter,
    ) -> Self {
        let jobs = Arc::new(BlockingQueue::new());
        let results = Arc::new(BlockingQueue::new());
        let decoder = Arc::new(decoder);

        let pool = WorkerPool::new(worker_count, jobs, results, move |path: PathBuf| {
            process_job(decoder.as_ref(), path, resample_filter)
        });

        Self {
            cache: CacheDirectory::new(cache_memory_budget, backend),
            pool,
            per_frame_upload_budget,
        }
    }

    /// Construct from a loaded `StreamerConfig` rather than spelling out
    /// each option by hand.
    pub fn from_config<D: Decoder>(config: &crate::config::StreamerConfig, backend: B, decoder: D) -> Self {
        Self::with_resample_filter(
            config.cache_memory_budget,
            config.per_frame_upload_budget,
            config.worker_count,
            backend,
            decoder,
            config.resample_filter,
        )
    }

    pub fn cache(&self) -> &CacheDirectory<B> {
        &self.cache
    }

    /// Reset per-frame accumulators: every texture's `order_priority` and
    /// every mip's `priority` go back to +inf, and `was_queried` back to
    /// false. This reset-then-minimize pattern is what lets overlapping
    /// queries for the same texture combine by taking the minimum.
    pub fn queries_begin(&mut self) {
        for (_, texture) in self.cache.iter_mut() {
            texture.order_priority = f64::INFINITY;
            texture.was_queried = false;
            for level in texture.mips.iter_mut() {
                level.priority = f64::INFINITY;
            }
        }
    }

    /// Called once per visible tile.
    pub fn query(
        &mut self,
        path: &Path,
        onscreen_size_px: (u32, u32),
        full_size_px: (u32, u32),
        order_priority: f64,
    ) -> CachedTextureHandle<'_> {
        if self.cache.find(path).is_none() {
            self.cache
                .add(path.to_path_buf(), full_size_px)
                .expect("just confirmed absent");
        }

        {
            let texture = self.cache.find_mut(path).expect("just ensured present");
            texture.was_queried = true;
            texture.order_priority = texture.order_priority.min(order_priority);
            for level in texture.mips.iter_mut() {
                let priority = calc_priority(level.size_px, onscreen_size_px, order_priority);
                level.priority = level.priority.min(priority);
            }
        }

        CachedTextureHandle {
            texture: self.cache.find(path).expect("present"),
        }
    }

    /// Runs Steps A-F exactly as specified in 4.5.3.
    pub fn queries_end(&mut self) {
        struct FlatEntry {
            path: PathBuf,
            level: usize,
            size_bytes: u64,
            priority: f64,
        }

        // Step A: flatten and sort.
        let mut entries: Vec<FlatEntry> = Vec::new();
        for (path, texture) in self.cache.iter() {
            for (level, mip) in texture.mips.iter().enumerate() {
                entries.push(FlatEntry {
                    path: path.clone(),
                    level,
                    size_bytes: mip_memory_size(mip.size_px.0, mip.size_px.1),
                    priority: mip.priority,
                });
            }
        }
        entries.sort_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Step B: desired-set selection under budget.
        for (_, texture) in self.cache.iter_mut() {
            texture.desired_cached_mips = 0;
        }
        let budget = self.cache.cache_memory_budget();
        let mut cumulative = 0u64;
        for entry in &entries {
            if entry.priority.is_infinite() {
                // +inf means "not wanted" (§3); an unqueried texture's mips
                // are reset here in queries_begin and must never enter the
                // desired set just because the budget has headroom.
                continue;
            }
            let next_cumulative = cumulative + entry.size_bytes;
            if next_cumulative > budget {
                continue;
            }
            cumulative = next_cumulative;
            if let Some(texture) = self.cache.find_mut(&entry.path) {
                texture.desired_cached_mips = texture.desired_cached_mips.max(entry.level + 1);
            }
        }

        // Step C: reconcile per-texture state.
        let mut cancel_set: HashSet<PathBuf> = HashSet::new();
        let mut pending_removals: Vec<PathBuf> = Vec::new();
        let mut jobs_to_push: Vec<PathBuf> = Vec::new();
        let mut shrinks: Vec<(PathBuf, usize)> = Vec::new();

        let paths: Vec<PathBuf> = self.cache.paths().cloned().collect();
        for path in &paths {
            let texture = self.cache.find_mut(path).expect("just listed");

            if texture.desired_cached_mips == 0 && !texture.was_queried {
                pending_removals.push(path.clone());
                if texture.job_in_flight {
                    cancel_set.insert(path.clone());
                }
            } else if texture.desired_cached_mips == texture.cached_mips {
                if texture.job_in_flight {
                    cancel_set.insert(path.clone());
                }
            } else if texture.desired_cached_mips > texture.cached_mips {
                if !texture.job_in_flight {
                    texture.job_in_flight = true;
                    jobs_to_push.push(path.clone());
                }
            } else {
                if texture.job_in_flight {
                    cancel_set.insert(path.clone());
                }
                shrinks.push((path.clone(), texture.desired_cached_mips));
            }
        }

        for (path, new_cached_mips) in shrinks {
            self.cache.shrink_resident_prefix(&path, new_cached_mips);
        }

        // Step D: apply cancellations and reorder.
        let mut actually_cancelled: Vec<PathBuf> = Vec::new();
        self.pool.jobs().cancel(|path: &PathBuf| {
            let matched = cancel_set.contains(path);
            if matched {
                actually_cancelled.push(path.clone());
            }
            matched
        });
        for path in &actually_cancelled {
            if let Some(texture) = self.cache.find_mut(path) {
                texture.job_in_flight = false;
            }
        }

        for path in jobs_to_push {
            trace!(path = %path.display(), "pushing decode job");
            self.pool.jobs().push(path);
        }

        let cache_ref = &self.cache;
        self.pool.jobs().sort(|a, b| {
            let pa = cache_ref.find(a).map(|t| t.order_priority).unwrap_or(f64::INFINITY);
            let pb = cache_ref.find(b).map(|t| t.order_priority).unwrap_or(f64::INFINITY);
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });

        // Step E: drain results under a time budget, checked after each
        // result (the stricter of the two readings the source supports).
        let drain_start = Instant::now();
        loop {
            let result = match self.pool.results().try_pop() {
                Some(result) => result,
                None => break,
            };

            if self.cache.find(&result.filepath).is_none() {
                // Texture was removed while the job was in flight; drop.
            } else if result.mip_images.is_empty() {
                if let Some(texture) = self.cache.find_mut(&result.filepath) {
                    texture.job_in_flight = false;
                }
            } else {
                if let Some(texture) = self.cache.find_mut(&result.filepath) {
                    texture.job_in_flight = false;
                }
                // A SizeMismatch here resets the descriptor and is left for
                // a later frame's reconciliation to re-request; nothing
                // further to do with it in this loop.
                let _ = self.cache.cache_mips(&result.filepath, result.mip_images);
            }

            if drain_start.elapsed() >= self.per_frame_upload_budget {
                debug!("per-frame upload budget exceeded; deferring remaining results");
                break;
            }
        }

        // Step F: finalize removals.
        for path in pending_removals {
            let still_in_flight = self
                .cache
                .find(&path)
                .map(|texture| texture.job_in_flight)
                .unwrap_or(false);
            if !still_in_flight {
                self.cache.remove(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedImage;
    use crate::error::DecodeError;
    use crate::gpu::test_support::NullBackendHandleFactory;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A decoder whose images are fixed ahead of time, decodes instantly and
    /// without touching disk; failing paths are modeled explicitly.
    struct FixtureDecoder {
        sizes: HashMap<PathBuf, (u32, u32)>,
        failing: Mutex<HashSet<PathBuf>>,
        delays: Mutex<HashMap<PathBuf, Duration>>,
    }

    impl FixtureDecoder {
        fn new(sizes: &[(&str, (u32, u32))]) -> Self {
            Self {
                sizes: sizes.iter().map(|(p, s)| (PathBuf::from(p), *s)).collect(),
                failing: Mutex::new(HashSet::new()),
                delays: Mutex::new(HashMap::new()),
            }
        }

        fn fail(self, path: &str) -> Self {
            self.failing.lock().unwrap().insert(PathBuf::from(path));
            self
        }

        fn slow(self, path: &str, delay: Duration) -> Self {
            self.delays.lock().unwrap().insert(PathBuf::from(path), delay);
            self
        }
    }

    impl Decoder for FixtureDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
            if let Some(delay) = self.delays.lock().unwrap().get(path).copied() {
                std::thread::sleep(delay);
            }
            if self.failing.lock().unwrap().contains(path) {
                return Err(DecodeError::NotAnImage(path.to_path_buf()));
            }
            let (w, h) = *self.sizes.get(path).expect("fixture has no size for path");
            Ok(DecodedImage {
                width: w,
                height: h,
                pixels: vec![40u8; (w * h * 4) as usize],
            })
        }

        fn read_header(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
            self.sizes
                .get(path)
                .copied()
                .ok_or_else(|| DecodeError::NotAnImage(path.to_path_buf()))
        }
    }

    fn controller(
        budget: u64,
        decoder: FixtureDecoder,
    ) -> StreamerController<NullBackendHandleFactory> {
        StreamerController::new(
            budget,
            Duration::from_millis(5),
            2,
            NullBackendHandleFactory::new(),
            decoder,
        )
    }

    fn run_frame_until<B: GpuTextureBackend>(
        controller: &mut StreamerController<B>,
        mut one_frame: impl FnMut(&mut StreamerController<B>),
        mut done: impl FnMut(&StreamerController<B>) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            one_frame(controller);
            if done(controller) || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn calc_priority_is_one_when_density_matches_demand() {
        let p = calc_priority((64, 64), (64, 64), 0.0);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn calc_priority_penalizes_order_priority() {
        let urgent = calc_priority((64, 64), (64, 64), 0.0);
        let lazy = calc_priority((64, 64), (64, 64), 1.0);
        assert!(lazy > urgent);
    }

    #[test]
    fn cold_fetch_converges_to_resident_prefix_covering_onscreen_demand() {
        let decoder = FixtureDecoder::new(&[("a.png", (256, 256))]);
        let mut controller = controller(1_000_000, decoder);
        let path = PathBuf::from("a.png");

        run_frame_until(
            &mut controller,
            |c| {
                c.queries_begin();
                c.query(&path, (64, 64), (256, 256), 0.0);
                c.queries_end();
            },
            |c| {
                c.cache()
                    .find(&path)
                    .map(|t| t.all_mips_displayable())
                    .unwrap_or(false)
            },
        );

        let texture = controller.cache().find(&path).unwrap();
        assert!(texture.cached_mips > 0);
        assert!(texture.tex.is_some());
        assert_eq!(controller.cache().cache_memory_used(), texture.get_memory_size());
    }

    #[test]
    fn unqueried_texture_is_evicted_after_one_silent_frame() {
        let decoder = FixtureDecoder::new(&[("a.png", (32, 32)), ("b.png", (32, 32))]);
        let mut controller = controller(1_000_000, decoder);
        let a = PathBuf::from("a.png");
        let b = PathBuf::from("b.png");

        run_frame_until(
            &mut controller,
            |c| {
                c.queries_begin();
                c.query(&a, (32, 32), (32, 32), 0.0);
                c.query(&b, (32, 32), (32, 32), 0.0);
                c.queries_end();
            },
            |c| {
                c.cache().find(&a).map(|t| t.all_mips_displayable()).unwrap_or(false)
                    && c.cache().find(&b).map(|t| t.all_mips_displayable()).unwrap_or(false)
            },
        );

        // One frame querying only "a" — "b" must be fully evicted afterwards.
        controller.queries_begin();
        controller.query(&a, (32, 32), (32, 32), 0.0);
        controller.queries_end();

        assert!(controller.cache().find(&b).is_none());
        assert!(controller.cache().find(&a).is_some());
    }

    #[test]
    fn decode_failure_leaves_texture_empty_and_clears_job_in_flight() {
        let decoder = FixtureDecoder::new(&[("corrupt.png", (16, 16))]).fail("corrupt.png");
        let mut controller = controller(1_000_000, decoder);
        let path = PathBuf::from("corrupt.png");

        run_frame_until(
            &mut controller,
            |c| {
                c.queries_begin();
                let handle = c.query(&path, (16, 16), (16, 16), 0.0);
                let _ = handle.get_displayable_pixel_density((16, 16));
                c.queries_end();
            },
            |c| !c.cache().find(&path).map(|t| t.job_in_flight).unwrap_or(true),
        );

        let texture = controller.cache().find(&path).unwrap();
        assert_eq!(texture.cached_mips, 0);
        assert!(texture.tex.is_none());
        assert!(!texture.job_in_flight);
    }

    #[test]
    fn zero_budget_never_admits_resident_mips() {
        let decoder = FixtureDecoder::new(&[("a.png", (64, 64))]);
        let mut controller = controller(0, decoder);
        let path = PathBuf::from("a.png");

        for _ in 0..5 {
            controller.queries_begin();
            controller.query(&path, (64, 64), (64, 64), 0.0);
            controller.queries_end();
            std::thread::sleep(Duration::from_millis(5));
        }

        let texture = controller.cache().find(&path).unwrap();
        assert_eq!(texture.cached_mips, 0);
        assert!(texture.tex.is_none());
    }

    #[test]
    fn cancel_in_flight_clears_queued_job_when_query_stops() {
        // Two slow images so the single-threaded worker is still busy with
        // the first one when the second job is cancelled out of the queue.
        let decoder = FixtureDecoder::new(&[("busy.png", (4, 4)), ("x.png", (4, 4))])
            .slow("busy.png", Duration::from_millis(200))
            .slow("x.png", Duration::from_millis(200));
        // A 4x4 image's full pyramid (1x1 + 2x2 + 4x4, RGBA8) costs exactly
        // 4 + 16 + 64 = 84 bytes; budgeting for exactly one such pyramid
        // means once "busy.png" claims it (it has finite priority, having
        // just been queried) there is nothing left for "x.png"'s
        // now-infinite-priority entries.
        let mut controller = StreamerController::new(
            84,
            Duration::from_millis(5),
            1, // single worker: guarantees "x.png"'s job sits queued, not dispatched.
            NullBackendHandleFactory::new(),
            decoder,
        );
        let busy = PathBuf::from("busy.png");
        let x = PathBuf::from("x.png");

        controller.queries_begin();
        controller.query(&busy, (4, 4), (4, 4), 0.0);
        controller.query(&x, (4, 4), (4, 4), 0.0);
        controller.queries_end();
        assert!(controller.cache().find(&x).unwrap().job_in_flight);

        // Next frame: stop querying "x.png" entirely while "busy.png" is
        // still occupying the only worker, so "x.png"'s job is still
        // sitting in the queue, never dispatched.
        controller.queries_begin();
        controller.query(&busy, (4, 4), (4, 4), 0.0);
        controller.queries_end();

        assert!(controller.cache().find(&x).is_none());
    }
}
