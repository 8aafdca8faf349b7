//! Minimal headless driver for the texture streamer.
//!
//! Window/input/GPU-context bring-up is explicitly out of scope for the
//! library (see `src/lib.rs`), so this binary supplies a throwaway offscreen
//! `wgpu` device just well enough to demonstrate the Cache Directory
//! actually uploading textures, and drives a handful of synthetic frames
//! against every image file found in a given directory instead of a real
//! render loop.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use texture_streamer::config::StreamerConfig;
use texture_streamer::decoder::DefaultDecoder;
use texture_streamer::entry::Entry;
use texture_streamer::gpu::WgpuBackend;
use texture_streamer::streamer::StreamerController;

#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "tiff", "bmp"];

fn scan_directory(dir: &Path) -> anyhow::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for dir_entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();

        if path.is_dir() {
            entries.push(Entry::Directory(path));
            continue;
        }

        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);

        if !is_image {
            entries.push(Entry::NonImageFile(path));
            continue;
        }

        match imagesize::size(&path) {
            Ok(size) => entries.push(Entry::ImageFile {
                path,
                full_size_px: (size.width as u32, size.height as u32),
            }),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping unreadable image header");
            }
        }
    }
    Ok(entries)
}

async fn create_wgpu_backend() -> anyhow::Result<WgpuBackend> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .context("no wgpu adapter available")?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .context("failed to open wgpu device")?;
    Ok(WgpuBackend::new(std::sync::Arc::new(device), std::sync::Arc::new(queue)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let directory = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let images: Vec<(PathBuf, (u32, u32))> = scan_directory(&directory)?
        .into_iter()
        .filter_map(|entry| entry.as_image_file().map(|(p, s)| (p.clone(), s)))
        .collect();

    if images.is_empty() {
        tracing::warn!(dir = %directory.display(), "no images found; nothing to stream");
        return Ok(());
    }

    tracing::info!(count = images.len(), dir = %directory.display(), "discovered images");

    let backend = pollster::block_on(create_wgpu_backend())?;
    let config = StreamerConfig::load_or_create();
    let mut streamer = StreamerController::from_config(&config, backend, DefaultDecoder);

    for frame in 0..30 {
        let frame_start = Instant::now();
        streamer.queries_begin();
        for (path, full_size_px) in &images {
            let handle = streamer.query(path, (128, 128), *full_size_px, 0.0);
            if handle.get_gpu_texture().is_none() {
                tracing::trace!(path = %path.display(), "still loading");
            }
        }
        streamer.queries_end();

        tracing::info!(
            frame,
            elapsed_ms = frame_start.elapsed().as_secs_f64() * 1000.0,
            cache_memory_used = streamer.cache().cache_memory_used(),
            cache_memory_budget = streamer.cache().cache_memory_budget(),
            "frame complete"
        );

        std::thread::sleep(Duration::from_millis(16));
    }

    Ok(())
}
