//! A priority-driven, memory-bounded, multi-threaded cache that decides,
//! frame by frame, which mipmaps of which images to decode, resize, upload
//! to the GPU, keep resident, or evict.
//!
//! This crate is the "hard part" of an interactive image-directory viewer:
//! window/input/GPU-context bring-up, the overlay, directory enumeration and
//! the image decoder itself are all external collaborators the streamer
//! consumes through narrow interfaces (see [`decoder::Decoder`] and
//! [`gpu::GpuTextureBackend`]) rather than features of this crate.
//!
//! The five cooperating pieces, leaves first:
//!
//! - [`queue::BlockingQueue`] — the blocking job/result queue.
//! - [`worker_pool::WorkerPool`] — the fixed pool of decode worker threads.
//! - [`mipmap`] — the pure pyramid-generation function.
//! - [`cache::CacheDirectory`] — the ordered per-image cache state.
//! - [`streamer::StreamerController`] — the per-frame state machine tying
//!   all of the above together; this is the type most applications embed.
//!
//! A typical render loop:
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use texture_streamer::config::StreamerConfig;
//! use texture_streamer::decoder::DefaultDecoder;
//! use texture_streamer::streamer::StreamerController;
//!
//! # fn make_backend() -> texture_streamer::gpu::WgpuBackend { unimplemented!() }
//! let config = StreamerConfig::load_or_create();
//! let backend = make_backend();
//! let mut streamer = StreamerController::from_config(&config, backend, DefaultDecoder);
//!
//! loop {
//!     streamer.queries_begin();
//!     let handle = streamer.query(Path::new("photo.png"), (128, 128), (4000, 3000), 0.0);
//!     let _ = handle.get_gpu_texture();
//!     streamer.queries_end();
//! #   break;
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decoder;
pub mod entry;
pub mod error;
pub mod gpu;
pub mod mipmap;
pub mod queue;
pub mod stats;
pub mod streamer;
pub mod worker_pool;

pub use cache::{CacheDirectory, CachedTexture};
pub use config::StreamerConfig;
pub use decoder::{DecodedImage, Decoder, DefaultDecoder};
pub use entry::Entry;
pub use error::{DecodeError, StreamerError};
pub use gpu::{GpuTextureBackend, GpuTextureHandle, TextureId};
pub use mipmap::{MipImage, ResampleFilter};
pub use queue::BlockingQueue;
pub use streamer::{CachedTextureHandle, StreamerController};
pub use worker_pool::WorkerPool;
