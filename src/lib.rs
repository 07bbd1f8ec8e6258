//! # imgchain
//!
//! Chainable image transformations for still and animated images:
//! thumbnail, scale, crop, overlay composition and text with a drop shadow.
//!
//! # Architecture: Owned Images Through a Chain
//!
//! ```text
//! bytes ─decode─▶ ImageHandle ─op─▶ ImageHandle ─op─▶ … ─finalize─▶ OutputArtifact
//! GIF   ─decode─▶ stacked pages ─cut─▶ FrameSet ─op per frame─▶ … ─join─▶ GIF
//! ```
//!
//! Every decoded image is an [`imaging::ImageHandle`]: move-only, released
//! when dropped. A pipeline holds exactly one current image (or one frame
//! set); an operation either produces a complete replacement or fails and
//! leaves the pipeline as it was. `finalize` and `dispose` are terminal and
//! idempotent, tracked by a three-state [`imaging::Lifecycle`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | `Pipeline`, `StaticPipeline`, `AnimatedPipeline` and the `ImageOperations` chain API |
//! | [`imaging`] | Engine, backends, handles, overlay geometry, scratch pool, text shadow, frames, finalize |
//! | [`config`] | `config.toml` loading, validation and merging over stock defaults |
//! | [`logging`] | `tracing-subscriber` setup for the command line tool |
//!
//! # Design Decisions
//!
//! ## Explicit Engine Context
//!
//! Codecs, font database and thread pool hang off one [`imaging::Engine`]
//! created at startup and borrowed by every pipeline. It is `Sync`, so batch
//! runs share it across rayon workers while each worker owns its pipeline.
//!
//! ## Validation Before Pixels
//!
//! Overlay geometry, crop regions and the animated frame-area limit are all
//! checked before the backend is called, so those failures never allocate.
//!
//! ## Pure-Rust Imaging
//!
//! The production backend uses the `image` crate for codecs, resampling and
//! compositing, and `resvg` for SVG input, gradient overlays and text. There
//! are no system libraries to install; text only needs a system font.

pub mod config;
pub mod imaging;
pub mod logging;
pub mod pipeline;
