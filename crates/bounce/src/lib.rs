//! Render pipeline for Jamboree.
//!
//! [`Transcoder`] supervises one child process of the configured
//! FFmpeg-class binary per invocation: argument vectors only, a wall-clock
//! timeout with interrupt-then-kill, and stderr `time=` progress surfaced
//! through a callback. [`Renderer`] chains transcoder invocations through
//! the generation pipeline — one-shot synthesis, stem assembly on the event
//! grid, preview and mastered mixes, optional vocals with SubRip captions,
//! optional visualizer video — validating each stage's output before moving
//! on, then publishes the results through [`stash`].

pub mod captions;
pub mod error;
pub mod graphs;
pub mod media;
pub mod progress;
pub mod renderer;
pub mod transcoder;

pub use error::RenderError;
pub use graphs::VideoStyle;
pub use media::MediaInfo;
pub use progress::{ProgressSink, StageBand};
pub use renderer::{ProducedAsset, RenderContext, RenderOutput, RenderRequest, Renderer};
pub use transcoder::{Capabilities, RunOptions, RunOutput, Transcoder};
