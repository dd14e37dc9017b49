//! # Stochastic Parrot Library
//!
//! Content-generation jobs that ask a language model for text, images,
//! speech or video and publish the result to Mastodon.
//!
//! ## Features
//!
//! - Segmenting long text into post-sized chunks without breaking code fences
//! - Publishing chunks as a reply chain, media and polls on the first post
//! - A uniform retry policy with classified errors for every API call
//! - Clients for OpenAI, ElevenLabs, Creatomate and Mastodon
//! - Archiving of raw generation responses
//!
//! ## Configuration
//!
//! See [`config::ParrotConfig::from_env`] for the environment variables read.

pub mod api;
pub mod archive;
pub mod config;
pub mod content;
pub mod creatomate;
pub mod elevenlabs;
pub mod error;
pub mod jobs;
pub mod mastodon;
pub mod openai;
pub mod publisher;
pub mod retry;
pub mod segmenter;

// Re-export commonly used types and functions
pub use config::ParrotConfig;
pub use error::{ApiError, ErrorKind, PublishError};
pub use mastodon::MastodonClient;
pub use publisher::{Attachments, ChainResult, Post, PublishRequest, PublishTransport, ThreadedPublisher};
pub use retry::{RetryConfig, RetryPolicy};
pub use segmenter::{split_into_chunks, PostChunk, SegmentLimits};
