//! Threaded publishing of long messages.
//!
//! A message is split into chunks and each chunk is posted as a reply to the
//! previous one. Chunks are sent strictly one after another because the
//! platform only accepts replies to posts that already exist. Media and polls
//! go on the first post only, and the first post's URL is what the caller
//! gets back.

use std::fmt;

use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::api::sanitize_for_logging;
use crate::error::{ApiError, PublishError};
use crate::retry::RetryPolicy;
use crate::segmenter::{split_into_chunks, PostChunk, SegmentLimits};

/// Who can see a published post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

/// A poll attached to the first post of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub options: Vec<String>,
    /// Seconds until the poll closes.
    pub expires_in: u64,
}

/// A post created on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub url: String,
}

/// Input of a single publish call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishRequest {
    pub text: String,
    pub visibility: Visibility,
    pub media_ids: Vec<String>,
    pub reply_to_id: Option<String>,
    pub poll: Option<Poll>,
}

/// Extras that belong to the first post of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachments {
    pub media_ids: Vec<String>,
    pub poll: Option<Poll>,
}

impl Attachments {
    pub fn media(media_ids: Vec<String>) -> Self {
        Self {
            media_ids,
            poll: None,
        }
    }

    pub fn poll(poll: Poll) -> Self {
        Self {
            media_ids: Vec::new(),
            poll: Some(poll),
        }
    }

    pub fn has_media(&self) -> bool {
        !self.media_ids.is_empty()
    }
}

/// Outcome of a fully published chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResult {
    /// URL of chunk 0's post. Never taken from a later chunk.
    pub first_post_url: String,
    /// Every post of the chain in publishing order.
    pub posts: Vec<Post>,
    /// Retries each post needed, indexed like `posts`.
    pub retries: Vec<u32>,
}

/// Platform operation that creates one post.
#[async_trait]
pub trait PublishTransport: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<Post, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Pending,
    Publishing(usize),
    Failed,
    Complete,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Pending => f.write_str("pending"),
            ChainState::Publishing(index) => write!(f, "publishing chunk {}", index),
            ChainState::Failed => f.write_str("failed"),
            ChainState::Complete => f.write_str("complete"),
        }
    }
}

/// Publishes messages as reply chains through a [`PublishTransport`].
pub struct ThreadedPublisher<T> {
    transport: T,
    policy: RetryPolicy,
    limits: SegmentLimits,
    visibility: Visibility,
    dry_run: bool,
}

impl<T: PublishTransport> ThreadedPublisher<T> {
    /// With `dry_run` set the transport is never called; synthetic posts are
    /// returned instead.
    pub fn new(transport: T, policy: RetryPolicy, limits: SegmentLimits, dry_run: bool) -> Self {
        Self {
            transport,
            policy,
            limits,
            visibility: Visibility::Public,
            dry_run,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Splits `text` and publishes it as a chain.
    pub async fn publish(
        &self,
        text: &str,
        attachments: &Attachments,
    ) -> Result<ChainResult, PublishError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PublishError::EmptyMessage);
        }
        let chunks = split_into_chunks(text, attachments.has_media(), &self.limits);
        self.publish_chunks(&chunks, attachments).await
    }

    /// Publishes already split chunks in order, each replying to the one before.
    ///
    /// A chunk that cannot be published ends the chain. Posts already created
    /// stay on the platform.
    pub async fn publish_chunks(
        &self,
        chunks: &[PostChunk],
        attachments: &Attachments,
    ) -> Result<ChainResult, PublishError> {
        if chunks.is_empty() {
            return Err(PublishError::EmptyMessage);
        }

        let mut state = ChainState::Pending;
        let mut first_post_url: Option<String> = None;
        let mut posts: Vec<Post> = Vec::with_capacity(chunks.len());
        let mut retries: Vec<u32> = Vec::with_capacity(chunks.len());
        debug!("Chain {} with {} chunk(s)", state, chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            state = ChainState::Publishing(index);
            info!("Chain {} of {}", state, chunks.len());

            let request = self.build_request(index, chunk, attachments, posts.last());
            let (post, retried) = match self.send(index, &request).await {
                Ok(sent) => sent,
                Err(source) => {
                    state = ChainState::Failed;
                    error!(
                        "Chain {} at chunk {}, {} post(s) left published",
                        state,
                        index,
                        posts.len()
                    );
                    return Err(PublishError::Chain {
                        index,
                        published: posts.len(),
                        first_post_url,
                        source,
                    });
                }
            };

            if first_post_url.is_none() {
                first_post_url = Some(post.url.clone());
            }
            debug!("Chunk {} published as {}", index, post.id);
            posts.push(post);
            retries.push(retried);
        }

        state = ChainState::Complete;
        let first_post_url = first_post_url.unwrap_or_default();
        info!("Chain {}: {}", state, first_post_url);
        Ok(ChainResult {
            first_post_url,
            posts,
            retries,
        })
    }

    fn build_request(
        &self,
        index: usize,
        chunk: &PostChunk,
        attachments: &Attachments,
        previous: Option<&Post>,
    ) -> PublishRequest {
        let first = index == 0;
        PublishRequest {
            text: chunk.text.clone(),
            visibility: self.visibility,
            media_ids: if first && chunk.attach_media {
                attachments.media_ids.clone()
            } else {
                Vec::new()
            },
            reply_to_id: previous.map(|post| post.id.clone()),
            poll: if first { attachments.poll.clone() } else { None },
        }
    }

    /// Publishes one chunk and reports how many retries it took.
    async fn send(&self, index: usize, request: &PublishRequest) -> Result<(Post, u32), ApiError> {
        if self.dry_run {
            info!(
                "Dry run, not publishing chunk {}: '{}'",
                index,
                sanitize_for_logging(&request.text, 80)
            );
            let post = Post {
                id: format!("dry-run-{}", index),
                url: format!("dry-run://posts/{}", index),
            };
            return Ok((post, 0));
        }
        let attempted = self
            .policy
            .call_traced("statuses", || self.transport.publish(request))
            .await;
        let retries = attempted.state.retries(attempted.result.is_ok());
        if retries > 0 {
            info!("Chunk {} needed {} retries", index, retries);
        }
        attempted.result.map(|post| (post, retries))
    }
}
