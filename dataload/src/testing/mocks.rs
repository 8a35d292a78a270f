//! In-memory stores for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::LoadContext;
use crate::core::{Attachment, Comment, CommentId, Session, User, UserId};
use crate::errors::StoreError;
use crate::stores::{AttachmentStore, CommentStore, SessionStore, UserStore};

/// Sleeps for `delay`, returning early with an error if `ctx` is done first.
async fn pause(ctx: &LoadContext, delay: Duration) -> Result<(), StoreError> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = ctx.done() => Err(StoreError::msg("store call interrupted")),
    }
}

/// One reply of a [`ScriptedCommentStore`].
#[derive(Debug, Clone)]
pub enum CommentReply {
    /// Return these comments.
    Comments(Vec<Comment>),
    /// Fail with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
}

/// A comment store that plays queued replies, then a fallback reply.
#[derive(Debug)]
pub struct ScriptedCommentStore {
    script: Mutex<VecDeque<CommentReply>>,
    fallback: CommentReply,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedCommentStore {
    /// Creates a store that always returns `comments`.
    #[must_use]
    pub fn new(comments: Vec<Comment>) -> Self {
        Self::with_fallback(CommentReply::Comments(comments))
    }

    /// Creates a store that always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(CommentReply::Fail(message.into()))
    }

    /// Creates a store that always panics with `message`.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        Self::with_fallback(CommentReply::Panic(message.into()))
    }

    fn with_fallback(fallback: CommentReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues a reply to play before the fallback.
    #[must_use]
    pub fn then(self, reply: CommentReply) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Delays every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentStore for ScriptedCommentStore {
    async fn fetch_comments(&self, ctx: &LoadContext) -> Result<Vec<Comment>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        pause(ctx, self.delay).await?;

        match reply {
            CommentReply::Comments(comments) => Ok(comments),
            CommentReply::Fail(message) => Err(StoreError::msg(message)),
            CommentReply::Panic(message) => panic!("{message}"),
        }
    }
}

/// A user store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: HashMap<UserId, User>,
    delay: Duration,
    panic_message: Option<String>,
    requests: Mutex<Vec<Vec<UserId>>>,
}

impl InMemoryUserStore {
    /// Creates a store holding `users`.
    #[must_use]
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id, user)).collect(),
            ..Self::default()
        }
    }

    /// Delays every lookup.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every lookup panic with `message`.
    #[must_use]
    pub fn panicking(mut self, message: impl Into<String>) -> Self {
        self.panic_message = Some(message.into());
        self
    }

    /// Returns the id lists of every lookup, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<UserId>> {
        self.requests.lock().clone()
    }

    /// Returns the number of lookups.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn fetch_users_by_ids(&self, ctx: &LoadContext, ids: &[UserId]) -> Vec<User> {
        self.requests.lock().push(ids.to_vec());
        if let Some(message) = &self.panic_message {
            panic!("{message}");
        }
        if pause(ctx, self.delay).await.is_err() {
            return Vec::new();
        }
        ids.iter().filter_map(|id| self.users.get(id).cloned()).collect()
    }
}

/// A session store returning a fixed session.
#[derive(Debug, Default)]
pub struct StaticSessionStore {
    session: Option<Session>,
    calls: AtomicUsize,
}

impl StaticSessionStore {
    /// Creates a store returning `session`.
    #[must_use]
    pub fn new(session: Option<Session>) -> Self {
        Self {
            session,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of lookups.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionStore for StaticSessionStore {
    fn fetch_current_session(&self) -> Option<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.session.clone()
    }
}

/// An attachment store backed by a list.
#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    attachments: Vec<Attachment>,
    delay: Duration,
    requests: Mutex<Vec<Vec<CommentId>>>,
}

impl InMemoryAttachmentStore {
    /// Creates a store holding `attachments` in the given order.
    #[must_use]
    pub fn new(attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::default()
        }
    }

    /// Delays every lookup.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the id lists of every lookup, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<CommentId>> {
        self.requests.lock().clone()
    }

    /// Returns the number of lookups.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn fetch_attachments_by_comment_ids(
        &self,
        ctx: &LoadContext,
        ids: &[CommentId],
    ) -> Vec<Attachment> {
        self.requests.lock().push(ids.to_vec());
        if pause(ctx, self.delay).await.is_err() {
            return Vec::new();
        }
        let wanted: HashSet<_> = ids.iter().copied().collect();
        self.attachments
            .iter()
            .filter(|attachment| wanted.contains(&attachment.comment_id))
            .cloned()
            .collect()
    }
}
