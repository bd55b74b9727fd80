//! Ingestion loop: poll the source, deduplicate by offset, enrich, publish.
//!
//! The [`EventSource`] trait is the seam to the remote chat service. The
//! [`Ingestor`] polls it on a fixed interval, filters each conversation's
//! items through the [`OffsetTracker`] so nothing at or below the
//! acknowledged offset is re-delivered, resolves sender/group metadata into
//! the bot's profile caches, and publishes one envelope per fresh item.
//!
//! Transport errors are logged and swallowed; the loop sleeps the poll
//! interval and retries. A failed metadata lookup skips that one event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use braze_core::context::BoxedBot;
use braze_core::envelope::{Envelope, Payload};
use braze_core::model::{GroupProfile, ReceiverKind, UserProfile};

/// Errors reported by an [`EventSource`].
#[derive(Error, Debug)]
pub enum SourceError {
    /// The remote service could not be reached or answered abnormally.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The remote service answered with data that could not be decoded.
    #[error("Malformed update: {0}")]
    Malformed(String),

    /// A metadata lookup failed for the given id.
    #[error("Lookup failed for id {id}")]
    Lookup { id: i64 },
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Identifies one conversation on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    /// The peer: a user id for private chats, a group id for group chats.
    pub talker_id: i64,
    /// Whether the conversation is private or a group.
    pub kind: ReceiverKind,
}

/// One offset-stamped payload inside a conversation update.
#[derive(Clone)]
pub struct Delivery {
    /// Monotone per-conversation sequence number.
    pub offset: u64,
    /// The already-decoded typed body.
    pub payload: Arc<dyn Payload>,
}

/// Everything one poll reports about one conversation.
pub struct ConversationUpdate {
    pub key: ConversationKey,
    /// The newest offset the conversation has reached, item or not.
    pub newest_offset: u64,
    /// Offset-stamped items, oldest first.
    pub items: Vec<Delivery>,
}

/// The collaborator that talks to the remote chat service.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the current state of every active conversation.
    async fn poll_once(&self) -> SourceResult<Vec<ConversationUpdate>>;

    /// Confirms delivery of a conversation up to `offset`.
    async fn ack(&self, key: ConversationKey, offset: u64);

    /// Resolves metadata for a user id.
    async fn resolve_user(&self, uid: i64) -> SourceResult<UserProfile>;

    /// Resolves metadata for a group id.
    async fn resolve_group(&self, group_id: i64) -> SourceResult<GroupProfile>;
}

/// Per-conversation acknowledged offsets.
///
/// A conversation seen for the first time baselines at its newest offset,
/// so history present before startup is never replayed. Afterwards only
/// items with an offset strictly greater than the acknowledged one pass.
#[derive(Default)]
pub struct OffsetTracker {
    acked: HashMap<ConversationKey, u64>,
}

impl OffsetTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters an update down to its deliverable items and advances the
    /// acknowledged offset to the update's newest.
    pub fn admit(&mut self, update: &ConversationUpdate) -> Vec<Delivery> {
        match self.acked.get(&update.key).copied() {
            None => {
                self.acked.insert(update.key, update.newest_offset);
                Vec::new()
            }
            Some(acked) => {
                let fresh: Vec<Delivery> = update
                    .items
                    .iter()
                    .filter(|item| item.offset > acked)
                    .cloned()
                    .collect();
                self.acked
                    .insert(update.key, update.newest_offset.max(acked));
                fresh
            }
        }
    }

    /// The acknowledged offset for a conversation, if it has been seen.
    pub fn acknowledged(&self, key: ConversationKey) -> Option<u64> {
        self.acked.get(&key).copied()
    }
}

/// The polling loop feeding the event queue.
pub struct Ingestor {
    source: Arc<dyn EventSource>,
    bot: BoxedBot,
    tracker: OffsetTracker,
    poll_interval: Duration,
}

impl Ingestor {
    /// Creates an ingestor publishing into `bot`'s queue.
    pub fn new(source: Arc<dyn EventSource>, bot: BoxedBot, poll_interval: Duration) -> Self {
        Self {
            source,
            bot,
            tracker: OffsetTracker::new(),
            poll_interval,
        }
    }

    /// Polls until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Ingestion loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.source.poll_once() => match polled {
                    Ok(updates) => self.process(updates).await,
                    Err(e) => warn!(error = %e, "Poll failed, retrying after interval"),
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Ingestion loop stopped");
    }

    async fn process(&mut self, updates: Vec<ConversationUpdate>) {
        for update in updates {
            let fresh = self.tracker.admit(&update);
            for item in fresh {
                if let Err(e) = self.enrich(&item.payload).await {
                    warn!(
                        talker_id = update.key.talker_id,
                        offset = item.offset,
                        error = %e,
                        "Metadata lookup failed, skipping event"
                    );
                    continue;
                }
                let envelope = Envelope::from_arc(Arc::clone(&item.payload));
                debug!(event = %envelope.name(), offset = item.offset, "Publishing event");
                self.bot.publish(envelope);
            }
            self.source.ack(update.key, update.newest_offset).await;
        }
    }

    /// Fills the profile caches for the payload's sender and group before it
    /// becomes visible to handlers.
    async fn enrich(&self, payload: &Arc<dyn Payload>) -> SourceResult<()> {
        if let Some(uid) = payload.sender_id()
            && !self.bot.users().contains(uid)
        {
            let profile = self.source.resolve_user(uid).await?;
            self.bot.users().insert(uid, profile);
        }

        if let Some((ReceiverKind::Group, group_id)) = payload.receiver()
            && !self.bot.groups().contains(group_id)
        {
            let profile = self.source.resolve_group(group_id).await?;
            self.bot.groups().insert(group_id, profile);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::{QueueBot, queue_bot};
    use braze_core::model::Message;
    use parking_lot::Mutex;

    fn private(talker_id: i64) -> ConversationKey {
        ConversationKey {
            talker_id,
            kind: ReceiverKind::Private,
        }
    }

    fn delivery(sender: i64, offset: u64, text: &str) -> Delivery {
        let mut msg = Message::text(sender, 1000, text);
        msg.msg_seqno = offset;
        Delivery {
            offset,
            payload: Arc::new(msg),
        }
    }

    /// Source whose polls are scripted in advance.
    #[derive(Default)]
    struct ScriptedSource {
        polls: Mutex<Vec<SourceResult<Vec<ConversationUpdate>>>>,
        acks: Mutex<Vec<(ConversationKey, u64)>>,
        unknown_user: Option<i64>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn poll_once(&self) -> SourceResult<Vec<ConversationUpdate>> {
            let mut polls = self.polls.lock();
            if polls.is_empty() {
                Ok(Vec::new())
            } else {
                polls.remove(0)
            }
        }

        async fn ack(&self, key: ConversationKey, offset: u64) {
            self.acks.lock().push((key, offset));
        }

        async fn resolve_user(&self, uid: i64) -> SourceResult<UserProfile> {
            if self.unknown_user == Some(uid) {
                return Err(SourceError::Lookup { id: uid });
            }
            Ok(UserProfile {
                uid,
                uname: format!("user-{uid}"),
                face: String::new(),
            })
        }

        async fn resolve_group(&self, group_id: i64) -> SourceResult<GroupProfile> {
            Ok(GroupProfile {
                group_id,
                group_name: format!("group-{group_id}"),
                owner_uid: 0,
            })
        }
    }

    fn ingestor(source: ScriptedSource) -> (Ingestor, Arc<QueueBot>) {
        let bot = queue_bot();
        let ingestor = Ingestor::new(
            Arc::new(source),
            Arc::clone(&bot) as BoxedBot,
            Duration::from_millis(1),
        );
        (ingestor, bot)
    }

    #[test]
    fn first_sighting_baselines_without_replay() {
        let mut tracker = OffsetTracker::new();
        let update = ConversationUpdate {
            key: private(5),
            newest_offset: 40,
            items: vec![delivery(5, 39, "old"), delivery(5, 40, "old too")],
        };
        assert!(tracker.admit(&update).is_empty());
        assert_eq!(tracker.acknowledged(private(5)), Some(40));
    }

    #[test]
    fn only_offsets_above_the_ack_are_delivered() {
        let mut tracker = OffsetTracker::new();
        tracker.admit(&ConversationUpdate {
            key: private(5),
            newest_offset: 10,
            items: Vec::new(),
        });

        let update = ConversationUpdate {
            key: private(5),
            newest_offset: 12,
            items: vec![delivery(5, 10, "dup"), delivery(5, 11, "a"), delivery(5, 12, "b")],
        };
        let fresh = tracker.admit(&update);
        assert_eq!(fresh.iter().map(|d| d.offset).collect::<Vec<_>>(), vec![11, 12]);
        assert_eq!(tracker.acknowledged(private(5)), Some(12));

        // A stale re-poll delivers nothing and never regresses the ack.
        let stale = ConversationUpdate {
            key: private(5),
            newest_offset: 11,
            items: vec![delivery(5, 11, "a")],
        };
        assert!(tracker.admit(&stale).is_empty());
        assert_eq!(tracker.acknowledged(private(5)), Some(12));
    }

    #[tokio::test]
    async fn fresh_items_are_enriched_and_published() {
        let source = ScriptedSource::default();
        let (mut ingestor, bot) = ingestor(source);

        // baseline poll
        ingestor
            .process(vec![ConversationUpdate {
                key: private(7),
                newest_offset: 3,
                items: Vec::new(),
            }])
            .await;
        assert!(bot.published.lock().is_empty());

        // fresh item arrives
        ingestor
            .process(vec![ConversationUpdate {
                key: private(7),
                newest_offset: 4,
                items: vec![delivery(7, 4, "hello")],
            }])
            .await;

        let published = bot.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].name().as_str(), "Message");
        assert_eq!(bot.users.get(7).unwrap().uname, "user-7");
    }

    #[tokio::test]
    async fn failed_lookup_skips_the_event() {
        let source = ScriptedSource {
            unknown_user: Some(9),
            ..Default::default()
        };
        let (mut ingestor, bot) = ingestor(source);

        ingestor
            .process(vec![ConversationUpdate {
                key: private(9),
                newest_offset: 0,
                items: Vec::new(),
            }])
            .await;
        ingestor
            .process(vec![ConversationUpdate {
                key: private(9),
                newest_offset: 1,
                items: vec![delivery(9, 1, "ghost")],
            }])
            .await;

        assert!(bot.published.lock().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancellation_and_swallows_transport_errors() {
        let source = ScriptedSource {
            polls: Mutex::new(vec![Err(SourceError::Transport("down".into()))]),
            ..Default::default()
        };
        let (ingestor, bot) = ingestor(source);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ingestor.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(bot.published.lock().is_empty());
    }
}
