//! Dispatcher loop: queue consumption and fire-and-forget execution.
//!
//! The loop is the queue's sole consumer. Receives run under a fixed
//! timeout so cancellation is noticed even when the queue is idle. For each
//! envelope, every registered entry for its canonical name is spawned as
//! its own task on a [`TaskTracker`]; the loop never waits for executions,
//! but the tracker keeps their handles so shutdown can drain them.

use std::sync::Arc;

use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, info};

use braze_core::context::{BoxedBot, ExecutionContext, TypeMap};
use braze_core::envelope::Envelope;
use braze_core::executor::Executor;
use braze_core::model::Message;
use braze_core::registry::Registry;

/// The queue-consuming dispatch loop.
pub struct DispatchLoop {
    rx: mpsc::UnboundedReceiver<Envelope>,
    bot: BoxedBot,
    registry: Arc<RwLock<Registry>>,
    executor: Arc<Executor>,
    extras: TypeMap,
    recv_timeout: Duration,
    tracker: TaskTracker,
}

impl DispatchLoop {
    /// Creates the loop over the queue's receive half.
    pub fn new(
        rx: mpsc::UnboundedReceiver<Envelope>,
        bot: BoxedBot,
        registry: Arc<RwLock<Registry>>,
        executor: Arc<Executor>,
        extras: TypeMap,
        recv_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            bot,
            registry,
            executor,
            extras,
            recv_timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Consumes the queue until cancelled or all senders are gone.
    ///
    /// Returns the closed tracker so the caller can drain in-flight
    /// executions with a grace period of its choosing.
    pub async fn run(mut self, cancel: CancellationToken) -> TaskTracker {
        info!("Dispatcher loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match timeout(self.recv_timeout, self.rx.recv()).await {
                // Timed out: loop around and re-check cancellation.
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(envelope)) => self.dispatch(envelope),
            }
        }
        info!("Dispatcher loop stopped");
        self.tracker.close();
        self.tracker
    }

    /// Schedules one execution per registered entry, FIFO per envelope.
    fn dispatch(&self, envelope: Envelope) {
        self.log_message(&envelope);

        let entries = self.registry.read().handlers_for(envelope.name()).to_vec();
        if entries.is_empty() {
            debug!(event = %envelope.name(), "No handlers registered");
            return;
        }

        for entry in entries {
            let ctx = Arc::new(ExecutionContext::with_extras(
                envelope.clone(),
                Arc::clone(&self.bot),
                self.extras.clone(),
            ));
            let executor = Arc::clone(&self.executor);
            let span = debug_span!("execute", event = %envelope.name());
            self.tracker.spawn(
                async move {
                    let outcome = executor.execute(&entry, ctx).await;
                    debug!(?outcome, "Execution finished");
                }
                .instrument(span),
            );
        }
    }

    fn log_message(&self, envelope: &Envelope) {
        let Some(msg) = envelope.downcast_ref::<Message>() else {
            return;
        };
        let sender = self
            .bot
            .users()
            .get(msg.sender_uid)
            .map(|u| u.uname.clone())
            .unwrap_or_else(|| msg.sender_uid.to_string());
        match self.bot.groups().get(msg.receiver_id) {
            Some(group) => info!(
                sender = %sender,
                group = %group.group_name,
                text = msg.plain_text().unwrap_or("<non-text>"),
                "Message received"
            ),
            None => info!(
                sender = %sender,
                text = msg.plain_text().unwrap_or("<non-text>"),
                "Message received"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::queue_bot;
    use braze_core::registry::HandlerEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spawn_loop(
        registry: Registry,
    ) -> (
        mpsc::UnboundedSender<Envelope>,
        CancellationToken,
        tokio::task::JoinHandle<TaskTracker>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let dispatch = DispatchLoop::new(
            rx,
            queue_bot(),
            Arc::new(RwLock::new(registry)),
            Arc::new(Executor::new()),
            TypeMap::new(),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(dispatch.run(cancel.clone()));
        (tx, cancel, handle)
    }

    #[tokio::test]
    async fn one_execution_per_entry_per_envelope() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            registry.register(
                "Message",
                HandlerEntry::new(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        let (tx, cancel, handle) = spawn_loop(registry);
        tx.send(Envelope::new(Message::text(1, 2, "a"))).unwrap();
        tx.send(Envelope::new(Message::text(1, 2, "b"))).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let tracker = handle.await.unwrap();
        tracker.wait().await;

        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unmatched_envelope_is_dropped_quietly() {
        let (tx, cancel, handle) = spawn_loop(Registry::new());
        tx.send(Envelope::new(Message::text(1, 2, "a"))).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let tracker = handle.await.unwrap();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn late_registration_applies_to_later_envelopes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(RwLock::new(Registry::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let dispatch = DispatchLoop::new(
            rx,
            queue_bot(),
            Arc::clone(&registry),
            Arc::new(Executor::new()),
            TypeMap::new(),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(dispatch.run(cancel.clone()));

        tx.send(Envelope::new(Message::text(1, 2, "early"))).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        {
            let hits = Arc::clone(&hits);
            registry.write().register(
                "Message",
                HandlerEntry::new(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        tx.send(Envelope::new(Message::text(1, 2, "late"))).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap().wait().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
