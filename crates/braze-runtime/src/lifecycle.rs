//! Lifecycle hook tables.
//!
//! Hooks are async callables over the bot handle, grouped into three
//! phases: `Start` runs before the loops come up, `End` after they stop,
//! and `Around` runs on both edges. Hooks within a phase run sequentially
//! in registration order.

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

use braze_core::context::BoxedBot;

/// A registered lifecycle callable.
pub type Hook = Arc<dyn Fn(BoxedBot) -> BoxFuture<'static, ()> + Send + Sync>;

/// When a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the loops start.
    Start,
    /// After the loops stop.
    End,
    /// On both edges.
    Around,
}

/// The three ordered hook tables.
#[derive(Default)]
pub struct Lifecycle {
    start: Vec<Hook>,
    end: Vec<Hook>,
    around: Vec<Hook>,
}

impl Lifecycle {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an async hook to a phase table.
    pub fn add<F, Fut>(&mut self, phase: Phase, hook: F)
    where
        F: Fn(BoxedBot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Arc::new(move |bot| -> BoxFuture<'static, ()> { Box::pin(hook(bot)) });
        self.table_mut(phase).push(hook);
    }

    /// A snapshot of one phase's hooks, in registration order.
    pub fn hooks(&self, phase: Phase) -> Vec<Hook> {
        self.table(phase).to_vec()
    }

    /// Number of hooks in a phase.
    pub fn len(&self, phase: Phase) -> usize {
        self.table(phase).len()
    }

    /// Whether all tables are empty.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.end.is_empty() && self.around.is_empty()
    }

    fn table(&self, phase: Phase) -> &Vec<Hook> {
        match phase {
            Phase::Start => &self.start,
            Phase::End => &self.end,
            Phase::Around => &self.around,
        }
    }

    fn table_mut(&mut self, phase: Phase) -> &mut Vec<Hook> {
        match phase {
            Phase::Start => &mut self.start,
            Phase::End => &mut self.end,
            Phase::Around => &mut self.around,
        }
    }
}

/// Runs one phase's hooks sequentially.
pub async fn run_hooks(hooks: &[Hook], phase: Phase, bot: &BoxedBot) {
    if hooks.is_empty() {
        return;
    }
    debug!(?phase, count = hooks.len(), "Running lifecycle hooks");
    for hook in hooks {
        hook(Arc::clone(bot)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::queue_bot;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl Fn(BoxedBot) -> futures::future::Ready<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_bot| {
            log.lock().push(label);
            futures::future::ready(())
        }
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();
        lifecycle.add(Phase::Around, recording(&log, "a1"));
        lifecycle.add(Phase::Around, recording(&log, "a2"));
        lifecycle.add(Phase::End, recording(&log, "e1"));

        let bot: BoxedBot = queue_bot();
        run_hooks(&lifecycle.hooks(Phase::Around), Phase::Around, &bot).await;
        assert_eq!(*log.lock(), vec!["a1", "a2"]);

        run_hooks(&lifecycle.hooks(Phase::Around), Phase::Around, &bot).await;
        run_hooks(&lifecycle.hooks(Phase::End), Phase::End, &bot).await;
        assert_eq!(*log.lock(), vec!["a1", "a2", "a1", "a2", "e1"]);
    }

    #[tokio::test]
    async fn empty_phase_is_a_no_op() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_empty());
        let bot: BoxedBot = queue_bot();
        run_hooks(&lifecycle.hooks(Phase::Start), Phase::Start, &bot).await;
    }
}
