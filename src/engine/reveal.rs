use std::collections::HashSet;

use super::frame_loop::{FrameLoop, LoopTicket};
use super::reconcile::NodeKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealPlan {
    /// Nothing new arrived; the caller redraws once right away.
    Immediate,
    Started { arrivals: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RevealStep {
    pub progress: f64,
    pub admitted: usize,
    pub arrivals: usize,
    pub finished: bool,
}

struct RevealRun {
    ticket: LoopTicket,
    arrivals: Vec<NodeKey>,
    admitted: usize,
}

/// Owns the visible set and paces newly arrived nodes into it.
pub struct VisibilityScheduler {
    visible: HashSet<NodeKey>,
    frame_loop: FrameLoop,
    run: Option<RevealRun>,
    window_ms: f64,
}

impl VisibilityScheduler {
    pub fn new(window_ms: f64) -> Self {
        Self {
            visible: HashSet::new(),
            frame_loop: FrameLoop::default(),
            run: None,
            window_ms: window_ms.max(0.0),
        }
    }

    pub fn is_visible(&self, key: NodeKey) -> bool {
        self.visible.contains(&key)
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Departures leave the visible set immediately; arrivals are queued in
    /// snapshot order behind a fresh reveal run.
    pub fn on_new_reconciled_set(&mut self, ordered: &[NodeKey], now_ms: f64) -> RevealPlan {
        let target = ordered.iter().copied().collect::<HashSet<_>>();
        self.visible.retain(|key| target.contains(key));
        self.cancel();

        let arrivals = ordered
            .iter()
            .copied()
            .filter(|key| !self.visible.contains(key))
            .collect::<Vec<_>>();
        if arrivals.is_empty() {
            return RevealPlan::Immediate;
        }

        let count = arrivals.len();
        let ticket = self.frame_loop.start(now_ms);
        self.run = Some(RevealRun {
            ticket,
            arrivals,
            admitted: 0,
        });
        log::debug!("reveal run started for {count} new nodes");
        RevealPlan::Started { arrivals: count }
    }

    /// Advances the live run, if any. Every returned step asks for a redraw.
    pub fn step(&mut self, now_ms: f64) -> Option<RevealStep> {
        let run = self.run.as_mut()?;
        if !self.frame_loop.is_current(run.ticket) {
            self.run = None;
            return None;
        }

        let elapsed = self.frame_loop.elapsed_ms(now_ms)?;
        let progress = if self.window_ms <= 0.0 {
            1.0
        } else {
            (elapsed / self.window_ms).min(1.0)
        };

        let total = run.arrivals.len();
        let take = ((progress * total as f64).floor() as usize).min(total);
        if take > run.admitted {
            self.visible.extend(run.arrivals[run.admitted..take].iter().copied());
            run.admitted = take;
        }

        let step = RevealStep {
            progress,
            admitted: run.admitted,
            arrivals: total,
            finished: progress >= 1.0,
        };

        if step.finished {
            self.frame_loop.cancel();
            self.run = None;
            log::debug!("reveal run finished with {total} nodes admitted");
        }

        Some(step)
    }

    pub fn cancel(&mut self) {
        self.frame_loop.cancel();
        self.run = None;
    }
}
