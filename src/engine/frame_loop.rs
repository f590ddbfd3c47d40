//! Cancellable repeating task driven by the host's frame clock.
//!
//! The host calls into the owner once per frame with the current time; the
//! loop only records whether a run is live and when it began, so at most one
//! run exists per loop and starting a new one replaces the previous one.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopTicket(u64);

#[derive(Clone, Copy, Debug)]
struct ActiveRun {
    ticket: LoopTicket,
    started_at_ms: f64,
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    next_ticket: u64,
    active: Option<ActiveRun>,
}

impl FrameLoop {
    pub fn start(&mut self, now_ms: f64) -> LoopTicket {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let ticket = LoopTicket(self.next_ticket);
        self.active = Some(ActiveRun {
            ticket,
            started_at_ms: now_ms,
        });
        ticket
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_current(&self, ticket: LoopTicket) -> bool {
        self.active.is_some_and(|run| run.ticket == ticket)
    }

    /// Milliseconds since the live run started, never negative.
    pub fn elapsed_ms(&self, now_ms: f64) -> Option<f64> {
        self.active
            .map(|run| (now_ms - run.started_at_ms).max(0.0))
    }
}
