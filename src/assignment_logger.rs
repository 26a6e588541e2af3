use crate::events::{AssignmentEvent, BanditEvent};

/// Receives assignment and bandit events so they can be saved to the user's
/// analytics storage.
///
/// Implementations must be cheap and non-blocking: they are called on the
/// evaluation path. Failures inside a logger are the logger's own concern and
/// must never affect the returned assignment.
pub trait AssignmentLogger {
    /// Called when a flag assignment should be recorded.
    fn log_assignment(&self, event: AssignmentEvent) {
        let _ = event;
    }

    /// Called when a bandit action selection should be recorded.
    fn log_bandit_event(&self, event: BanditEvent) {
        let _ = event;
    }
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event);
    }
}
