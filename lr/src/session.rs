//! Loop progress session
//!
//! A [`Session`] reports one loop. It moves through three states:
//!
//! ```text
//! Configured --enter()--> Active --(scope exit)--> Terminated
//! ```
//!
//! While active it keeps a single progress message up to date by editing it in
//! place, buffers warnings and flushes them as replies to that message, and can
//! spawn child sessions for subloops whose messages reply to it as well.
//!
//! Scope exit is tied to [`ActiveSession`], a guard returned by
//! [`Session::enter`]. Dropping the guard tears the session down on every path,
//! including early returns and panics.

use chrono::{DateTime, Local, TimeDelta};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::UsageError;
use crate::format::{natural_delta, natural_interval, natural_time, timestamp};
use crate::gate::{GateStart, RateGate};
use crate::messenger::SafeMessenger;
use crate::telegram::MessageId;
use crate::warnings::{WarningAggregator, WarningBuffer};

/// Default minimum time between progress reports
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default minimum time between warning flushes
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Text of the reply sent after the final summary
pub const FINISHED_TEXT: &str = "Finished!";

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Loop title; a timestamped default is used when `None`
    pub name: Option<String>,

    /// Minimum time between progress reports triggered by `update`
    pub min_update_interval: Duration,

    /// Minimum time between warning flushes (the aggregation window)
    pub min_warn_interval: Duration,

    /// Whether the first `update` after entry may report immediately
    pub first_update: GateStart,

    /// Whether the first warning after entry may be flushed immediately
    pub first_warning: GateStart,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: None,
            min_update_interval: DEFAULT_UPDATE_INTERVAL,
            min_warn_interval: DEFAULT_WARN_INTERVAL,
            first_update: GateStart::AfterInterval,
            first_warning: GateStart::AfterInterval,
        }
    }
}

impl SessionConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    pub fn with_warn_interval(mut self, interval: Duration) -> Self {
        self.min_warn_interval = interval;
        self
    }

    pub fn with_first_update(mut self, start: GateStart) -> Self {
        self.first_update = start;
        self
    }

    pub fn with_first_warning(mut self, start: GateStart) -> Self {
        self.first_warning = start;
        self
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Active,
    Terminated,
}

/// The progress message of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMessage {
    /// Nothing delivered yet
    Unset,
    /// Sent, not edited since
    Pending(MessageId),
    /// Sent and edited at least once
    Edited(MessageId),
}

impl ProgressMessage {
    pub fn id(&self) -> Option<MessageId> {
        match self {
            ProgressMessage::Unset => None,
            ProgressMessage::Pending(id) | ProgressMessage::Edited(id) => Some(*id),
        }
    }
}

/// How a finished loop ended relative to the expected iteration count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Incomplete,
    Overrun,
}

/// Reporting context bound to one loop
pub struct Session {
    messenger: SafeMessenger,
    clock: Arc<dyn Clock>,
    title: String,
    total: u64,
    completed: u64,
    start_time: DateTime<Local>,
    config: SessionConfig,
    update_gate: RateGate,
    warnings: WarningAggregator,
    progress: ProgressMessage,
    reply_target: Option<MessageId>,
    state: SessionState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("title", &self.title)
            .field("total", &self.total)
            .field("completed", &self.completed)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("reply_target", &self.reply_target)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a configured (not yet active) session
    pub fn new(
        messenger: SafeMessenger,
        clock: Arc<dyn Clock>,
        total: u64,
        config: SessionConfig,
        reply_target: Option<MessageId>,
    ) -> Self {
        let now = clock.now();
        let title = config
            .name
            .clone()
            .unwrap_or_else(|| format!("Loop started on {}", timestamp(now)));
        debug!(%title, total, ?reply_target, "Session::new: called");

        Self {
            messenger,
            clock,
            title,
            total,
            completed: 0,
            start_time: now,
            update_gate: RateGate::new(config.min_update_interval),
            warnings: WarningAggregator::new(config.min_warn_interval),
            config,
            progress: ProgressMessage::Unset,
            reply_target,
            state: SessionState::Configured,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn progress_message(&self) -> ProgressMessage {
        self.progress
    }

    pub fn reply_target(&self) -> Option<MessageId> {
        self.reply_target
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.update_gate.last()
    }

    pub fn last_warning_flush(&self) -> Option<DateTime<Local>> {
        self.warnings.last_flush()
    }

    /// Warnings buffered and not yet delivered
    pub fn pending_warnings(&self) -> &WarningBuffer {
        self.warnings.buffer()
    }

    /// Completed share of the loop, floored; 100 when nothing was expected
    pub fn percentage(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        u64::try_from(u128::from(self.completed) * 100 / u128::from(self.total)).unwrap_or(u64::MAX)
    }

    pub fn outcome(&self) -> Outcome {
        match self.completed.cmp(&self.total) {
            std::cmp::Ordering::Equal => Outcome::Completed,
            std::cmp::Ordering::Less => Outcome::Incomplete,
            std::cmp::Ordering::Greater => Outcome::Overrun,
        }
    }

    /// Linear extrapolation of when the loop will finish
    ///
    /// `None` before the first counted iteration or outside the active window.
    pub fn expected_finish(&self) -> Option<DateTime<Local>> {
        if !self.is_active() {
            return None;
        }
        self.expected_finish_at(self.clock.now())
    }

    fn expected_finish_at(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if self.completed == 0 {
            return None;
        }
        let elapsed_ms = i128::from((now - self.start_time).num_milliseconds());
        let projected_ms = elapsed_ms * i128::from(self.total) / i128::from(self.completed);
        let projected = TimeDelta::try_milliseconds(i64::try_from(projected_ms).ok()?)?;
        self.start_time.checked_add_signed(projected)
    }

    /// Enter the session scope
    ///
    /// Sends the initial progress message and arms the rate gates. The returned
    /// guard terminates the session when dropped.
    pub fn enter(&mut self) -> Result<ActiveSession<'_>, UsageError> {
        debug!(title = %self.title, state = ?self.state, "Session::enter: called");
        match self.state {
            SessionState::Configured => {}
            SessionState::Active => {
                return Err(UsageError::AlreadyActive {
                    title: self.title.clone(),
                });
            }
            SessionState::Terminated => {
                return Err(UsageError::Terminated {
                    title: self.title.clone(),
                });
            }
        }

        let now = self.clock.now();
        self.start_time = now;
        self.completed = 0;
        self.update_gate.arm(now, self.config.first_update);
        self.warnings.arm(now, self.config.first_warning);

        let text = self.compose_entry();
        match self.messenger.send(&text, self.reply_target) {
            Some(id) => self.progress = ProgressMessage::Pending(id),
            None => {
                warn!(title = %self.title, "Could not send the initial progress message, will retry on the next report");
            }
        }

        self.state = SessionState::Active;
        info!(title = %self.title, total = self.total, "Started reporting loop");
        Ok(ActiveSession {
            session: self,
            failure: None,
        })
    }

    /// Run `body` inside the session scope
    ///
    /// An `Err` from the body is reflected in the final summary and then returned.
    pub fn run<R, E, F>(&mut self, body: F) -> Result<R, E>
    where
        F: FnOnce(&mut ActiveSession<'_>) -> Result<R, E>,
        E: From<UsageError> + fmt::Display,
    {
        let mut scope = self.enter()?;
        let result = body(&mut scope);
        if let Err(e) = &result {
            debug!(error = %e, "Session::run: loop body failed");
            scope.fail(e);
        }
        drop(scope);
        result
    }

    fn require_active(&self, operation: &'static str) -> Result<(), UsageError> {
        if self.is_active() {
            Ok(())
        } else {
            debug!(operation, state = ?self.state, "Session::require_active: rejected");
            Err(UsageError::NotActive { operation })
        }
    }

    /// Add `n` completed iterations without reporting
    ///
    /// Exceeding the expected total raises a warning, not an error.
    pub fn count(&mut self, n: u64) -> Result<(), UsageError> {
        self.require_active("count")?;
        self.completed = self.completed.saturating_add(n);
        debug!(n, completed = self.completed, "Session::count: called");
        if self.completed > self.total {
            let text = format!(
                "The iterations count has surpassed the number of iterations expected. \
                 The number of iterations expected was {} and now I have already counted {} iterations.",
                self.total, self.completed
            );
            self.warn(text)?;
        }
        Ok(())
    }

    /// Mark the loop as done even though not every iteration was counted
    pub fn set_completed(&mut self) -> Result<(), UsageError> {
        self.require_active("set_completed")?;
        debug!(completed = self.completed, total = self.total, "Session::set_completed: called");
        self.completed = self.total;
        Ok(())
    }

    /// Count `n` iterations and report if the update interval has passed
    pub fn update(&mut self, n: u64) -> Result<(), UsageError> {
        self.require_active("update")?;
        self.count(n)?;
        let now = self.clock.now();
        if self.update_gate.is_open(now) {
            debug!(completed = self.completed, "Session::update: gate open, reporting");
            self.emit_report(now);
            self.update_gate.mark(now);
        }
        self.flush_at(now, false);
        Ok(())
    }

    /// Report the current status right away, ignoring the update interval
    pub fn report(&mut self) -> Result<(), UsageError> {
        self.require_active("report")?;
        let now = self.clock.now();
        self.emit_report(now);
        Ok(())
    }

    /// Buffer a warning and flush if the aggregation window allows it
    pub fn warn(&mut self, text: impl AsRef<str>) -> Result<(), UsageError> {
        self.require_active("warn")?;
        let text = text.as_ref();
        debug!(text_len = text.len(), "Session::warn: called");
        self.warnings.record(text);
        let now = self.clock.now();
        self.flush_at(now, false);
        Ok(())
    }

    /// Try to deliver buffered warnings; `force` bypasses the aggregation window
    pub fn flush_warnings(&mut self, force: bool) -> Result<(), UsageError> {
        self.require_active("flush_warnings")?;
        let now = self.clock.now();
        self.flush_at(now, force);
        Ok(())
    }

    /// Create a child session whose messages reply to this session's progress message
    pub fn subloop(&self, total: u64, config: SessionConfig) -> Result<Session, UsageError> {
        debug!(total, name = ?config.name, "Session::subloop: called");
        if !self.is_active() {
            return Err(UsageError::IllegalNesting);
        }
        if self.progress.id().is_none() {
            debug!(parent = %self.title, "Session::subloop: parent has no progress message, child will not be threaded");
        }
        Ok(Session::new(
            self.messenger.clone(),
            self.clock.clone(),
            total,
            config,
            self.progress.id(),
        ))
    }

    fn emit_report(&mut self, now: DateTime<Local>) {
        let text = self.compose_report(now);
        self.deliver_progress(&text);
    }

    /// Edit the progress message, or send it if it does not exist yet
    fn deliver_progress(&mut self, text: &str) {
        match self.progress {
            ProgressMessage::Unset => {
                if let Some(id) = self.messenger.send(text, self.reply_target) {
                    debug!(%id, "Session::deliver_progress: progress message created");
                    self.progress = ProgressMessage::Pending(id);
                }
            }
            ProgressMessage::Pending(id) | ProgressMessage::Edited(id) => {
                if self.messenger.edit(id, text) {
                    self.progress = ProgressMessage::Edited(id);
                }
            }
        }
    }

    fn flush_at(&mut self, now: DateTime<Local>, force: bool) {
        if !self.warnings.is_due(now, force) {
            return;
        }
        // Warnings are replies to their loop; without a progress message they wait
        let Some(target) = self.progress.id() else {
            debug!("Session::flush_at: no progress message yet, deferring warnings");
            return;
        };
        let Some(message) = self.warnings.compose() else {
            return;
        };
        let delivered = self.messenger.send(&message, Some(target)).is_some();
        self.warnings.finish_flush(now, delivered);
    }

    /// Tear the session down: flush warnings, publish the summary, reply "Finished!"
    fn exit(&mut self, failure: Option<&str>) {
        debug!(title = %self.title, state = ?self.state, ?failure, "Session::exit: called");
        if self.state != SessionState::Active {
            return;
        }
        let now = self.clock.now();
        let summary = self.compose_summary(now, failure);

        if self.progress.id().is_some() {
            self.flush_at(now, true);
            self.deliver_progress(&summary);
        } else {
            // Publish the summary first so the pending warnings have something to reply to
            self.deliver_progress(&summary);
            self.flush_at(now, true);
        }

        if let Some(id) = self.progress.id() {
            self.messenger.send(FINISHED_TEXT, Some(id));
        }

        let undelivered = self.warnings.buffer().total();
        if undelivered > 0 {
            warn!(title = %self.title, undelivered, "Some warnings could not be delivered");
        }

        self.state = SessionState::Terminated;
        info!(
            title = %self.title,
            completed = self.completed,
            total = self.total,
            outcome = ?self.outcome(),
            "Finished reporting loop"
        );
    }

    fn compose_entry(&self) -> String {
        let mut text = format!(
            "🕰️ Starting \"{}\"...\nToday/now it is {}\nThe next update of this message should be in {}",
            self.title,
            timestamp(self.start_time),
            natural_interval(self.config.min_update_interval)
        );
        match self.config.first_update {
            GateStart::AfterInterval => text.push('.'),
            GateStart::Immediate => {
                text.push_str(" or the time it takes for the loop to complete one iteration, whatever happens first.")
            }
        }
        text
    }

    fn compose_report(&self, now: DateTime<Local>) -> String {
        let mut text = format!("🕰️ {}\n\n", self.title);
        text.push_str(&format!("{} | Started\n", timestamp(self.start_time)));
        match self.expected_finish_at(now) {
            Some(finish) => {
                text.push_str(&format!("{} | Expected finish\n", timestamp(finish)));
                text.push_str(&format!("{} | Remaining\n", natural_time(finish - now)));
            }
            None => {
                text.push_str("Unknown | Expected finish\n");
                text.push_str("Unknown | Remaining\n");
            }
        }
        text.push('\n');
        text.push_str(&format!("{}/{} | {} %\n\n", self.completed, self.total, self.percentage()));
        text.push_str(&format!("Last update of this message: {}\n", timestamp(now)));
        text.push_str(&format!(
            "The next update of this message should be in {}.",
            natural_interval(self.config.min_update_interval)
        ));
        text
    }

    fn compose_summary(&self, now: DateTime<Local>, failure: Option<&str>) -> String {
        let outcome = self.outcome();
        let mut text = match outcome {
            Outcome::Completed => format!("✅ {}\n\n", self.title),
            Outcome::Incomplete => format!("{}\n\n💥 FINISHED WITHOUT REACHING 100 %\n\n", self.title),
            Outcome::Overrun => format!("{}\n\n⚠️ FINISHED WITH MORE ITERATIONS THAN EXPECTED\n\n", self.title),
        };
        if outcome != Outcome::Completed {
            if let Some(reason) = failure {
                text.push_str(&format!("Reason: {}\n\n", reason));
            }
        }
        text.push_str(&format!("Finished on {}\n", timestamp(now)));
        text.push_str(&format!("Total elapsed time: {}\n", natural_delta(now - self.start_time)));
        if outcome != Outcome::Completed {
            text.push_str(&format!(
                "Progress: {} iterations ({} %)\n",
                self.completed,
                self.percentage()
            ));
        }
        if outcome == Outcome::Incomplete {
            if let Some(finish) = self.expected_finish_at(now) {
                text.push_str(&format!("Expected missing time: {}\n", natural_delta(finish - now)));
            }
        }
        text
    }
}

/// Guard for an active session; dropping it terminates the session
pub struct ActiveSession<'a> {
    session: &'a mut Session,
    failure: Option<String>,
}

impl ActiveSession<'_> {
    /// Record why the loop is ending, shown in the final summary
    pub fn fail(&mut self, reason: impl fmt::Display) {
        self.failure = Some(reason.to_string());
    }

    /// End the scope now
    pub fn finish(self) {}
}

impl Deref for ActiveSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for ActiveSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        let failure = self
            .failure
            .take()
            .or_else(|| std::thread::panicking().then(|| "the loop panicked".to_string()));
        self.session.exit(failure.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telegram::client::mock::{Call, MockTransport};

    fn setup(total: u64, config: SessionConfig) -> (Arc<MockTransport>, Arc<ManualClock>, Session) {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::default());
        let session = Session::new(
            SafeMessenger::new(transport.clone()),
            clock.clone(),
            total,
            config,
            None,
        );
        (transport, clock, session)
    }

    fn fast() -> SessionConfig {
        SessionConfig::named("test loop")
            .with_update_interval(Duration::ZERO)
            .with_warn_interval(Duration::ZERO)
    }

    #[test]
    fn test_default_title_is_timestamped() {
        let (_, _, session) = setup(3, SessionConfig::default());
        assert!(session.title().starts_with("Loop started on "));
        assert_eq!(session.state(), SessionState::Configured);
    }

    #[test]
    fn test_operations_require_active_scope() {
        let (transport, _, mut session) = setup(3, fast());

        assert_eq!(session.update(1), Err(UsageError::NotActive { operation: "update" }));
        assert_eq!(session.count(1), Err(UsageError::NotActive { operation: "count" }));
        assert_eq!(session.warn("x"), Err(UsageError::NotActive { operation: "warn" }));
        assert_eq!(
            session.set_completed(),
            Err(UsageError::NotActive {
                operation: "set_completed"
            })
        );
        assert_eq!(session.report(), Err(UsageError::NotActive { operation: "report" }));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_enter_sends_initial_message() {
        let (transport, _, mut session) = setup(3, fast());

        let scope = session.enter().unwrap();
        assert!(scope.is_active());
        assert_eq!(scope.progress_message(), ProgressMessage::Pending(MessageId(100)));

        let sends = transport.sends();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].0.starts_with("🕰️ Starting \"test loop\"..."));
        assert_eq!(sends[0].1, None);
    }

    #[test]
    fn test_update_edits_progress_message() {
        let (transport, _, mut session) = setup(4, fast());
        {
            let mut scope = session.enter().unwrap();
            scope.update(1).unwrap();
            assert_eq!(scope.progress_message(), ProgressMessage::Edited(MessageId(100)));
        }

        let edits = transport.edits();
        // one report plus the final summary
        assert_eq!(edits.len(), 2);
        assert!(edits[0].1.contains("1/4 | 25 %"));
        assert!(edits.iter().all(|(id, _)| *id == MessageId(100)));
    }

    #[test]
    fn test_update_is_rate_gated() {
        let (transport, clock, mut session) = setup(100, SessionConfig::named("gated"));
        let mut scope = session.enter().unwrap();

        scope.update(1).unwrap();
        clock.advance(Duration::from_secs(30));
        scope.update(1).unwrap();
        assert!(transport.edits().is_empty());

        clock.advance(Duration::from_secs(30));
        scope.update(1).unwrap();
        assert_eq!(transport.edits().len(), 1);
        assert!(transport.edits()[0].1.contains("3/100 | 3 %"));

        clock.advance(Duration::from_secs(59));
        scope.update(1).unwrap();
        assert_eq!(transport.edits().len(), 1);
        assert_eq!(scope.completed(), 4);
    }

    #[test]
    fn test_immediate_first_update() {
        let config = SessionConfig::named("eager").with_first_update(GateStart::Immediate);
        let (transport, _, mut session) = setup(10, config);
        let mut scope = session.enter().unwrap();

        scope.update(1).unwrap();
        assert_eq!(transport.edits().len(), 1);
        scope.update(1).unwrap();
        assert_eq!(transport.edits().len(), 1);
    }

    #[test]
    fn test_report_without_initial_message_sends_fresh() {
        let (transport, _, mut session) = setup(10, fast());
        transport.set_failing(true);
        let mut scope = session.enter().unwrap();
        assert_eq!(scope.progress_message(), ProgressMessage::Unset);

        transport.set_failing(false);
        scope.update(1).unwrap();
        assert_eq!(scope.progress_message(), ProgressMessage::Pending(MessageId(100)));

        scope.update(1).unwrap();
        assert_eq!(scope.progress_message(), ProgressMessage::Edited(MessageId(100)));
    }

    #[test]
    fn test_report_text() {
        let (transport, clock, mut session) = setup(10, fast());
        let mut scope = session.enter().unwrap();
        clock.advance(Duration::from_secs(60));
        scope.count(5).unwrap();
        scope.report().unwrap();

        let (_, text) = transport.edits().remove(0);
        assert!(text.starts_with("🕰️ test loop\n\n"));
        assert!(text.contains("| Started\n"));
        assert!(text.contains("| Expected finish\n"));
        assert!(text.contains("a minute from now | Remaining\n"));
        assert!(text.contains("5/10 | 50 %"));
        assert!(text.contains("The next update of this message should be in a moment."));
    }

    #[test]
    fn test_report_unknown_before_first_iteration() {
        let (transport, _, mut session) = setup(10, fast());
        let mut scope = session.enter().unwrap();
        scope.report().unwrap();

        let (_, text) = transport.edits().remove(0);
        assert!(text.contains("Unknown | Expected finish\nUnknown | Remaining\n"));
        assert!(text.contains("0/10 | 0 %"));
    }

    #[test]
    fn test_expected_finish_extrapolates() {
        let (_, clock, mut session) = setup(10, fast());
        let mut scope = session.enter().unwrap();
        let start = scope.start_time();
        assert_eq!(scope.expected_finish(), None);

        clock.advance(Duration::from_secs(20));
        scope.count(2).unwrap();
        assert_eq!(scope.expected_finish(), Some(start + TimeDelta::seconds(100)));
    }

    #[test]
    fn test_count_overrun_warns() {
        let (transport, _, mut session) = setup(100, fast());
        let mut scope = session.enter().unwrap();

        assert!(scope.count(150).is_ok());
        assert_eq!(scope.completed(), 150);

        let sends = transport.sends();
        let warning = &sends[1];
        assert!(warning.0.contains("150"));
        assert!(warning.0.contains("100"));
        assert_eq!(warning.1, Some(MessageId(100)));
    }

    #[test]
    fn test_set_completed_marks_success() {
        let (transport, _, mut session) = setup(99, fast());
        {
            let mut scope = session.enter().unwrap();
            scope.update(10).unwrap();
            scope.set_completed().unwrap();
            assert_eq!(scope.completed(), 99);
        }

        let (_, summary) = transport.edits().pop().unwrap();
        assert!(summary.starts_with("✅ test loop"));
        assert!(!summary.contains("Progress:"));
    }

    #[test]
    fn test_exit_sends_summary_and_finished_reply() {
        let (transport, _, mut session) = setup(3, fast());
        {
            let _scope = session.enter().unwrap();
        }

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[1], Call::Edit { message_id, .. } if *message_id == MessageId(100)));
        assert_eq!(
            calls[2],
            Call::Send {
                text: FINISHED_TEXT.to_string(),
                reply_to: Some(MessageId(100))
            }
        );
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_incomplete_summary_with_reason() {
        let (transport, clock, mut session) = setup(10, fast());
        {
            let mut scope = session.enter().unwrap();
            clock.advance(Duration::from_secs(10));
            scope.update(1).unwrap();
            scope.fail("RuntimeError: Oh no!! An error!!!");
        }

        let (_, summary) = transport.edits().pop().unwrap();
        assert!(summary.contains("💥 FINISHED WITHOUT REACHING 100 %"));
        assert!(summary.contains("Reason: RuntimeError: Oh no!! An error!!!"));
        assert!(summary.contains("Total elapsed time: 10 seconds"));
        assert!(summary.contains("Progress: 1 iterations (10 %)"));
        assert!(summary.contains("Expected missing time: a minute"));
    }

    #[test]
    fn test_overrun_summary_is_not_success() {
        let (transport, _, mut session) = setup(2, fast());
        {
            let mut scope = session.enter().unwrap();
            scope.update(3).unwrap();
        }

        let (_, summary) = transport.edits().pop().unwrap();
        assert!(!summary.starts_with("✅"));
        assert!(summary.contains("MORE ITERATIONS THAN EXPECTED"));
        assert!(summary.contains("Progress: 3 iterations (150 %)"));
    }

    #[test]
    fn test_cannot_reenter() {
        let (_, _, mut session) = setup(1, fast());
        drop(session.enter().unwrap());

        assert!(matches!(session.enter(), Err(UsageError::Terminated { .. })));
        assert_eq!(session.update(1), Err(UsageError::NotActive { operation: "update" }));
    }

    #[test]
    fn test_cannot_enter_twice() {
        let (_, _, mut session) = setup(1, fast());
        let mut scope = session.enter().unwrap();

        assert!(matches!(scope.enter(), Err(UsageError::AlreadyActive { .. })));
    }

    #[test]
    fn test_warnings_deferred_without_progress_message() {
        let (transport, _, mut session) = setup(10, fast());
        transport.set_failing(true);
        let mut scope = session.enter().unwrap();
        transport.set_failing(false);
        transport.clear();

        scope.warn("lonely").unwrap();
        assert!(transport.calls().is_empty());
        assert_eq!(scope.pending_warnings().count_of("lonely"), Some(1));

        // The next report creates the progress message, the flush after it goes out
        scope.update(1).unwrap();
        let sends = transport.sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[1], ("lonely".to_string(), Some(MessageId(100))));
        assert!(scope.pending_warnings().is_empty());
    }

    #[test]
    fn test_failed_flush_retains_warnings() {
        let (transport, clock, mut session) = setup(10, SessionConfig::named("w"));
        let mut scope = session.enter().unwrap();
        clock.advance(Duration::from_secs(60));

        transport.set_failing(true);
        scope.warn("A").unwrap();
        assert_eq!(scope.pending_warnings().count_of("A"), Some(1));

        transport.set_failing(false);
        scope.warn("A").unwrap();
        // still inside the window opened by the failed attempt
        assert_eq!(scope.pending_warnings().count_of("A"), Some(2));

        clock.advance(Duration::from_secs(60));
        scope.flush_warnings(false).unwrap();
        assert!(scope.pending_warnings().is_empty());
        let (text, _) = transport.sends().pop().unwrap();
        assert!(text.contains("This warning happened 2 times"));
    }

    #[test]
    fn test_exit_forces_warning_flush() {
        let (transport, _, mut session) = setup(10, SessionConfig::named("w"));
        {
            let mut scope = session.enter().unwrap();
            scope.warn("pending").unwrap();
            assert!(transport.sends().len() == 1);
        }

        let calls = transport.calls();
        // entry, forced flush, summary edit, finished reply
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[1],
            Call::Send {
                text: "pending".to_string(),
                reply_to: Some(MessageId(100))
            }
        );
    }

    #[test]
    fn test_exit_without_progress_message_sends_summary_first() {
        let (transport, _, mut session) = setup(10, SessionConfig::named("offline"));
        transport.set_failing(true);
        {
            let mut scope = session.enter().unwrap();
            scope.warn("queued").unwrap();
            transport.set_failing(false);
        }

        let sends = transport.sends();
        // failed entry, summary, queued warning, finished
        assert_eq!(sends.len(), 4);
        assert!(sends[1].0.contains("offline"));
        assert_eq!(sends[2], ("queued".to_string(), Some(MessageId(100))));
        assert_eq!(sends[3], (FINISHED_TEXT.to_string(), Some(MessageId(100))));
    }

    #[test]
    fn test_teardown_survives_transport_failure() {
        let (transport, _, mut session) = setup(10, fast());
        {
            let mut scope = session.enter().unwrap();
            scope.warn("x").unwrap();
            transport.set_failing(true);
            scope.update(1).unwrap();
        }
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_run_reports_body_error() {
        let (transport, _, mut session) = setup(10, fast());

        let result: eyre::Result<()> = session.run(|scope| {
            scope.update(1)?;
            Err(eyre::eyre!("boom"))
        });

        assert_eq!(result.unwrap_err().to_string(), "boom");
        let (_, summary) = transport.edits().pop().unwrap();
        assert!(summary.contains("Reason: boom"));
    }

    #[test]
    fn test_run_propagates_usage_error() {
        let (_, _, mut session) = setup(1, fast());
        drop(session.enter().unwrap());

        let result: eyre::Result<()> = session.run(|_| Ok(()));
        assert!(result.unwrap_err().to_string().contains("re-entered"));
    }

    #[test]
    fn test_subloop_replies_to_parent() {
        let (transport, _, mut session) = setup(2, fast());
        let mut scope = session.enter().unwrap();

        let mut child = scope.subloop(5, SessionConfig::named("child")).unwrap();
        assert_eq!(child.reply_target(), Some(MessageId(100)));
        {
            let mut child_scope = child.enter().unwrap();
            child_scope.warn("inside").unwrap();
        }

        let sends = transport.sends();
        assert_eq!(sends[1].1, Some(MessageId(100)));
        // child's own warnings reply to the child's progress message
        assert_eq!(sends[2], ("inside".to_string(), Some(MessageId(101))));
        scope.update(1).unwrap();
        assert!(scope.is_active());
    }

    #[test]
    fn test_subloop_requires_active_parent() {
        let (_, _, session) = setup(2, fast());
        assert_eq!(
            session.subloop(1, SessionConfig::default()).unwrap_err(),
            UsageError::IllegalNesting
        );
    }

    #[test]
    fn test_percentage_with_zero_total() {
        let (_, _, mut session) = setup(0, fast());
        let scope = session.enter().unwrap();
        assert_eq!(scope.percentage(), 100);
        assert_eq!(scope.outcome(), Outcome::Completed);
    }

    #[test]
    fn test_percentage_saturates_on_huge_overrun() {
        let (_, _, mut session) = setup(1, fast());
        let mut scope = session.enter().unwrap();
        scope.count(u64::MAX).unwrap();

        assert_eq!(scope.completed(), u64::MAX);
        assert_eq!(scope.percentage(), u64::MAX);
        assert_eq!(scope.outcome(), Outcome::Overrun);
    }

    #[test]
    fn test_subloop_of_unsent_parent_is_not_threaded() {
        let (transport, _, mut session) = setup(2, fast());
        transport.set_failing(true);
        let scope = session.enter().unwrap();
        assert_eq!(scope.progress_message(), ProgressMessage::Unset);

        let child = scope.subloop(3, fast()).unwrap();
        assert_eq!(child.reply_target(), None);
    }
}
