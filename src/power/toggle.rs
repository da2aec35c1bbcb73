//! Power toggle: decision table, availability check, transition request and
//! the wait loop that polls until the controller reports the desired state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AmtError, Result};
use crate::power::state::PowerState;
use crate::power::PowerControl;

/// What the toggle will request and what it then waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TogglePlan {
    pub from: PowerState,
    pub request: PowerState,
    /// A graceful off is reported as plain Off - Soft once complete
    pub desired: PowerState,
}

/// On -> Off (graceful when offered), anything else -> On.
pub fn choose_transition(observed: PowerState, available: &[PowerState], prefer_graceful: bool) -> TogglePlan {
    if observed == PowerState::ON {
        let request = if prefer_graceful && available.contains(&PowerState::OFF_SOFT_GRACEFUL) {
            PowerState::OFF_SOFT_GRACEFUL
        } else {
            PowerState::OFF_SOFT
        };
        TogglePlan {
            from: observed,
            request,
            desired: PowerState::OFF_SOFT,
        }
    } else {
        TogglePlan {
            from: observed,
            request: PowerState::ON,
            desired: PowerState::ON,
        }
    }
}

/// Off states disappear from the list while KVM or IDER sessions are active.
pub fn ensure_available(target: PowerState, available: &[PowerState]) -> Result<()> {
    if available.contains(&target) {
        Ok(())
    } else {
        Err(AmtError::TargetUnavailable {
            target,
            available: available.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    /// None = poll until cancelled
    pub deadline: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOutcome {
    pub polls: usize,
    /// States that produced a status line, in order
    pub announced: Vec<PowerState>,
}

/// Poll until `desired` is observed. A status line is emitted on the first
/// observation and whenever the observed state changes, never for repeats.
pub async fn wait_for_power_state(
    control: &dyn PowerControl,
    desired: PowerState,
    options: &WaitOptions,
    cancel: &CancellationToken,
) -> Result<WaitOutcome> {
    let deadline = options.deadline.map(|d| Instant::now() + d);
    let mut outcome = WaitOutcome::default();
    let mut last_observed: Option<PowerState> = None;

    loop {
        let read = unless_cancelled(cancel, read_before(deadline, control.current_power_state()));
        let observed = match read.await? {
            Some(state) => state,
            None => {
                return Err(AmtError::WaitTimedOut {
                    desired,
                    last_observed,
                })
            }
        };
        outcome.polls += 1;

        if observed == desired {
            info!("The power state is now {}.", observed);
            outcome.announced.push(observed);
            return Ok(outcome);
        }

        if last_observed != Some(observed) {
            info!("Waiting for the power state to change from {} to {}...", observed, desired);
            outcome.announced.push(observed);
            last_observed = Some(observed);
        } else {
            debug!("Power state still {} (poll {})", observed, outcome.polls);
        }

        let mut wake = Instant::now() + options.poll_interval;
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(AmtError::WaitTimedOut {
                    desired,
                    last_observed: Some(observed),
                });
            }
            wake = wake.min(deadline);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AmtError::Cancelled),
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}

/// Run a controller call unless the token fires first.
async fn unless_cancelled<T>(cancel: &CancellationToken, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AmtError::Cancelled),
        result = call => result,
    }
}

/// `Ok(None)` when the deadline passes before the read answers.
async fn read_before(
    deadline: Option<Instant>,
    read: impl Future<Output = Result<PowerState>>,
) -> Result<Option<PowerState>> {
    match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
            Ok(state) => state.map(Some),
            Err(_) => Ok(None),
        },
        None => read.await.map(Some),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleOptions {
    pub prefer_graceful: bool,
    pub dry_run: bool,
    pub wait: WaitOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    DryRun(TogglePlan),
    Reached { plan: TogglePlan, wait: WaitOutcome },
}

/// Read state, pick the target, request it once, then wait for it.
pub async fn toggle_power(
    control: &dyn PowerControl,
    options: &ToggleOptions,
    cancel: &CancellationToken,
) -> Result<ToggleOutcome> {
    let observed = unless_cancelled(cancel, control.current_power_state()).await?;
    let available = unless_cancelled(cancel, control.available_states()).await?;

    let plan = choose_transition(observed, &available, options.prefer_graceful);
    ensure_available(plan.request, &available)?;

    if options.dry_run {
        info!(
            "[DRY RUN] Would toggle the power state from {} to {} and wait for {}",
            plan.from, plan.request, plan.desired
        );
        return Ok(ToggleOutcome::DryRun(plan));
    }

    info!("Toggling the power state from {} to {}...", plan.from, plan.request);
    unless_cancelled(cancel, control.request_transition(plan.request)).await?;

    let wait = wait_for_power_state(control, plan.desired, &options.wait, cancel).await?;
    Ok(ToggleOutcome::Reached { plan, wait })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const OFF: PowerState = PowerState::OFF_SOFT;
    const ON: PowerState = PowerState::ON;
    const GRACEFUL: PowerState = PowerState::OFF_SOFT_GRACEFUL;

    /// Replays scripted reads; the last one repeats forever.
    struct ScriptedControl {
        reads: Mutex<VecDeque<Result<PowerState>>>,
        last: Mutex<PowerState>,
        available: Vec<PowerState>,
        requested: Mutex<Vec<PowerState>>,
        read_count: Mutex<usize>,
    }

    impl ScriptedControl {
        fn new(reads: Vec<PowerState>, available: Vec<PowerState>) -> Self {
            let first = reads[0];
            Self {
                reads: Mutex::new(reads.into_iter().map(Ok).collect()),
                last: Mutex::new(first),
                available,
                requested: Mutex::new(Vec::new()),
                read_count: Mutex::new(0),
            }
        }

        fn requested(&self) -> Vec<PowerState> {
            self.requested.lock().unwrap().clone()
        }

        fn read_total(&self) -> usize {
            *self.read_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl PowerControl for ScriptedControl {
        async fn current_power_state(&self) -> Result<PowerState> {
            *self.read_count.lock().unwrap() += 1;
            let next = self.reads.lock().unwrap().pop_front();
            match next {
                Some(Ok(state)) => {
                    *self.last.lock().unwrap() = state;
                    Ok(state)
                }
                Some(Err(e)) => Err(e),
                None => Ok(*self.last.lock().unwrap()),
            }
        }

        async fn available_states(&self) -> Result<Vec<PowerState>> {
            Ok(self.available.clone())
        }

        async fn request_transition(&self, target: PowerState) -> Result<()> {
            self.requested.lock().unwrap().push(target);
            Ok(())
        }
    }

    fn options(deadline: Option<Duration>) -> ToggleOptions {
        ToggleOptions {
            prefer_graceful: true,
            dry_run: false,
            wait: WaitOptions {
                poll_interval: Duration::from_secs(1),
                deadline,
            },
        }
    }

    #[test]
    fn on_prefers_graceful_off_when_offered() {
        let plan = choose_transition(ON, &[ON, OFF, GRACEFUL], true);
        assert_eq!(plan.request, GRACEFUL);
        assert_eq!(plan.desired, OFF);
    }

    #[test]
    fn on_falls_back_to_abrupt_off() {
        let plan = choose_transition(ON, &[OFF], true);
        assert_eq!(plan.request, OFF);
        assert_eq!(plan.desired, OFF);

        let forced = choose_transition(ON, &[OFF, GRACEFUL], false);
        assert_eq!(forced.request, OFF);
    }

    #[test]
    fn anything_else_turns_on() {
        for observed in [OFF, PowerState::OFF_HARD, PowerState(4), PowerState(0), PowerState(99)] {
            for available in [vec![], vec![ON], vec![OFF, GRACEFUL]] {
                let plan = choose_transition(observed, &available, true);
                assert_eq!(plan.request, ON);
                assert_eq!(plan.desired, ON);
                assert_eq!(plan.from, observed);
            }
        }
    }

    #[tokio::test]
    async fn unavailable_target_never_requests_transition() {
        // KVM session active: only On is offered while the machine is on
        let control = ScriptedControl::new(vec![ON], vec![ON]);
        let err = toggle_power(&control, &options(None), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AmtError::TargetUnavailable { target, available } => {
                assert_eq!(target, OFF);
                assert_eq!(available, vec![ON]);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(control.requested().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_and_announces_only_changes() {
        let control = ScriptedControl::new(vec![OFF, OFF, OFF, ON], vec![]);
        let outcome = wait_for_power_state(
            &control,
            ON,
            &WaitOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.polls, 4);
        assert_eq!(outcome.announced, vec![OFF, ON]);
        assert_eq!(control.read_total(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn announces_again_when_observed_state_changes() {
        let sleeping = PowerState(4);
        let control = ScriptedControl::new(vec![OFF, sleeping, sleeping, OFF, ON], vec![]);
        let outcome = wait_for_power_state(&control, ON, &WaitOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.announced, vec![OFF, sleeping, OFF, ON]);
        assert_eq!(outcome.polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_on_machine_off_gracefully() {
        // initial read, then three polls after the request
        let control = ScriptedControl::new(vec![ON, ON, ON, OFF], vec![OFF, GRACEFUL]);
        let outcome = toggle_power(&control, &options(None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(control.requested(), vec![GRACEFUL]);
        match outcome {
            ToggleOutcome::Reached { plan, wait } => {
                assert_eq!(plan.request, GRACEFUL);
                assert_eq!(plan.desired, OFF);
                assert_eq!(wait.polls, 3);
                assert_eq!(wait.announced, vec![ON, OFF]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dry_run_skips_request() {
        let control = ScriptedControl::new(vec![OFF], vec![ON]);
        let mut opts = options(None);
        opts.dry_run = true;

        let outcome = toggle_power(&control, &opts, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, ToggleOutcome::DryRun(plan) if plan.request == ON));
        assert!(control.requested().is_empty());
        assert_eq!(control.read_total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_the_wait() {
        let control = ScriptedControl::new(vec![OFF], vec![]);
        let wait = WaitOptions {
            poll_interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(3)),
        };
        let err = wait_for_power_state(&control, ON, &wait, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AmtError::WaitTimedOut { desired, last_observed } => {
                assert_eq!(desired, ON);
                assert_eq!(last_observed, Some(OFF));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // polls at t=0,1,2,3
        assert_eq!(control.read_total(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let control = ScriptedControl::new(vec![OFF], vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = wait_for_power_state(&control, ON, &WaitOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AmtError::Cancelled));
        assert_eq!(control.read_total(), 3);
    }

    /// Answers `answered` reads with Off, then never answers again.
    struct HungControl {
        answered: usize,
        available: Vec<PowerState>,
        hang_transition: bool,
        read_count: Mutex<usize>,
        requested: Mutex<Vec<PowerState>>,
    }

    impl HungControl {
        fn new(answered: usize) -> Self {
            Self {
                answered,
                available: vec![ON],
                hang_transition: false,
                read_count: Mutex::new(0),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PowerControl for HungControl {
        async fn current_power_state(&self) -> Result<PowerState> {
            let count = {
                let mut reads = self.read_count.lock().unwrap();
                *reads += 1;
                *reads
            };
            if count <= self.answered {
                return Ok(OFF);
            }
            std::future::pending::<Result<PowerState>>().await
        }

        async fn available_states(&self) -> Result<Vec<PowerState>> {
            Ok(self.available.clone())
        }

        async fn request_transition(&self, target: PowerState) -> Result<()> {
            self.requested.lock().unwrap().push(target);
            if self.hang_transition {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_read_that_never_answers() {
        let control = HungControl::new(0);
        let wait = WaitOptions {
            poll_interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(5)),
        };
        let started = Instant::now();
        let err = wait_for_power_state(&control, ON, &wait, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AmtError::WaitTimedOut { desired, last_observed: None } if desired == ON));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_last_observed_state_when_a_later_read_hangs() {
        let control = HungControl::new(2);
        let wait = WaitOptions {
            poll_interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(5)),
        };
        let started = Instant::now();
        let err = wait_for_power_state(&control, ON, &wait, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AmtError::WaitTimedOut { last_observed: Some(OFF), .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(*control.read_count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_toggle_before_first_read_answers() {
        let control = HungControl::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = toggle_power(&control, &options(None), &cancel).await.unwrap_err();
        assert!(matches!(err, AmtError::Cancelled));
        assert!(control.requested.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_a_hung_transition_request() {
        let mut control = HungControl::new(usize::MAX);
        control.hang_transition = true;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = toggle_power(&control, &options(None), &cancel).await.unwrap_err();
        assert!(matches!(err, AmtError::Cancelled));
        assert_eq!(*control.requested.lock().unwrap(), vec![ON]);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn read_errors_propagate() {
        let control = ScriptedControl::new(vec![OFF], vec![]);
        control.reads.lock().unwrap().push_front(Err(AmtError::Auth));
        let err = wait_for_power_state(&control, ON, &WaitOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AmtError::Auth));
    }
}
