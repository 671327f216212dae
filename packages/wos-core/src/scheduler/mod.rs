//! The outer loop: tick a [`Pipeline`], then sleep, forever (or until told
//! to stop).

use std::{fmt::Debug, thread, time::Duration};

use color_print::cprintln;
use log::{error, info, warn};

pub mod interval;

pub use interval::IntervalPolicy;

/// Whether a tick did something, which decides how long to sleep after it
pub trait TickReport: Debug {
    fn acted(&self) -> bool;
}

/// One "capture → match → dispatch" pass
pub trait Pipeline {
    type Outcome: TickReport;

    fn name(&self) -> &str;

    fn tick(&mut self) -> anyhow::Result<Self::Outcome>;

    /// Called after a failed tick, before sleeping
    fn recover(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: usize,
    pub acted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    /// Sleep after an idle tick
    pub interval: IntervalPolicy,
    /// Sleep after a tick that acted, `interval` if not set
    pub after_action: Option<IntervalPolicy>,
    /// Sleep after a failed tick, `interval` if not set
    pub recovery_delay: Option<Duration>,
}

impl Scheduler {
    pub fn new(interval: IntervalPolicy) -> Self {
        Self {
            interval,
            after_action: None,
            recovery_delay: None,
        }
    }

    pub fn with_after_action(mut self, policy: IntervalPolicy) -> Self {
        self.after_action = Some(policy);
        self
    }

    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = Some(delay);
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.interval.validate()?;
        if let Some(policy) = &self.after_action {
            policy.validate()?;
        }
        Ok(())
    }

    /// Tick `pipeline` until `should_continue` says no. It is asked after
    /// every tick, before sleeping, so at least one tick always runs.
    pub fn run<P: Pipeline>(
        &self,
        pipeline: &mut P,
        should_continue: impl FnMut() -> bool,
    ) -> RunStats {
        self.run_with(pipeline, should_continue, thread::sleep)
    }

    /// [`Scheduler::run`] with a custom sleep
    pub fn run_with<P: Pipeline>(
        &self,
        pipeline: &mut P,
        mut should_continue: impl FnMut() -> bool,
        mut sleep: impl FnMut(Duration),
    ) -> RunStats {
        let mut stats = RunStats::default();
        cprintln!("<s><g>[Scheduler]</g></s>: starting {}", pipeline.name());
        loop {
            stats.ticks += 1;
            let delay = match pipeline.tick() {
                Ok(outcome) => {
                    info!(
                        "[Scheduler]: {} tick #{}: {:?}",
                        pipeline.name(),
                        stats.ticks,
                        outcome
                    );
                    match (&self.after_action, outcome.acted()) {
                        (Some(policy), true) => {
                            stats.acted += 1;
                            policy.next_delay()
                        }
                        (None, true) => {
                            stats.acted += 1;
                            self.interval.next_delay()
                        }
                        (_, false) => self.interval.next_delay(),
                    }
                }
                Err(err) => {
                    stats.errors += 1;
                    error!(
                        "[Scheduler]: {} tick #{} failed: {err:#}",
                        pipeline.name(),
                        stats.ticks
                    );
                    if let Err(err) = pipeline.recover() {
                        warn!("[Scheduler]: {} failed to recover: {err:#}", pipeline.name());
                    }
                    self.recovery_delay
                        .unwrap_or_else(|| self.interval.next_delay())
                }
            };
            if !should_continue() {
                break;
            }
            info!("[Scheduler]: next tick in {:.1}s", delay.as_secs_f64());
            sleep(delay);
        }
        info!("[Scheduler]: {} stopped: {stats:?}", pipeline.name());
        stats
    }
}

/// `should_continue` for a fixed number of ticks (at least one)
pub fn tick_budget(ticks: usize) -> impl FnMut() -> bool {
    let mut left = ticks.max(1);
    move || {
        left -= 1;
        left > 0
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug)]
    struct Acted(bool);

    impl TickReport for Acted {
        fn acted(&self) -> bool {
            self.0
        }
    }

    /// Replays a script of tick results
    struct Scripted {
        results: VecDeque<anyhow::Result<bool>>,
        recovered: usize,
    }

    impl Scripted {
        fn new(results: Vec<anyhow::Result<bool>>) -> Self {
            Self {
                results: results.into(),
                recovered: 0,
            }
        }
    }

    impl Pipeline for Scripted {
        type Outcome = Acted;
        fn name(&self) -> &str {
            "scripted"
        }
        fn tick(&mut self) -> anyhow::Result<Acted> {
            self.results.pop_front().unwrap_or(Ok(false)).map(Acted)
        }
        fn recover(&mut self) -> anyhow::Result<()> {
            self.recovered += 1;
            Ok(())
        }
    }

    #[test]
    fn test_sleeps_by_outcome() {
        crate::test_utils::init_logger();
        let scheduler = Scheduler::new(IntervalPolicy::fixed(40.0))
            .with_after_action(IntervalPolicy::fixed(2.0))
            .with_recovery_delay(Duration::from_secs(5));
        let mut pipeline = Scripted::new(vec![
            Ok(true),
            Ok(false),
            Err(anyhow::anyhow!("adb went away")),
            Ok(true),
        ]);

        let mut slept = vec![];
        let stats = scheduler.run_with(&mut pipeline, tick_budget(4), |d| slept.push(d));

        assert_eq!(
            stats,
            RunStats {
                ticks: 4,
                acted: 2,
                errors: 1
            }
        );
        // no sleep after the last tick
        assert_eq!(
            slept,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(40),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(pipeline.recovered, 1);
    }

    #[test]
    fn test_defaults_to_interval() {
        let scheduler = Scheduler::new(IntervalPolicy::fixed(3600.0));
        let mut pipeline = Scripted::new(vec![Ok(true), Err(anyhow::anyhow!("timeout")), Ok(false)]);

        let mut slept = vec![];
        let stats = scheduler.run_with(&mut pipeline, tick_budget(3), |d| slept.push(d));
        assert_eq!(stats.errors, 1);
        assert_eq!(slept, vec![Duration::from_secs(3600); 2]);
    }

    #[test]
    fn test_single_tick() {
        let scheduler = Scheduler::new(IntervalPolicy::fixed(1.0));
        let mut pipeline = Scripted::new(vec![]);
        let stats = scheduler.run_with(&mut pipeline, tick_budget(0), |_| {
            panic!("should not sleep")
        });
        assert_eq!(stats.ticks, 1);
    }
}
