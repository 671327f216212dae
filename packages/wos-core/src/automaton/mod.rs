//! Screen automaton.
//!
//! Every tick looks at a fresh screenshot and runs the action of the first
//! dispatch entry whose condition is on screen.

use std::cell::RefCell;

use anyhow::Context;
use image::DynamicImage;
use log::{debug, info};
use wos_controller::Controller;
use wos_cv::MatchTemplateMethod;

use crate::{
    dispatcher::{run_tick, DispatchEntry, DispatchTable, Hit, Perform, Precondition, TickOutcome},
    resource::LocalResource,
    scheduler::{Pipeline, TickReport},
    task::{ExecContext, Pacing, Runnable, Step},
    vision::{MatchResult, Matcher},
    CachedScreenCapper,
};

pub mod condition;

pub use condition::{Condition, DispatchConfig, EntryConfig};

pub struct Automaton<C: Controller> {
    pub controller: C,
    pub resource: LocalResource,
    matcher: Matcher<MatchTemplateMethod>,
    pacing: Pacing,
    screen_cache: RefCell<Option<DynamicImage>>,
}

impl<C: Controller> Automaton<C> {
    pub fn new(
        controller: C,
        resource: LocalResource,
        matcher: Matcher<MatchTemplateMethod>,
        pacing: Pacing,
    ) -> Self {
        Self {
            controller,
            resource,
            matcher,
            pacing,
            screen_cache: RefCell::new(None),
        }
    }

    /// Run `steps` in order. The screen is considered changed afterwards.
    pub fn run_steps(&self, steps: &[Step], hit: Option<&MatchResult>) -> anyhow::Result<()> {
        let ctx = ExecContext::new(&self.controller, &self.resource.actions, &self.pacing, hit);
        let res = steps.iter().try_for_each(|step| step.run(&ctx));
        self.invalidate_screen_cache();
        res
    }

    pub fn run_action(&self, name: &str, hit: Option<&MatchResult>) -> anyhow::Result<()> {
        let action = self
            .resource
            .actions
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("failed to get action by name: {name:?}"))?;
        let ctx = ExecContext::new(&self.controller, &self.resource.actions, &self.pacing, hit);
        let res = action.run(&ctx);
        self.invalidate_screen_cache();
        res
    }

    /// Probe, match, and undo the probe on a miss
    pub fn check(&self, condition: &Condition) -> anyhow::Result<Option<MatchResult>> {
        if !condition.probe.is_empty() {
            self.run_steps(&condition.probe, None)
                .with_context(|| format!("probe for {} failed", condition.signature))?;
        }

        let screen = self.screen_cache_or_cap()?;
        let signatures = &self.resource.signatures;
        let res = match condition.variants {
            Some(variants) => self.matcher.find_animated(
                signatures,
                &condition.signature,
                &screen,
                condition.region,
                variants,
            )?,
            None => self
                .matcher
                .find(signatures, &condition.signature, &screen, condition.region)?,
        };

        if res.is_none() && !condition.on_miss.is_empty() {
            debug!("[Automaton]: {} not found, undoing the probe", condition.signature);
            self.run_steps(&condition.on_miss, None)?;
        }
        Ok(res)
    }

    /// The entries of the loaded resource, in order
    pub fn dispatch_table(&self) -> DispatchTable<Self> {
        dispatch_table(&self.resource.entries)
    }
}

impl<C: Controller> CachedScreenCapper for Automaton<C> {
    fn screen_cache_or_cap(&self) -> anyhow::Result<DynamicImage> {
        if let Some(screen) = self.screen_cache.borrow().as_ref() {
            return Ok(screen.clone());
        }
        self.screen_cap_and_cache()
    }

    fn screen_cap_and_cache(&self) -> anyhow::Result<DynamicImage> {
        let screen = self.controller.screencap().context("failed to capture the screen")?;
        *self.screen_cache.borrow_mut() = Some(screen.clone());
        Ok(screen)
    }

    fn invalidate_screen_cache(&self) {
        self.screen_cache.borrow_mut().take();
    }
}

// MARK: Dispatch entries

struct OnScreen(Condition);

impl<C: Controller> Precondition<Automaton<C>> for OnScreen {
    fn evaluate(&self, automaton: &Automaton<C>) -> anyhow::Result<Option<Hit>> {
        Ok(automaton.check(&self.0)?.map(Hit::Matched))
    }
}

struct Always;

impl<T> Precondition<T> for Always {
    fn evaluate(&self, _runner: &T) -> anyhow::Result<Option<Hit>> {
        Ok(Some(Hit::Always))
    }
}

struct RunAction(String);

impl<C: Controller> Perform<Automaton<C>> for RunAction {
    fn perform(&self, automaton: &Automaton<C>, hit: &Hit) -> anyhow::Result<()> {
        automaton.run_action(&self.0, hit.matched())
    }
}

pub fn dispatch_table<C: Controller>(entries: &[EntryConfig]) -> DispatchTable<Automaton<C>> {
    let mut table = DispatchTable::new();
    for entry in entries {
        let action = RunAction(entry.action.clone());
        table.push(match &entry.condition {
            Some(condition) => DispatchEntry::new(&entry.name, OnScreen(condition.clone()), action),
            None => DispatchEntry::new(&entry.name, Always, action),
        });
    }
    table
}

// MARK: Pipeline

impl TickReport for TickOutcome {
    fn acted(&self) -> bool {
        TickOutcome::acted(self)
    }
}

pub struct AutomatonPipeline<C: Controller> {
    pub automaton: Automaton<C>,
    table: DispatchTable<Automaton<C>>,
}

impl<C: Controller> AutomatonPipeline<C> {
    pub fn new(automaton: Automaton<C>) -> Self {
        let table = automaton.dispatch_table();
        info!(
            "[AutomatonPipeline]: dispatch order: {:?}",
            table.names().collect::<Vec<_>>()
        );
        Self { automaton, table }
    }
}

impl<C: Controller> Pipeline for AutomatonPipeline<C> {
    type Outcome = TickOutcome;

    fn name(&self) -> &str {
        "automaton"
    }

    fn tick(&mut self) -> anyhow::Result<TickOutcome> {
        self.automaton.invalidate_screen_cache();
        Ok(run_tick(&self.table, &self.automaton)?)
    }

    /// Reconnect the device
    fn recover(&mut self) -> anyhow::Result<()> {
        self.automaton.invalidate_screen_cache();
        self.automaton.controller.reconnect()
    }
}
