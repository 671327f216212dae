//! 此模块包含对动作的定义
//!
//! An [`Action`] is a named script: an ordered list of [`Step`]s stored as
//! data (`resources/actions/*.toml`), so new UI flows are authored instead of
//! coded. A [`Step`] is a single device operation, a wait, or a reference to
//! another action.

use std::{collections::HashMap, fmt::Debug, thread::sleep, time::Duration};

use color_print::cprintln;
use log::info;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use wos_controller::{Controller, Key};

use crate::{scheduler::interval::truncated_normal, vision::MatchResult};

/// Nesting limit for [`Step::SubAction`], a reference cycle hits this
const MAX_DEPTH: usize = 16;

pub trait Runnable<T> {
    type Res;
    fn run(&self, runner: &T) -> anyhow::Result<Self::Res>;
}

/// A "human-like" delay, sampled from a normal distribution truncated to
/// `[min_ms, max_ms]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_ms > self.max_ms {
            anyhow::bail!("delay min {}ms is larger than max {}ms", self.min_ms, self.max_ms);
        }
        Ok(())
    }

    pub fn sample(&self) -> Duration {
        let ms = truncated_normal(&mut rand::rng(), self.min_ms as f64, self.max_ms as f64);
        Duration::from_millis(ms.round() as u64)
    }
}

/// How long to let the game settle after a touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pacing {
    pub tap_settle: DelayRange,
    pub swipe_settle: DelayRange,
}

/// A single operation of an [`Action`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Tap a fixed coordinate
    Tap { x: u32, y: u32 },
    /// Tap where the precondition of the running dispatch entry matched
    TapMatch,
    Swipe {
        start: (u32, u32),
        end: (u32, u32),
        duration_ms: u64,
    },
    Wait { min_ms: u64, max_ms: u64 },
    Text { text: String },
    Key { key: Key },
    /// Run another action by name
    SubAction { name: String },
}

impl Step {
    pub fn tap(x: u32, y: u32) -> Self {
        Self::Tap { x, y }
    }
    pub fn swipe(start: (u32, u32), end: (u32, u32), duration_ms: u64) -> Self {
        Self::Swipe {
            start,
            end,
            duration_ms,
        }
    }
    pub fn wait(min_ms: u64, max_ms: u64) -> Self {
        Self::Wait { min_ms, max_ms }
    }
    pub fn sub_action(name: impl AsRef<str>) -> Self {
        Self::SubAction {
            name: name.as_ref().to_string(),
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// 一个完整的 [`Action`] 由若干 [`Step`] 组成
pub struct Action {
    pub name: String,
    pub desc: Option<String>,
    pub steps: Vec<Step>,
}

impl Action {
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            name: "unnamed".to_string(),
            desc: None,
            steps,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_desc(mut self, desc: &str) -> Self {
        self.desc = Some(desc.to_string());
        self
    }

    /// Names of the actions this one refers to directly
    pub fn sub_actions(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            Step::SubAction { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// All the actions known by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSet(pub HashMap<String, Action>);

impl ActionSet {
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.0.get(name)
    }

    pub fn insert(&mut self, action: Action) {
        self.0.insert(action.name.clone(), action);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.0.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = Self::default();
        for action in iter {
            set.insert(action);
        }
        set
    }
}

/// Everything a [`Step`] needs while running
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub controller: &'a dyn Controller,
    pub actions: &'a ActionSet,
    pub pacing: &'a Pacing,
    /// The match that triggered this action, used by [`Step::TapMatch`]
    pub hit: Option<&'a MatchResult>,
    depth: usize,
}

impl<'a> ExecContext<'a> {
    pub fn new(
        controller: &'a dyn Controller,
        actions: &'a ActionSet,
        pacing: &'a Pacing,
        hit: Option<&'a MatchResult>,
    ) -> Self {
        Self {
            controller,
            actions,
            pacing,
            hit,
            depth: 0,
        }
    }

    fn nested(&self) -> anyhow::Result<Self> {
        if self.depth >= MAX_DEPTH {
            anyhow::bail!("actions nested deeper than {MAX_DEPTH}, is there a cycle?");
        }
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }
}

impl<'a> Runnable<ExecContext<'a>> for Step {
    type Res = ();
    fn run(&self, ctx: &ExecContext<'a>) -> anyhow::Result<Self::Res> {
        match self {
            Step::Tap { x, y } => {
                ctx.controller.click(*x, *y)?;
                sleep(ctx.pacing.tap_settle.sample());
            }
            Step::TapMatch => {
                let hit = ctx
                    .hit
                    .ok_or_else(|| anyhow::anyhow!("tap_match used without a matched precondition"))?;
                ctx.controller.click(hit.location.0, hit.location.1)?;
                sleep(ctx.pacing.tap_settle.sample());
            }
            Step::Swipe {
                start,
                end,
                duration_ms,
            } => {
                ctx.controller
                    .swipe(*start, *end, Duration::from_millis(*duration_ms))?;
                sleep(ctx.pacing.swipe_settle.sample());
            }
            Step::Wait { min_ms, max_ms } => sleep(DelayRange::new(*min_ms, *max_ms).sample()),
            Step::Text { text } => ctx.controller.input_text(text)?,
            Step::Key { key } => ctx.controller.press(*key)?,
            Step::SubAction { name } => {
                let action = ctx
                    .actions
                    .get(name)
                    .ok_or_else(|| anyhow::anyhow!("failed to get action by name: {name:?}"))?;
                action.run(&ctx.nested()?)?;
            }
        }
        Ok(())
    }
}

impl<'a> Runnable<ExecContext<'a>> for Action {
    type Res = ();
    /// Runs every step in order, the first failing step aborts the action
    fn run(&self, ctx: &ExecContext<'a>) -> anyhow::Result<Self::Res> {
        info!("[Action<{}>] running...", self.name);
        for (i, step) in self.steps.iter().enumerate() {
            cprintln!(
                "<m><strong>[Action]</strong></m>: executing {}({}/{}): {:?}",
                self.name,
                i + 1,
                self.steps.len(),
                step
            );
            step.run(ctx)
                .map_err(|err| err.context(format!("step {} of {} failed", i + 1, self.name)))?;
        }
        Ok(())
    }
}
