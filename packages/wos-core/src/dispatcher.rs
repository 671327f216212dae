//! Priority-ordered "precondition → action" table.
//!
//! At most one entry acts per tick: the first one whose precondition is
//! satisfied. Entries after it are not evaluated.

use log::{debug, info};
use thiserror::Error;

use crate::vision::MatchResult;

/// Why a precondition is satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    /// The entry has no condition
    Always,
    Matched(MatchResult),
}

impl Hit {
    pub fn matched(&self) -> Option<&MatchResult> {
        match self {
            Hit::Always => None,
            Hit::Matched(res) => Some(res),
        }
    }
}

pub trait Precondition<T> {
    /// `Ok(None)` means not satisfied
    fn evaluate(&self, runner: &T) -> anyhow::Result<Option<Hit>>;
}

impl<T, F> Precondition<T> for F
where
    F: Fn(&T) -> anyhow::Result<Option<Hit>>,
{
    fn evaluate(&self, runner: &T) -> anyhow::Result<Option<Hit>> {
        self(runner)
    }
}

pub trait Perform<T> {
    fn perform(&self, runner: &T, hit: &Hit) -> anyhow::Result<()>;
}

impl<T, F> Perform<T> for F
where
    F: Fn(&T, &Hit) -> anyhow::Result<()>,
{
    fn perform(&self, runner: &T, hit: &Hit) -> anyhow::Result<()> {
        self(runner, hit)
    }
}

pub struct DispatchEntry<T> {
    pub name: String,
    pub precondition: Box<dyn Precondition<T>>,
    pub action: Box<dyn Perform<T>>,
}

impl<T> DispatchEntry<T> {
    pub fn new(
        name: impl Into<String>,
        precondition: impl Precondition<T> + 'static,
        action: impl Perform<T> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            precondition: Box::new(precondition),
            action: Box::new(action),
        }
    }
}

pub struct DispatchTable<T> {
    entries: Vec<DispatchEntry<T>>,
}

impl<T> Default for DispatchTable<T> {
    fn default() -> Self {
        Self { entries: vec![] }
    }
}

impl<T> DispatchTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with the lowest priority so far
    pub fn with_entry(mut self, entry: DispatchEntry<T>) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: DispatchEntry<T>) {
        self.entries.push(entry);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Acted { entry: String, hit: Hit },
    Idle,
}

impl TickOutcome {
    pub fn acted(&self) -> bool {
        matches!(self, TickOutcome::Acted { .. })
    }
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to evaluate the precondition of {entry}")]
    Precondition {
        entry: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("action of {entry} failed")]
    Action {
        entry: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TickError {
    pub fn entry(&self) -> &str {
        match self {
            TickError::Precondition { entry, .. } | TickError::Action { entry, .. } => entry,
        }
    }
}

/// Evaluate the entries in order and run the first satisfied one
pub fn run_tick<T>(table: &DispatchTable<T>, runner: &T) -> Result<TickOutcome, TickError> {
    for entry in &table.entries {
        let hit = entry
            .precondition
            .evaluate(runner)
            .map_err(|source| TickError::Precondition {
                entry: entry.name.clone(),
                source,
            })?;
        let Some(hit) = hit else {
            debug!("[Dispatcher]: {} not satisfied", entry.name);
            continue;
        };

        info!("[Dispatcher]: {} satisfied ({hit:?}), acting", entry.name);
        entry
            .action
            .perform(runner, &hit)
            .map_err(|source| TickError::Action {
                entry: entry.name.clone(),
                source,
            })?;
        return Ok(TickOutcome::Acted {
            entry: entry.name.clone(),
            hit,
        });
    }
    Ok(TickOutcome::Idle)
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;
    use crate::vision::Region;

    /// Which conditions are true, and a log of everything that happened
    struct World {
        visible: Vec<&'static str>,
        log: RefCell<Vec<String>>,
    }

    impl World {
        fn new(visible: Vec<&'static str>) -> Self {
            Self {
                visible,
                log: RefCell::new(vec![]),
            }
        }
    }

    fn entry(name: &'static str) -> DispatchEntry<World> {
        DispatchEntry::new(
            name,
            move |world: &World| -> anyhow::Result<Option<Hit>> {
                world.log.borrow_mut().push(format!("check {name}"));
                Ok(world.visible.contains(&name).then(|| {
                    Hit::Matched(MatchResult {
                        name: name.to_string(),
                        confidence: 0.9,
                        location: (1, 2),
                        area: Region::new(0, 0, 2, 4),
                    })
                }))
            },
            move |world: &World, _hit: &Hit| -> anyhow::Result<()> {
                world.log.borrow_mut().push(format!("run {name}"));
                Ok(())
            },
        )
    }

    fn table() -> DispatchTable<World> {
        DispatchTable::new()
            .with_entry(entry("heal"))
            .with_entry(entry("help"))
            .with_entry(entry("rewards"))
    }

    #[test]
    fn test_first_satisfied_wins() {
        let world = World::new(vec!["help", "heal"]);
        let outcome = run_tick(&table(), &world).unwrap();

        assert!(outcome.acted());
        assert!(matches!(outcome, TickOutcome::Acted { ref entry, .. } if entry == "heal"));
        assert_eq!(*world.log.borrow(), vec!["check heal", "run heal"]);
    }

    #[test]
    fn test_later_entry() {
        let world = World::new(vec!["rewards"]);
        let outcome = run_tick(&table(), &world).unwrap();
        assert!(matches!(outcome, TickOutcome::Acted { ref entry, .. } if entry == "rewards"));
        assert_eq!(
            *world.log.borrow(),
            vec!["check heal", "check help", "check rewards", "run rewards"]
        );
    }

    #[test]
    fn test_idle() {
        let world = World::new(vec![]);
        assert_eq!(run_tick(&table(), &world).unwrap(), TickOutcome::Idle);
        assert_eq!(run_tick(&DispatchTable::new(), &world).unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn test_unconditional_entry() {
        let table = DispatchTable::new()
            .with_entry(entry("heal"))
            .with_entry(DispatchEntry::new(
                "fallback",
                |_: &World| -> anyhow::Result<Option<Hit>> { Ok(Some(Hit::Always)) },
                |_: &World, hit: &Hit| -> anyhow::Result<()> {
                    assert_eq!(hit.matched(), None);
                    Ok(())
                },
            ));
        let outcome = run_tick(&table, &World::new(vec![])).unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Acted {
                entry: "fallback".to_string(),
                hit: Hit::Always
            }
        );
    }

    #[test]
    fn test_errors_are_distinct() {
        let table = DispatchTable::new().with_entry(DispatchEntry::new(
            "broken_check",
            |_: &World| -> anyhow::Result<Option<Hit>> { anyhow::bail!("screencap failed") },
            |_: &World, _: &Hit| -> anyhow::Result<()> { Ok(()) },
        ));
        let err = run_tick(&table, &World::new(vec![])).unwrap_err();
        assert!(matches!(err, TickError::Precondition { .. }));
        assert_eq!(err.entry(), "broken_check");

        let world = World::new(vec![]);
        let table = table_with_failing_action().with_entry(entry("heal"));
        let err = run_tick(&table, &world).unwrap_err();
        assert!(matches!(err, TickError::Action { ref entry, .. } if entry == "broken_action"));
        // the entry after a failing action is not evaluated
        assert!(world.log.borrow().is_empty());
    }

    fn table_with_failing_action() -> DispatchTable<World> {
        DispatchTable::new().with_entry(DispatchEntry::new(
            "broken_action",
            |_: &World| -> anyhow::Result<Option<Hit>> { Ok(Some(Hit::Always)) },
            |_: &World, _: &Hit| -> anyhow::Result<()> { anyhow::bail!("tap failed") },
        ))
    }
}
