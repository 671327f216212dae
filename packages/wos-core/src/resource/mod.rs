use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    automaton::condition::{DispatchConfig, EntryConfig},
    task::{Action, ActionSet, DelayRange, Step},
    vision::{ImageSignature, SignatureSet},
};

pub trait Load {
    fn load(path: impl AsRef<Path>) -> anyhow::Result<Self>
    where
        Self: Sized;
}

fn default_threshold() -> f32 {
    0.8
}

/// One table of `signatures.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Relative to `templates/`
    pub template: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn get_action_files(path: impl AsRef<Path>) -> anyhow::Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let mut files = vec![];
    if !path.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(path).with_context(|| format!("failed to read {path:?}"))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            files.extend(get_action_files(entry.path())?);
        } else if file_type.is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Every `*.toml` under `dir`, recursively, one [`Action`] per file
pub fn load_actions(dir: impl AsRef<Path>) -> anyhow::Result<ActionSet> {
    let mut actions = ActionSet::default();
    for file in get_action_files(dir)? {
        let action = fs::read_to_string(&file)?;
        let action =
            toml::from_str::<Action>(&action).with_context(|| format!("failed to parse {file:?}"))?;
        if actions.get(&action.name).is_some() {
            anyhow::bail!("action {} is defined twice, again in {file:?}", action.name);
        }
        actions.insert(action);
    }
    Ok(actions)
}

pub fn load_dispatch(file: impl AsRef<Path>) -> anyhow::Result<DispatchConfig> {
    let file = file.as_ref();
    let dispatch = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
    toml::from_str::<DispatchConfig>(&dispatch).with_context(|| format!("failed to parse {file:?}"))
}

/// 一个 resources 目录应当具备以下目录结构：
/// ```text
/// /resources
/// ├── signatures.toml
/// ├── dispatch.toml
/// ├── actions
/// │   ├── action1.toml
/// │   └── ...
/// └── templates
///     ├── template1.png
///     └── ...
/// ```
#[derive(Debug)]
pub struct LocalResource {
    pub root: PathBuf,
    pub signatures: SignatureSet,
    pub actions: ActionSet,
    /// In priority order
    pub entries: Vec<EntryConfig>,
}

impl Load for LocalResource {
    /// Every template is read here, a missing one fails the whole load
    fn load(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            anyhow::bail!("Resource root not exists: {:?}", root);
        }

        let signatures_file = root.join("signatures.toml");
        let signatures = fs::read_to_string(&signatures_file)
            .with_context(|| format!("failed to read {signatures_file:?}"))?;
        let signatures = toml::from_str::<BTreeMap<String, SignatureEntry>>(&signatures)
            .with_context(|| format!("failed to parse {signatures_file:?}"))?;
        let signatures = signatures
            .into_iter()
            .map(|(name, entry)| -> anyhow::Result<ImageSignature> {
                let path = root.join("templates").join(&entry.template);
                let template = image::open(&path)
                    .with_context(|| format!("failed to load template of {name}: {path:?}"))?;
                Ok(ImageSignature::new(name, &template, entry.threshold)?)
            })
            .collect::<anyhow::Result<SignatureSet>>()?;

        let actions = load_actions(root.join("actions"))?;
        let dispatch = load_dispatch(root.join("dispatch.toml"))?;

        let resource = Self::from_parts(root, signatures, actions, dispatch.entries)?;
        info!(
            "[LocalResource]: loaded {} signatures, {} actions, {} entries from {:?}",
            resource.signatures.len(),
            resource.actions.0.len(),
            resource.entries.len(),
            resource.root
        );
        Ok(resource)
    }
}

impl LocalResource {
    pub fn from_parts(
        root: impl Into<PathBuf>,
        signatures: SignatureSet,
        actions: ActionSet,
        entries: Vec<EntryConfig>,
    ) -> anyhow::Result<Self> {
        let resource = Self {
            root: root.into(),
            signatures,
            actions,
            entries,
        };
        resource.validate()?;
        Ok(resource)
    }

    fn check_steps<'a>(
        &self,
        owner: &str,
        steps: impl IntoIterator<Item = &'a Step>,
    ) -> anyhow::Result<()> {
        for step in steps {
            match step {
                Step::SubAction { name } if self.actions.get(name).is_none() => {
                    anyhow::bail!("{owner} refers to an unknown action {name:?}");
                }
                Step::Wait { min_ms, max_ms } => DelayRange::new(*min_ms, *max_ms)
                    .validate()
                    .with_context(|| format!("{owner} has a bad wait"))?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Every name used is defined
    pub fn validate(&self) -> anyhow::Result<()> {
        for action in self.actions.0.values() {
            self.check_steps(&format!("action {}", action.name), &action.steps)?;
        }

        let mut names = HashSet::new();
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                anyhow::bail!("dispatch entry {} is defined twice", entry.name);
            }
            if self.actions.get(&entry.action).is_none() {
                anyhow::bail!(
                    "dispatch entry {} runs an unknown action {:?}",
                    entry.name,
                    entry.action
                );
            }
            if let Some(condition) = &entry.condition {
                for signature in condition.signature_names() {
                    if !self.signatures.contains(&signature) {
                        anyhow::bail!(
                            "dispatch entry {} checks an unknown signature {signature:?}",
                            entry.name
                        );
                    }
                }
                self.check_steps(&format!("dispatch entry {}", entry.name), condition.steps())?;
            }
        }
        Ok(())
    }
}
