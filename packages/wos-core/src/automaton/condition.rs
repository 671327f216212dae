use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{task::Step, vision::Region};

/// What has to be on screen for an entry to fire
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub signature: String,
    /// Only look here, the whole screen if not set
    pub region: Option<Region>,
    /// Animated element: try `{signature}_1` to `{signature}_{variants}`
    pub variants: Option<u32>,
    /// Run before matching, to bring the element on screen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe: Vec<Step>,
    /// Run when the signature is not found, to undo `probe`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_miss: Vec<Step>,
}

impl Condition {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            region: None,
            variants: None,
            probe: vec![],
            on_miss: vec![],
        }
    }

    pub fn in_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn animated(mut self, variants: u32) -> Self {
        self.variants = Some(variants);
        self
    }

    pub fn with_probe(mut self, steps: Vec<Step>) -> Self {
        self.probe = steps;
        self
    }

    pub fn with_on_miss(mut self, steps: Vec<Step>) -> Self {
        self.on_miss = steps;
        self
    }

    /// Every signature name this condition may look up
    pub fn signature_names(&self) -> Vec<String> {
        match self.variants {
            Some(n) => (1..=n)
                .map(|i| crate::vision::matcher::variant_name(&self.signature, i))
                .collect(),
            None => vec![self.signature.clone()],
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.probe.iter().chain(self.on_miss.iter())
    }
}

/// One row of `dispatch.toml`
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub name: String,
    /// Always fires if not set
    pub condition: Option<Condition>,
    /// Name of the action to run
    pub action: String,
}

/// `dispatch.toml`, entries in priority order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}
