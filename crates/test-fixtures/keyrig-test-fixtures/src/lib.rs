//! Shared JSON fixtures for keyrig integration tests.
//!
//! - `animation_sets`: curve sets per entity kind
//! - `rigs`: joint chains with constraints and parent transform
//! - `configs`: solver tunings
//!
//! Files live under `fixtures/` at the workspace root; `fixtures/manifest.json`
//! maps each fixture name to its file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "animation-sets")]
    animation_sets: HashMap<String, String>,
    rigs: HashMap<String, String>,
    configs: HashMap<String, String>,
}

/// One section of the manifest.
#[derive(Clone, Copy, Debug)]
enum Group {
    AnimationSets,
    Rigs,
    Configs,
}

impl Group {
    fn label(self) -> &'static str {
        match self {
            Group::AnimationSets => "animation set",
            Group::Rigs => "rig",
            Group::Configs => "solver config",
        }
    }

    fn entries(self) -> &'static HashMap<String, String> {
        match self {
            Group::AnimationSets => &MANIFEST.animation_sets,
            Group::Rigs => &MANIFEST.rigs,
            Group::Configs => &MANIFEST.configs,
        }
    }

    /// Sorted fixture names, so tests iterate in a stable order.
    fn names(self) -> Vec<String> {
        let mut names: Vec<String> = self.entries().keys().cloned().collect();
        names.sort();
        names
    }

    fn file(self, name: &str) -> Result<PathBuf> {
        let Some(relative) = self.entries().get(name) else {
            bail!(
                "no {} fixture named '{name}' (known: {})",
                self.label(),
                self.names().join(", ")
            );
        };
        Ok(Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures")
            .join(relative))
    }

    fn text(self, name: &str) -> Result<String> {
        let file = self.file(name)?;
        fs::read_to_string(&file)
            .with_context(|| format!("reading {} fixture '{name}' from {}", self.label(), file.display()))
    }

    fn parse<T: DeserializeOwned>(self, name: &str) -> Result<T> {
        let text = self.text(name)?;
        serde_json::from_str(&text)
            .with_context(|| format!("decoding {} fixture '{name}'", self.label()))
    }
}

macro_rules! fixture_module {
    ($module:ident, $group:expr) => {
        pub mod $module {
            use super::*;

            pub fn keys() -> Vec<String> {
                $group.names()
            }

            /// Raw JSON text of fixture `name`.
            pub fn json(name: &str) -> Result<String> {
                $group.text(name)
            }

            pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
                $group.parse(name)
            }

            pub fn path(name: &str) -> Result<PathBuf> {
                $group.file(name)
            }
        }
    };
}

fixture_module!(animation_sets, Group::AnimationSets);
fixture_module!(rigs, Group::Rigs);
fixture_module!(configs, Group::Configs);
