//! Spell records.
//!
//! ```text
//! version: 2
//! apps:
//!   $01: t/<app id>/<verification key>
//! ins:
//!   - utxo_id: <txid>:<vout>
//!     charms: { $01: 1000 }
//! outs:
//!   - address: <address>
//!     charms: { $01: 400 }
//!     sats: 546
//! ```
//!
//! The JSON form of a spell is also valid YAML, so it is what we send to the
//! spell composer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpellError;

/// The only spell version this crate composes and validates.
pub const SPELL_VERSION: u32 = 2;

/// An app reference, `tag/id/vk` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct App {
    pub tag: String,
    pub id: String,
    pub vk: String,
}

impl FromStr for App {
    type Err = SpellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        match parts.as_slice() {
            [tag, id, vk] if !tag.is_empty() && !id.is_empty() && !vk.is_empty() => Ok(Self {
                tag: tag.to_string(),
                id: id.to_string(),
                vk: vk.to_string(),
            }),
            _ => Err(SpellError::MalformedApp(s.to_string())),
        }
    }
}

impl TryFrom<String> for App {
    type Error = SpellError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<App> for String {
    fn from(app: App) -> Self {
        app.to_string()
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tag, self.id, self.vk)
    }
}

/// A spent output reference, `txid:vout` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtxoId {
    pub txid: String,
    pub vout: u32,
}

impl UtxoId {
    pub fn new(txid: impl Into<String>, vout: u32) -> Result<Self, SpellError> {
        let txid = txid.into();
        if txid.len() != 64 || !txid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SpellError::MalformedUtxoId(format!("{txid}:{vout}")));
        }
        Ok(Self { txid, vout })
    }
}

impl FromStr for UtxoId {
    type Err = SpellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| SpellError::MalformedUtxoId(s.to_string()))?;
        let vout = vout
            .parse::<u32>()
            .map_err(|_| SpellError::MalformedUtxoId(s.to_string()))?;
        Self::new(txid, vout)
    }
}

impl TryFrom<String> for UtxoId {
    type Error = SpellError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UtxoId> for String {
    fn from(id: UtxoId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellInput {
    pub utxo_id: UtxoId,
    #[serde(default)]
    pub charms: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub charms: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sats: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    pub version: u32,
    pub apps: BTreeMap<String, App>,
    #[serde(default)]
    pub ins: Vec<SpellInput>,
    #[serde(default)]
    pub outs: Vec<SpellOutput>,
}

impl Spell {
    /// Check the spell before it leaves the process.
    ///
    /// Every charm key must be declared in `apps`, and for each key the input
    /// total must equal the output total.
    pub fn validate(&self) -> Result<(), SpellError> {
        if self.version != SPELL_VERSION {
            return Err(SpellError::UnsupportedVersion(self.version));
        }
        if self.ins.is_empty() {
            return Err(SpellError::EmptyInputs);
        }
        if self.outs.is_empty() {
            return Err(SpellError::EmptyOutputs);
        }

        let mut totals: BTreeMap<&str, (u64, u64)> = self
            .apps
            .keys()
            .map(|k| (k.as_str(), (0, 0)))
            .collect();

        for input in &self.ins {
            for (key, amount) in &input.charms {
                let entry = totals
                    .get_mut(key.as_str())
                    .ok_or_else(|| SpellError::UndeclaredApp(key.clone()))?;
                entry.0 = entry
                    .0
                    .checked_add(*amount)
                    .ok_or_else(|| SpellError::AmountOverflow { app: key.clone() })?;
            }
        }
        for output in &self.outs {
            for (key, amount) in &output.charms {
                let entry = totals
                    .get_mut(key.as_str())
                    .ok_or_else(|| SpellError::UndeclaredApp(key.clone()))?;
                entry.1 = entry
                    .1
                    .checked_add(*amount)
                    .ok_or_else(|| SpellError::AmountOverflow { app: key.clone() })?;
            }
        }

        for (app, (inputs, outputs)) in totals {
            if inputs != outputs {
                return Err(SpellError::Imbalanced {
                    app: app.to_string(),
                    inputs,
                    outputs,
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SpellError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SpellError> {
        Ok(serde_json::from_str(json)?)
    }
}
