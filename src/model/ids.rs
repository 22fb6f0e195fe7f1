//! Identifier newtypes shared across the pipeline.
//!
//! All three are totally ordered so they can key `BTreeMap`/`BTreeSet`
//! collections; iteration order never depends on hashing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an extracted entity within one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identity of a proposed service inside a decomposition plan.
///
/// Serialized as its number, displayed as `svc-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub u32);

impl ServiceId {
    /// Parse the `svc-N` display form back into an id.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix("svc-")
            .unwrap_or(raw)
            .parse::<u32>()
            .ok()
            .map(Self)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc-{}", self.0)
    }
}

/// One unit of metered analysis work: a source file, an entity chunk, or a
/// cluster evaluated by the advisory classifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn file(path: &str) -> Self {
        Self(format!("file:{}", path))
    }

    pub fn entity(id: EntityId) -> Self {
        Self(format!("entity:{}", id))
    }

    /// Naming request for the cluster whose smallest member is `key`.
    pub fn cluster(key: EntityId) -> Self {
        Self(format!("cluster:{}", key))
    }

    /// Validation request for merging the clusters keyed `left` and `right`.
    pub fn merge(left: EntityId, right: EntityId) -> Self {
        Self(format!("merge:{}+{}", left, right))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Entity a unit is implicitly tied to, derived from its prefix.
    ///
    /// `entity:N` and `cluster:N` anchor to `N`; `merge:L+R` anchors to `L`.
    /// File units carry no implicit anchor.
    pub fn anchor_entity(&self) -> Option<EntityId> {
        let (prefix, rest) = self.0.split_once(':')?;
        let raw = match prefix {
            "entity" | "cluster" => rest,
            "merge" => rest.split_once('+').map(|(l, _)| l)?,
            _ => return None,
        };
        raw.parse::<u64>().ok().map(EntityId)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UnitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
