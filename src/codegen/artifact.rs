//! Generated artifacts and the ordered artifact set.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{DecompositionError, DecompositionResult};
use crate::model::ServiceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Domain,
    Repository,
    Application,
    Presentation,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Domain => "domain",
            Self::Repository => "repository",
            Self::Application => "application",
            Self::Presentation => "presentation",
        };
        write!(f, "{}", s)
    }
}

/// Which generated codebase an artifact belongs to.
///
/// Serialized as `"svc-N"` or `"gateway"`; services order before the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactOwner {
    Service(ServiceId),
    Gateway,
}

impl fmt::Display for ArtifactOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(id) => write!(f, "{}", id),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

impl Serialize for ArtifactOwner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactOwner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "gateway" {
            return Ok(Self::Gateway);
        }
        ServiceId::parse(&raw)
            .map(Self::Service)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid artifact owner '{}'", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    DomainEntity,
    RepositoryContract,
    RepositoryAdapter,
    ApplicationService,
    PresentationContract,
    ClientStub,
    GatewayRoutes,
    UiHandler,
}

/// One generated source file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationArtifact {
    #[serde(rename = "service_id")]
    pub owner: ArtifactOwner,
    pub layer: Layer,
    pub kind: ArtifactKind,
    pub relative_path: String,
    pub content: String,
}

impl GenerationArtifact {
    pub fn new(
        owner: ArtifactOwner,
        layer: Layer,
        kind: ArtifactKind,
        relative_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            layer,
            kind,
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }
}

/// Artifacts sorted by owner, then relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet {
    artifacts: Vec<GenerationArtifact>,
}

impl ArtifactSet {
    /// Sort into the canonical order regardless of production order.
    pub fn from_unsorted(mut artifacts: Vec<GenerationArtifact>) -> Self {
        artifacts.sort_by(|a, b| {
            a.owner
                .cmp(&b.owner)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        Self { artifacts }
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationArtifact> {
        self.artifacts.iter()
    }

    pub fn as_slice(&self) -> &[GenerationArtifact] {
        &self.artifacts
    }

    pub fn get(&self, relative_path: &str) -> Option<&GenerationArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.relative_path == relative_path)
    }

    pub fn for_owner(&self, owner: ArtifactOwner) -> impl Iterator<Item = &GenerationArtifact> {
        self.artifacts.iter().filter(move |a| a.owner == owner)
    }

    pub fn count(&self, owner: ArtifactOwner, kind: ArtifactKind) -> usize {
        self.for_owner(owner).filter(|a| a.kind == kind).count()
    }

    pub fn count_by_kind(&self) -> BTreeMap<ArtifactKind, usize> {
        let mut counts = BTreeMap::new();
        for a in &self.artifacts {
            *counts.entry(a.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Write every artifact under `root`, creating directories as needed.
    pub fn write_to(&self, root: &Path) -> DecompositionResult<usize> {
        for artifact in &self.artifacts {
            let path = root.join(&artifact.relative_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DecompositionError::io(parent, e))?;
            }
            std::fs::write(&path, &artifact.content).map_err(|e| DecompositionError::io(&path, e))?;
        }
        Ok(self.artifacts.len())
    }
}

impl IntoIterator for ArtifactSet {
    type Item = GenerationArtifact;
    type IntoIter = std::vec::IntoIter<GenerationArtifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(owner: ArtifactOwner, path: &str) -> GenerationArtifact {
        GenerationArtifact::new(owner, Layer::Domain, ArtifactKind::DomainEntity, path, "")
    }

    #[test]
    fn test_sorted_by_owner_then_path() {
        let set = ArtifactSet::from_unsorted(vec![
            artifact(ArtifactOwner::Gateway, "gateway/routes.yaml"),
            artifact(ArtifactOwner::Service(ServiceId(2)), "b.rs"),
            artifact(ArtifactOwner::Service(ServiceId(1)), "z.rs"),
            artifact(ArtifactOwner::Service(ServiceId(2)), "a.rs"),
        ]);
        let order: Vec<&str> = set.iter().map(|a| a.relative_path.as_str()).collect();
        assert_eq!(order, vec!["z.rs", "a.rs", "b.rs", "gateway/routes.yaml"]);
    }

    #[test]
    fn test_owner_serialization() {
        let owned = artifact(ArtifactOwner::Service(ServiceId(3)), "x");
        let json = serde_json::to_string(&owned).unwrap();
        assert!(json.contains("\"service_id\":\"svc-3\""));
        let back: GenerationArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back.owner, ArtifactOwner::Service(ServiceId(3)));

        let gw: ArtifactOwner = serde_json::from_str("\"gateway\"").unwrap();
        assert_eq!(gw, ArtifactOwner::Gateway);
        assert!(serde_json::from_str::<ArtifactOwner>("\"svc-x\"").is_err());
    }

    #[test]
    fn test_write_to() {
        let dir = tempfile::tempdir().unwrap();
        let set = ArtifactSet::from_unsorted(vec![GenerationArtifact::new(
            ArtifactOwner::Gateway,
            Layer::Presentation,
            ArtifactKind::GatewayRoutes,
            "gateway/routes.yaml",
            "routes: []\n",
        )]);
        assert_eq!(set.write_to(dir.path()).unwrap(), 1);
        let written = std::fs::read_to_string(dir.path().join("gateway/routes.yaml")).unwrap();
        assert_eq!(written, "routes: []\n");
    }
}
