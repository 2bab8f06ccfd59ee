use std::collections::HashSet;
use tracing::debug;

use crate::schema::Artifact;

/// Accumulates artifacts, refusing any whose id or title is already taken.
pub struct ArtifactMerger {
    merged: Vec<Artifact>,
    seen_ids: HashSet<String>,
    seen_titles: HashSet<String>,
}

impl ArtifactMerger {
    /// Start from the freshly built artifacts; they are kept as-is and in order.
    pub fn new(built: Vec<Artifact>) -> Self {
        let mut merger = Self {
            merged: Vec::with_capacity(built.len()),
            seen_ids: HashSet::new(),
            seen_titles: HashSet::new(),
        };
        for artifact in built {
            merger.remember(&artifact);
            merger.merged.push(artifact);
        }
        merger
    }

    /// Append `prior` unless it collides with something already merged.
    /// Returns whether it was kept.
    pub fn offer(&mut self, prior: Artifact) -> bool {
        let id_taken = prior
            .id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && self.seen_ids.contains(id));
        let title_taken = !prior.title.is_empty() && self.seen_titles.contains(&prior.title);

        if id_taken || title_taken {
            debug!(identity = prior.identity(), id_taken, title_taken, "Dropping prior artifact");
            return false;
        }

        self.remember(&prior);
        self.merged.push(prior);
        true
    }

    fn remember(&mut self, artifact: &Artifact) {
        if let Some(id) = artifact.id.as_deref().filter(|id| !id.is_empty()) {
            self.seen_ids.insert(id.to_string());
        }
        if !artifact.title.is_empty() {
            self.seen_titles.insert(artifact.title.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    pub fn finish(self) -> Vec<Artifact> {
        self.merged
    }
}

/// Built artifacts first, then every prior that collides with nothing.
pub fn merge_artifacts(built: Vec<Artifact>, prior: impl IntoIterator<Item = Artifact>) -> Vec<Artifact> {
    let mut merger = ArtifactMerger::new(built);
    for artifact in prior {
        merger.offer(artifact);
    }
    merger.finish()
}
