use std::ops::{Index, IndexMut};

use tracing::{debug, info, warn};

use crate::error::TabmetaError;
use crate::hierarchy::{Level, looks_like_native_id};
use crate::platform::{ContainerQuery, ContainerRef, PlatformClient};

/// A sparse resolution request: any subset of level identifiers (labels or
/// native IDs), an optional explicit attachment level for file/analysis
/// leaves, and an optional target level to walk down to even when nothing is
/// specified at or below it.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRequest {
    identifiers: [Option<String>; 7],
    pub attachment_level: Option<Level>,
    pub target_level: Option<Level>,
}

impl ResolutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier for a level. Blank identifiers count as absent.
    pub fn set(&mut self, level: Level, identifier: Option<&str>) {
        self.identifiers[level.depth()] = identifier
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
    }

    pub fn with(mut self, level: Level, identifier: &str) -> Self {
        self.set(level, Some(identifier));
        self
    }

    pub fn identifier(&self, level: Level) -> Option<&str> {
        self.identifiers[level.depth()].as_deref()
    }

    /// Determines the traversal bounds and leaf attachment before any adapter
    /// call runs. Fails with `StructuralMismatch` when the request is
    /// topologically invalid.
    pub fn plan(&self) -> Result<ResolutionPlan, TabmetaError> {
        if let Some(attachment) = self.attachment_level {
            if attachment.is_leaf() {
                return Err(TabmetaError::StructuralMismatch(format!(
                    "attachment level must be a traversable level, got {attachment}"
                )));
            }
        }

        let specified: Vec<Level> = Level::order()
            .filter(|level| !level.is_leaf() && self.identifier(*level).is_some())
            .collect();
        let highest_specified = specified.first().copied();
        let lowest_specified = specified.last().copied();

        let mut leaves = Vec::new();
        if self.identifier(Level::Analysis).is_some() {
            leaves.push(Level::Analysis);
        }
        if self.identifier(Level::File).is_some() {
            leaves.push(Level::File);
        }

        let attachment = if leaves.is_empty() {
            None
        } else {
            match self.attachment_level.or(lowest_specified) {
                Some(level) => Some(level),
                None => {
                    return Err(TabmetaError::StructuralMismatch(
                        "a file or analysis identifier requires a container level or an \
                         explicit attachment level"
                            .to_string(),
                    ));
                }
            }
        };

        // A leaf cannot attach above a level the caller specified more deeply.
        if let (Some(attachment), Some(lowest)) = (attachment, lowest_specified) {
            if attachment.is_ancestor(lowest) {
                return Err(TabmetaError::StructuralMismatch(format!(
                    "leaf attaches at {attachment} but a {lowest} identifier was also given"
                )));
            }
        }

        let mut lowest = attachment.or(lowest_specified);
        if leaves.is_empty() {
            if let Some(target) = self.target_level {
                if target.is_leaf() {
                    // Enumerate all attachments of that type at the lowest
                    // resolved level.
                    leaves.push(target);
                } else {
                    lowest = Some(match lowest {
                        Some(level) if !level.is_ancestor(target) => level,
                        _ => target,
                    });
                }
            }
        }

        let lowest = lowest.ok_or_else(|| {
            TabmetaError::StructuralMismatch("no hierarchy levels specified".to_string())
        })?;
        let highest = highest_specified.unwrap_or(lowest);

        Ok(ResolutionPlan {
            highest,
            lowest,
            leaves,
            attachment,
        })
    }
}

/// Traversal bounds computed from a request: walk `highest` down to `lowest`
/// (both traversable levels), then filter leaf attachments in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    pub highest: Level,
    pub lowest: Level,
    pub leaves: Vec<Level>,
    pub attachment: Option<Level>,
}

/// Per-level resolution state. `resolved` distinguishes "not yet resolved"
/// (`None`) from "resolved to nothing" (`Some` of an empty vec).
#[derive(Debug, Clone, Default)]
pub struct LevelSpec {
    pub identifier: Option<String>,
    pub resolved: Option<Vec<ContainerRef>>,
}

/// Arena of level records indexed by `Level`; parent/child relations go
/// through the level registry, so there are no cross-record pointers.
#[derive(Debug, Clone, Default)]
pub struct LevelArena([LevelSpec; 7]);

impl Index<Level> for LevelArena {
    type Output = LevelSpec;

    fn index(&self, level: Level) -> &LevelSpec {
        &self.0[level.depth()]
    }
}

impl IndexMut<Level> for LevelArena {
    fn index_mut(&mut self, level: Level) -> &mut LevelSpec {
        &mut self.0[level.depth()]
    }
}

pub struct Resolver<'a, P: PlatformClient> {
    client: &'a P,
}

impl<'a, P: PlatformClient> Resolver<'a, P> {
    pub fn new(client: &'a P) -> Self {
        Self { client }
    }

    /// Resolves a sparse request down to the concrete set of matching
    /// containers. Adapter failures are absorbed as zero matches at the
    /// failing call site; an empty set at any level short-circuits the rest
    /// of the walk.
    pub fn resolve(&self, request: &ResolutionRequest) -> Result<Vec<ContainerRef>, TabmetaError> {
        let plan = request.plan()?;
        info!(
            highest = %plan.highest,
            lowest = %plan.lowest,
            "resolving container path"
        );

        let mut arena = LevelArena::default();
        for level in Level::order().chain([Level::File]) {
            arena[level].identifier = request.identifier(level).map(str::to_string);
        }

        // Forward iteration from the highest specified level to the effective
        // lowest. Unspecified intermediate levels are left to the adapter's
        // own descendant expansion, so the walk only visits levels that carry
        // an identifier, plus the walk end.
        let walk: Vec<Level> = Level::order()
            .filter(|level| {
                level.depth() >= plan.highest.depth() && level.depth() <= plan.lowest.depth()
            })
            .filter(|level| arena[*level].identifier.is_some() || *level == plan.lowest)
            .collect();

        let mut parents: Option<Vec<ContainerRef>> = None;
        for level in walk {
            let identifier = arena[level].identifier.clone();
            let found = match &parents {
                None => self.find_with_fallback(None, level, identifier.as_deref()),
                Some(parent_set) => {
                    let mut found = Vec::new();
                    for parent in parent_set {
                        found.extend(self.find_with_fallback(
                            Some(parent),
                            level,
                            identifier.as_deref(),
                        ));
                    }
                    found
                }
            };

            debug!(%level, count = found.len(), "level resolved");
            arena[level].resolved = Some(found.clone());
            if found.is_empty() {
                info!(%level, "no matches, short-circuiting descendant levels");
                return Ok(Vec::new());
            }
            parents = Some(found);
        }

        let mut current = parents.unwrap_or_default();

        // Leaf attachments resolve by exact name/label filtering among the
        // accumulated parents' direct attachments, never recursively.
        for leaf in plan.leaves {
            let query = match arena[leaf].identifier.clone() {
                Some(identifier) => ContainerQuery::Label(identifier),
                None => ContainerQuery::All,
            };
            let mut found = Vec::new();
            for parent in &current {
                found.extend(absorb(self.client.find(Some(parent), leaf, &query), leaf));
            }
            arena[leaf].resolved = Some(found.clone());
            if found.is_empty() {
                info!(%leaf, "no matching attachments");
                return Ok(Vec::new());
            }
            current = found;
        }

        Ok(current)
    }

    /// Identifiers shaped like a native ID are tried as an ID lookup first;
    /// on error or no results the label lookup runs. The two outcomes are
    /// never merged.
    fn find_with_fallback(
        &self,
        parent: Option<&ContainerRef>,
        level: Level,
        identifier: Option<&str>,
    ) -> Vec<ContainerRef> {
        let Some(identifier) = identifier else {
            return absorb(
                self.client.find(parent, level, &ContainerQuery::All),
                level,
            );
        };

        if looks_like_native_id(identifier) {
            match self
                .client
                .find(parent, level, &ContainerQuery::Id(identifier.to_string()))
            {
                Ok(found) if !found.is_empty() => return found,
                Ok(_) => debug!(%level, identifier, "no ID match, trying label"),
                Err(err) => {
                    warn!(%level, identifier, error = %err, "ID lookup failed, trying label");
                }
            }
        }

        absorb(
            self.client
                .find(parent, level, &ContainerQuery::Label(identifier.to_string())),
            level,
        )
    }
}

fn absorb(
    result: Result<Vec<ContainerRef>, TabmetaError>,
    level: Level,
) -> Vec<ContainerRef> {
    match result {
        Ok(containers) => containers,
        Err(err) => {
            warn!(%level, error = %err, "treating adapter failure as zero matches");
            Vec::new()
        }
    }
}
