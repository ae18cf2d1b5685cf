//! Breadth-first expansion of the citation graph around a seed paper.
//!
//! References and citations are both treated as plain neighbor edges. A paper
//! is recorded once, at the depth where it is first discovered, and only papers
//! below the depth bound are expanded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::WalkerConfig;
use crate::domain::{ExpansionPolicy, PaperId, PaperRecord};
use crate::error::FetchError;
use crate::scholar::MetadataClient;

/// Visited set and result list in one: ids map to their position in
/// discovery order.
#[derive(Debug, Default)]
pub struct Frontier {
    records: Vec<PaperRecord>,
    index: HashMap<PaperId, usize>,
}

impl Frontier {
    pub fn new(seed: PaperRecord) -> Self {
        let mut frontier = Self::default();
        frontier.insert(seed.with_depth(0));
        frontier
    }

    /// Returns false when the id was already visited; the stored record is
    /// left untouched in that case.
    pub fn insert(&mut self, record: PaperRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn contains(&self, id: &PaperId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &PaperId) -> Option<&PaperRecord> {
        self.index.get(id).map(|position| &self.records[*position])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids discovered at `depth`, in discovery order.
    pub fn level(&self, depth: u32) -> Vec<PaperId> {
        self.records
            .iter()
            .filter(|record| record.depth == depth)
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn into_records(self) -> Vec<PaperRecord> {
        self.records
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionFailure {
    pub paper_id: PaperId,
    pub depth: u32,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct WalkResult {
    /// Discovery order; the seed comes first.
    pub papers: Vec<PaperRecord>,
    pub failures: Vec<ExpansionFailure>,
    /// Set when `max_papers` stopped the walk before the depth bound.
    pub truncated: bool,
}

pub struct GraphWalker<'a, M: MetadataClient> {
    client: &'a M,
    config: WalkerConfig,
}

impl<'a, M: MetadataClient> GraphWalker<'a, M> {
    pub fn new(client: &'a M, config: WalkerConfig) -> Self {
        Self { client, config }
    }

    pub fn walk(
        &self,
        seed: PaperRecord,
        sink: &dyn ProgressSink,
    ) -> Result<WalkResult, FetchError> {
        let mut frontier = Frontier::new(seed);
        let mut failures = Vec::new();
        let mut truncated = false;

        'levels: for depth in 1..=self.config.max_depth {
            let parents = frontier.level(depth - 1);
            if parents.is_empty() {
                break;
            }
            sink.event(ProgressEvent::new(format!(
                "phase=Expand; depth {depth}: expanding {} papers",
                parents.len()
            )));

            let before = frontier.len();
            for parent in parents {
                let neighbors = match self.client.neighbors_of_kind(&parent, self.config.edges) {
                    Ok(neighbors) => neighbors,
                    Err(err) => match self.config.policy {
                        ExpansionPolicy::Abort => return Err(err),
                        ExpansionPolicy::Skip => {
                            warn!(paper = %parent, error = %err, "skipping branch");
                            sink.event(ProgressEvent::new(format!(
                                "expand.failed {parent}: {err}"
                            )));
                            failures.push(ExpansionFailure {
                                paper_id: parent,
                                depth: depth - 1,
                                message: err.to_string(),
                            });
                            continue;
                        }
                    },
                };
                debug!(paper = %parent, neighbors = neighbors.len(), "expanded");

                for neighbor in neighbors.into_records() {
                    if frontier.contains(&neighbor.id) {
                        continue;
                    }
                    if self.at_capacity(&frontier) {
                        truncated = true;
                        break 'levels;
                    }
                    frontier.insert(neighbor.with_depth(depth));
                }
            }

            let discovered = frontier.len() - before;
            info!(depth, discovered, total = frontier.len(), "level expanded");
            if discovered == 0 {
                break;
            }
        }

        if truncated {
            warn!(max_papers = ?self.config.max_papers, "paper cap reached, walk stopped early");
        }

        Ok(WalkResult {
            papers: frontier.into_records(),
            failures,
            truncated,
        })
    }

    fn at_capacity(&self, frontier: &Frontier) -> bool {
        self.config
            .max_papers
            .is_some_and(|cap| frontier.len() >= cap)
    }
}
