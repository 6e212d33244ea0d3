use std::collections::{hash_map::Entry, HashMap};

use redy_client::{NodeReading, Reading};

/// Result of folding one cycle's nodes into the registry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleOutcome {
    /// Readings seen for the first time, in order of first sighting.
    pub created: Vec<Reading>,
    /// Already known readings whose values were overwritten.
    pub updated: Vec<Reading>,
}

/// Every reading ever seen, keyed by node id. Readings are never dropped
/// because a node went quiet; they just stop changing.
#[derive(Debug, Default)]
pub struct ReadingRegistry {
    readings: HashMap<String, Reading>,
}

impl ReadingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: &str) -> Option<&Reading> {
        self.readings.get(id)
    }

    /// Create-or-update every node. A node repeated within the cycle ends up
    /// once in the outcome, carrying its last values.
    pub fn reconcile(&mut self, nodes: Vec<NodeReading>) -> CycleOutcome {
        let mut created: Vec<String> = Vec::new();
        let mut updated: Vec<String> = Vec::new();

        for node in nodes {
            match self.readings.entry(node.id.clone()) {
                Entry::Occupied(mut e) => {
                    let id = e.key().clone();
                    e.get_mut().apply(node);
                    if !created.contains(&id) && !updated.contains(&id) {
                        updated.push(id);
                    }
                }
                Entry::Vacant(e) => {
                    created.push(e.key().clone());
                    e.insert(Reading::from_node(node));
                }
            }
        }

        CycleOutcome {
            created: self.collect(&created),
            updated: self.collect(&updated),
        }
    }

    /// Drop readings the host refused to register, so the next cycle that
    /// reports them creates them again.
    pub fn forget<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            self.readings.remove(id);
        }
    }

    fn collect(&self, ids: &[String]) -> Vec<Reading> {
        ids.iter()
            .filter_map(|id| self.readings.get(id).cloned())
            .collect()
    }
}
