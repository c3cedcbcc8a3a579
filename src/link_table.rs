
use crate::alignment_tags::NodeKey;
use crate::errors::ConsensusError;

/// Capacity of a table when its first link is recorded
pub const INITIAL_LINK_CAPACITY: usize = 8;
/// Once past half the ceiling, capacity grows by this much instead of doubling
pub const LINK_CAPACITY_INCREMENT: usize = 256;

/// One distinct incoming edge of a DAG node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    /// The node this edge comes from; None is the synthetic root
    pub predecessor: Option<NodeKey>,
    /// How many tags used exactly this edge
    pub count: u32
}

/// Storage for a single DAG node: the multiset of incoming predecessor links plus the scoring state.
/// Predecessors are unique within a table, repeats only bump the link count.
#[derive(Clone, Debug, Default)]
pub struct LinkTable {
    /// Distinct links, in the order they were first seen
    links: Vec<Link>,
    /// Number of link slots currently reserved
    capacity: usize,
    /// Total number of tags recorded, including repeats of the same link
    total_count: u32,
    /// The predecessor chosen by scoring, None for the root or when unscored
    best_predecessor: Option<NodeKey>,
    /// Best path score into this node
    score: f64
}

impl LinkTable {
    /// An empty table with nothing reserved
    pub const fn new() -> LinkTable {
        LinkTable {
            links: Vec::new(),
            capacity: 0,
            total_count: 0,
            best_predecessor: None,
            score: 0.0
        }
    }

    /// Records one incoming tag.
    /// # Arguments
    /// * `node` - the key of this table, only used for error reporting
    /// * `predecessor` - the node the tag links from, None for the root
    /// * `max_links` - the ceiling on distinct links for this table
    /// # Errors
    /// * `LinkCapacityExceeded` if a new distinct link is needed and the table is at the ceiling; the table is left unchanged
    pub fn record(&mut self, node: NodeKey, predecessor: Option<NodeKey>, max_links: usize) -> Result<(), ConsensusError> {
        if let Some(link) = self.links.iter_mut().find(|l| l.predecessor == predecessor) {
            link.count += 1;
            self.total_count += 1;
            return Ok(());
        }

        if self.links.len() == self.capacity {
            self.grow(node, max_links)?;
        }
        self.links.push(Link {
            predecessor,
            count: 1
        });
        self.total_count += 1;
        Ok(())
    }

    /// Reserves more link slots: doubling while small, then fixed increments, never past `max_links`.
    fn grow(&mut self, node: NodeKey, max_links: usize) -> Result<(), ConsensusError> {
        if self.capacity >= max_links {
            return Err(ConsensusError::LinkCapacityExceeded { node, max_links });
        }
        let grown = if self.capacity == 0 {
            INITIAL_LINK_CAPACITY
        } else if self.capacity < max_links / 2 {
            self.capacity * 2
        } else {
            self.capacity + LINK_CAPACITY_INCREMENT
        };
        let new_capacity = grown.min(max_links);

        self.links.reserve_exact(new_capacity - self.links.len());
        self.capacity = new_capacity;
        Ok(())
    }

    /// Clears all links and scoring state but keeps the reserved storage
    pub fn reset(&mut self) {
        self.links.clear();
        self.total_count = 0;
        self.best_predecessor = None;
        self.score = 0.0;
    }

    /// Stores the result of scoring this node
    pub(crate) fn set_best(&mut self, best_predecessor: Option<NodeKey>, score: f64) {
        self.best_predecessor = best_predecessor;
        self.score = score;
    }

    // Getters
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn best_predecessor(&self) -> Option<NodeKey> {
        self.best_predecessor
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
