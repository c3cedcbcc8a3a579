/*!
The reusable storage for the consensus DAG.
A workspace is sized for a maximum template length and is cleared, not reallocated, between consensus runs.
It holds no global state, so each worker thread should own its own workspace (or borrow one from a pool).

# Example usage
```rust
use tagcon::alignment_tags::{tag_alignment, Base, NodeKey};
use tagcon::cns_config::BaseRejection;
use tagcon::workspace::ConsensusWorkspace;

let mut workspace = ConsensusWorkspace::new(1000, 100);
workspace.prepare(4).unwrap();

let stream = tag_alignment(b"ACGT", b"ACGT", 0, 0, 0, 0);
let recorded = workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
assert_eq!(recorded, 4);
assert_eq!(workspace.coverage(2), 1);

let table = workspace.table(NodeKey::new(2, 0, Base::G)).unwrap();
assert_eq!(table.total_count(), 1);
```
*/

use log::warn;

use crate::alignment_tags::{AlignmentTag, NodeKey, TagStream, NUM_BASES};
use crate::cns_config::{BaseRejection, CnsConfig};
use crate::errors::ConsensusError;
use crate::link_table::LinkTable;

/// Extra insertion-offset slots allocated past the largest offset seen at a position
const DELTA_HEADROOM: usize = 8;
/// Insertion offsets are u8, so there are never more slots than this
const MAX_DELTA_SLOTS: usize = u8::MAX as usize + 1;
/// Stands in for nodes whose insertion-offset slot was never allocated
static EMPTY_TABLE: LinkTable = LinkTable::new();

/// All nodes at one template position, indexed by insertion offset and then base
#[derive(Debug, Default)]
struct PositionGroup {
    /// One table per base for each insertion offset
    deltas: Vec<[LinkTable; NUM_BASES]>,
    /// Largest insertion offset recorded since the last clear
    max_delta: u8
}

impl PositionGroup {
    /// Makes sure there is a slot for `delta`, growing with some headroom
    fn ensure_delta(&mut self, delta: u8) {
        self.max_delta = self.max_delta.max(delta);
        let needed = delta as usize + 1;
        if self.deltas.len() < needed {
            let new_len = (delta as usize + DELTA_HEADROOM).min(MAX_DELTA_SLOTS);
            self.deltas.resize_with(new_len, Default::default);
        }
    }

    /// Number of insertion offsets that may hold data
    fn active_deltas(&self) -> usize {
        (self.max_delta as usize + 1).min(self.deltas.len())
    }

    fn clear(&mut self) {
        let active = self.active_deltas();
        for slot in self.deltas[..active].iter_mut() {
            for table in slot.iter_mut() {
                table.reset();
            }
        }
        self.max_delta = 0;
    }
}

/// Caller-owned storage for the consensus DAG and the per-position coverage
#[derive(Debug)]
pub struct ConsensusWorkspace {
    /// DAG nodes for each template position; may be longer than the current template
    positions: Vec<PositionGroup>,
    /// Number of reads with a delta=0 tag at each template position
    coverage: Vec<u32>,
    /// Length of the template currently loaded
    template_len: usize,
    /// Largest template this workspace accepts
    max_template_len: usize,
    /// Ceiling on distinct links per node
    max_links: usize
}

impl ConsensusWorkspace {
    /// Creates an empty workspace; storage is allocated as templates are loaded and then reused.
    /// # Arguments
    /// * `max_template_len` - the largest template length `prepare()` will accept
    /// * `max_links` - the ceiling on distinct predecessor links per DAG node
    pub fn new(max_template_len: usize, max_links: usize) -> ConsensusWorkspace {
        ConsensusWorkspace {
            positions: vec![],
            coverage: vec![],
            template_len: 0,
            max_template_len,
            max_links
        }
    }

    /// Creates a workspace with the ceilings from a config
    pub fn with_config(config: &CnsConfig) -> ConsensusWorkspace {
        Self::new(config.max_template_len, config.max_links_per_node)
    }

    /// Clears anything from a previous run and loads an empty template of the given length.
    /// # Arguments
    /// * `template_len` - the length of the template for the next consensus
    /// # Errors
    /// * `TemplateCapacityExceeded` if the template is longer than this workspace supports, nothing is modified in that case
    pub fn prepare(&mut self, template_len: usize) -> Result<(), ConsensusError> {
        if template_len > self.max_template_len {
            return Err(ConsensusError::TemplateCapacityExceeded {
                template_len,
                max_template_len: self.max_template_len
            });
        }

        self.clear();
        if self.positions.len() < template_len {
            self.positions.resize_with(template_len, Default::default);
        }
        if self.coverage.len() < template_len {
            self.coverage.resize(template_len, 0);
        }
        self.template_len = template_len;
        Ok(())
    }

    /// Resets every node and coverage counter touched since the last clear, keeping all allocations.
    pub fn clear(&mut self) {
        for group in self.positions[..self.template_len].iter_mut() {
            group.clear();
        }
        self.coverage[..self.template_len].fill(0);
        self.template_len = 0;
    }

    /// Folds all tags of one read into the DAG.
    /// # Arguments
    /// * `stream` - the tags for a single read
    /// * `policy` - how tags with unrecognized bases are handled
    /// # Errors
    /// * `PositionOutOfRange` if any tag lies outside the prepared template, nothing is recorded in that case
    /// * `UnrecognizedBase` under `BaseRejection::RejectRead` if any tag has an unrecognized base, nothing is recorded in that case
    /// * `LinkCapacityExceeded` if a node runs out of link capacity
    pub fn add_tag_stream(&mut self, stream: &TagStream, policy: BaseRejection) -> Result<usize, ConsensusError> {
        // validate up front so rejected reads leave no partial state behind
        for tag in stream.tags() {
            if tag.position >= self.template_len {
                return Err(ConsensusError::PositionOutOfRange {
                    read_id: tag.read_id,
                    position: tag.position,
                    template_len: self.template_len
                });
            }
            if policy == BaseRejection::RejectRead && tag.base.index().is_none() {
                return Err(unrecognized_base(tag));
            }
        }

        let mut recorded: usize = 0;
        let mut last_accepted: Option<NodeKey> = None;
        let mut relink = false;
        for tag in stream.tags() {
            let Some(base_index) = tag.base.index() else {
                warn!("Skipping tag: {}", unrecognized_base(tag));
                relink = true;
                continue;
            };

            // after a skipped tag, link to whatever was last recorded for this read
            let predecessor = if relink { last_accepted } else { tag.predecessor };
            self.record_tag(tag.key(), base_index, predecessor)?;

            last_accepted = Some(tag.key());
            relink = false;
            recorded += 1;
        }
        Ok(recorded)
    }

    /// Adds a single tag to the node at `node`, updating coverage and the delta dimension.
    fn record_tag(&mut self, node: NodeKey, base_index: usize, predecessor: Option<NodeKey>) -> Result<(), ConsensusError> {
        if node.delta == 0 {
            self.coverage[node.position] += 1;
        }
        let group = &mut self.positions[node.position];
        group.ensure_delta(node.delta);
        group.deltas[node.delta as usize][base_index].record(node, predecessor, self.max_links)
    }

    /// Returns the table for a node.
    /// Any node in the loaded template has a table, empty if nothing was recorded for it since the last `prepare()`.
    /// None if the position is past the template or the base is unrecognized.
    pub fn table(&self, node: NodeKey) -> Option<&LinkTable> {
        if node.position >= self.template_len {
            return None;
        }
        let base_index = node.base.index()?;
        let table = self.positions[node.position].deltas
            .get(node.delta as usize)
            .map_or(&EMPTY_TABLE, |slot| &slot[base_index]);
        Some(table)
    }

    /// Number of insertion offsets at `position` that may hold data, 0 if nothing was recorded there
    pub(crate) fn active_deltas(&self, position: usize) -> usize {
        self.positions[position].active_deltas()
    }

    pub(crate) fn table_at(&self, position: usize, delta: usize, base_index: usize) -> &LinkTable {
        &self.positions[position].deltas[delta][base_index]
    }

    pub(crate) fn table_at_mut(&mut self, position: usize, delta: usize, base_index: usize) -> &mut LinkTable {
        &mut self.positions[position].deltas[delta][base_index]
    }

    // Getters
    pub fn coverage(&self, position: usize) -> u32 {
        self.coverage[..self.template_len].get(position).copied().unwrap_or(0)
    }

    pub fn max_delta(&self, position: usize) -> u8 {
        self.positions[..self.template_len].get(position).map_or(0, |g| g.max_delta)
    }

    pub fn template_len(&self) -> usize {
        self.template_len
    }

    pub fn max_template_len(&self) -> usize {
        self.max_template_len
    }

    pub fn max_links(&self) -> usize {
        self.max_links
    }
}

impl Default for ConsensusWorkspace {
    fn default() -> Self {
        Self::with_config(&CnsConfig::default())
    }
}

fn unrecognized_base(tag: &AlignmentTag) -> ConsensusError {
    ConsensusError::UnrecognizedBase {
        read_id: tag.read_id,
        position: tag.position,
        symbol: tag.base.symbol() as char
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_tags::{tag_alignment, Base};
    use crate::link_table::Link;

    #[test]
    fn test_coverage_counts_anchored_tags() {
        let mut workspace = ConsensusWorkspace::new(100, 100);
        workspace.prepare(5).unwrap();

        // two reads, the second has an insertion after position 1 and a deletion of position 3
        let s1 = tag_alignment(b"ACGTA", b"ACGTA", 0, 0, 1, 0);
        let s2 = tag_alignment(b"ACCG-A", b"AC-GTA", 0, 0, 2, 0);
        assert_eq!(workspace.add_tag_stream(&s1, BaseRejection::RejectRead).unwrap(), 5);
        assert_eq!(workspace.add_tag_stream(&s2, BaseRejection::RejectRead).unwrap(), 6);

        // the inserted base does not add coverage, the deletion does
        let coverage: Vec<u32> = (0..5).map(|p| workspace.coverage(p)).collect();
        assert_eq!(coverage, vec![2, 2, 2, 2, 2]);
        assert_eq!(workspace.max_delta(1), 1);
        assert_eq!(workspace.max_delta(2), 0);

        let inserted = workspace.table(NodeKey::new(1, 1, Base::C)).unwrap();
        assert_eq!(inserted.links(), &[Link { predecessor: Some(NodeKey::new(1, 0, Base::C)), count: 1 }]);

        let deleted = workspace.table(NodeKey::new(3, 0, Base::Gap)).unwrap();
        assert_eq!(deleted.total_count(), 1);

        // both reads share the link into position 2
        let shared = workspace.table(NodeKey::new(2, 0, Base::G)).unwrap();
        assert_eq!(shared.total_count(), 2);
        assert_eq!(shared.links().len(), 2);
    }

    #[test]
    fn test_template_too_long() {
        let mut workspace = ConsensusWorkspace::new(10, 100);
        assert_eq!(workspace.prepare(11), Err(ConsensusError::TemplateCapacityExceeded {
            template_len: 11,
            max_template_len: 10
        }));
        assert!(workspace.prepare(10).is_ok());
        assert_eq!(workspace.template_len(), 10);
    }

    #[test]
    fn test_position_out_of_range() {
        let mut workspace = ConsensusWorkspace::new(10, 100);
        workspace.prepare(3).unwrap();
        let stream = tag_alignment(b"ACGT", b"ACGT", 0, 0, 4, 0);
        let result = workspace.add_tag_stream(&stream, BaseRejection::RejectRead);
        assert_eq!(result, Err(ConsensusError::PositionOutOfRange { read_id: 4, position: 3, template_len: 3 }));

        // nothing was recorded
        assert_eq!(workspace.coverage(0), 0);
    }

    #[test]
    fn test_reject_read() {
        let mut workspace = ConsensusWorkspace::new(10, 100);
        workspace.prepare(4).unwrap();
        let stream = tag_alignment(b"ACNT", b"ACGT", 0, 0, 9, 0);
        let result = workspace.add_tag_stream(&stream, BaseRejection::RejectRead);
        assert_eq!(result, Err(ConsensusError::UnrecognizedBase { read_id: 9, position: 2, symbol: 'N' }));
        assert!((0..4).all(|p| workspace.coverage(p) == 0));
        assert!(workspace.table(NodeKey::new(0, 0, Base::A)).unwrap().is_empty());
    }

    #[test]
    fn test_table_lookup_ignores_history() {
        // one workspace that held a wide insertion before, one that never held anything
        let mut used = ConsensusWorkspace::new(10, 100);
        used.prepare(4).unwrap();
        let stream = tag_alignment(b"ACGGGGT", b"AC---GT", 0, 0, 0, 0);
        used.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        used.prepare(4).unwrap();

        let mut fresh = ConsensusWorkspace::new(10, 100);
        fresh.prepare(4).unwrap();

        for node in [NodeKey::new(0, 0, Base::A), NodeKey::new(1, 2, Base::G), NodeKey::new(3, 40, Base::Gap)] {
            for workspace in [&used, &fresh] {
                let table = workspace.table(node).unwrap();
                assert!(table.is_empty());
                assert_eq!(table.score(), 0.0);
                assert_eq!(table.best_predecessor(), None);
            }
        }

        // outside the template or on an unrecognized base there is no table in either
        for workspace in [&used, &fresh] {
            assert!(workspace.table(NodeKey::new(4, 0, Base::A)).is_none());
            assert!(workspace.table(NodeKey::new(0, 0, Base::Unrecognized(b'N'))).is_none());
        }
    }

    #[test]
    fn test_reject_tag_relinks() {
        let mut workspace = ConsensusWorkspace::new(10, 100);
        workspace.prepare(4).unwrap();
        let stream = tag_alignment(b"ACNT", b"ACGT", 0, 0, 9, 0);
        let recorded = workspace.add_tag_stream(&stream, BaseRejection::RejectTag).unwrap();
        assert_eq!(recorded, 3);

        // position 2 has no coverage and the T links back over the skipped tag
        assert_eq!(workspace.coverage(2), 0);
        let t_table = workspace.table(NodeKey::new(3, 0, Base::T)).unwrap();
        assert_eq!(t_table.links(), &[Link { predecessor: Some(NodeKey::new(1, 0, Base::C)), count: 1 }]);

        // a leading unrecognized base links the next tag to the root
        let stream = tag_alignment(b"NCGT", b"ACGT", 0, 0, 10, 0);
        workspace.add_tag_stream(&stream, BaseRejection::RejectTag).unwrap();
        let c_table = workspace.table(NodeKey::new(1, 0, Base::C)).unwrap();
        assert!(c_table.links().contains(&Link { predecessor: None, count: 1 }));
    }

    #[test]
    fn test_reuse_clears_state() {
        let mut workspace = ConsensusWorkspace::new(100, 100);
        workspace.prepare(6).unwrap();
        let mut query = b"AC".to_vec();
        query.extend(std::iter::repeat(b'G').take(20));
        query.extend_from_slice(b"TACG");
        let mut template = b"AC".to_vec();
        template.extend(std::iter::repeat(b'-').take(20));
        template.extend_from_slice(b"TACG");
        let stream = tag_alignment(&query, &template, 0, 0, 0, 0);
        workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        assert_eq!(workspace.max_delta(1), 20);

        // a shorter template afterwards starts from nothing
        workspace.prepare(3).unwrap();
        assert_eq!(workspace.template_len(), 3);
        assert_eq!(workspace.max_delta(1), 0);
        assert!((0..3).all(|p| workspace.coverage(p) == 0));
        assert!(workspace.table(NodeKey::new(1, 5, Base::G)).unwrap().is_empty());
        assert!(workspace.table(NodeKey::new(4, 0, Base::C)).is_none());

        // and growing back does not resurrect old data
        workspace.prepare(6).unwrap();
        assert_eq!(workspace.coverage(4), 0);
        assert!(workspace.table(NodeKey::new(4, 0, Base::C)).unwrap().is_empty());
    }

    #[test]
    fn test_link_capacity_error() {
        let mut workspace = ConsensusWorkspace::new(10, 2);
        workspace.prepare(2).unwrap();

        // three different first bases all feed the same node at position 1
        for (read_id, query) in [b"AC", b"CC", b"GC"].iter().enumerate() {
            let stream = tag_alignment(*query, b"AC", 0, 0, read_id, 0);
            let result = workspace.add_tag_stream(&stream, BaseRejection::RejectRead);
            if read_id < 2 {
                assert!(result.is_ok());
            } else {
                let err = result.unwrap_err();
                assert!(err.is_capacity_exceeded());
                assert_eq!(err, ConsensusError::LinkCapacityExceeded { node: NodeKey::new(1, 0, Base::C), max_links: 2 });
            }
        }
    }
}
