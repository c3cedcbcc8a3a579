
use log::trace;

use crate::alignment_tags::{Base, NodeKey, NUM_BASES};
use crate::errors::ConsensusError;
use crate::workspace::ConsensusWorkspace;

/// The node where the best-scoring path ends, used as the backtrace entry point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestNode {
    pub node: NodeKey,
    pub score: f64
}

/// Computes the best incoming link and path score for every node in the workspace.
/// Nodes are visited by increasing position, then insertion offset, then base; every link points strictly backwards in that order, so predecessor scores are always final when read.
/// Each link scores `predecessor score + link count - coverage / 2`, the root has a score of 0.
/// Ties keep the earlier candidate: the first recorded link within a node, and the first visited node globally.
/// Nodes without any links are skipped and can never be the best node.
/// # Arguments
/// * `workspace` - a workspace with all tags recorded; scores are written back into it
/// # Errors
/// * `DegenerateInput` if no node reaches a positive score
pub fn score_nodes(workspace: &mut ConsensusWorkspace) -> Result<BestNode, ConsensusError> {
    let mut global_best: Option<BestNode> = None;

    for position in 0..workspace.template_len() {
        let penalty = 0.5 * workspace.coverage(position) as f64;
        for delta in 0..workspace.active_deltas(position) {
            for base_index in 0..NUM_BASES {
                let table = workspace.table_at(position, delta, base_index);
                if table.is_empty() {
                    continue;
                }

                let mut best_predecessor: Option<NodeKey> = None;
                let mut best_score = f64::NEG_INFINITY;
                for link in table.links() {
                    let predecessor_score = match link.predecessor {
                        Some(p) => workspace.table(p).map_or(0.0, |t| t.score()),
                        None => 0.0
                    };
                    let score = predecessor_score + link.count as f64 - penalty;
                    if score > best_score {
                        best_score = score;
                        best_predecessor = link.predecessor;
                    }
                }
                workspace.table_at_mut(position, delta, base_index).set_best(best_predecessor, best_score);

                if global_best.map_or(true, |b| best_score > b.score) {
                    // base_index is always in range here
                    let base = Base::from_index(base_index).unwrap_or(Base::Gap);
                    global_best = Some(BestNode {
                        node: NodeKey::new(position, delta as u8, base),
                        score: best_score
                    });
                }
            }
        }
    }

    match global_best {
        Some(best) if best.score > 0.0 => {
            trace!("Best node {} with score {}", best.node, best.score);
            Ok(best)
        },
        _ => Err(ConsensusError::DegenerateInput)
    }
}
