
use log::debug;

use crate::consensus::ConsensusResult;
use crate::scoring::BestNode;
use crate::workspace::ConsensusWorkspace;

/// Walks the best-predecessor pointers from `best` back to the root and builds the consensus.
/// Bases are upper-case where the template position coverage is strictly above `min_coverage`, lower-case otherwise; gaps emit nothing.
/// Each emitted base gets an eqv value, the truncated score of its node minus the truncated score of its predecessor (0 for the root).
/// The walk is bounded to twice the template length in emitted bases, and to three times the template length in visited nodes.
/// # Arguments
/// * `workspace` - a workspace that was already scored
/// * `best` - the entry point returned by scoring
/// * `min_coverage` - coverage threshold for upper-case calls
pub fn backtrace(workspace: &ConsensusWorkspace, best: BestNode, min_coverage: u32) -> ConsensusResult {
    let max_len = 2 * workspace.template_len();
    // gap nodes emit nothing, a valid path has at most one per template position
    let max_steps = max_len + workspace.template_len();
    let mut steps: usize = 0;
    let mut sequence: Vec<u8> = Vec::with_capacity(workspace.template_len());
    let mut eqv: Vec<i32> = Vec::with_capacity(workspace.template_len());

    let mut current = Some(best.node);
    while let Some(node) = current {
        if sequence.len() >= max_len {
            debug!("Backtrace reached the length bound of {max_len} at node {node}");
            break;
        }
        if steps >= max_steps {
            debug!("Backtrace reached the step bound of {max_steps} at node {node}");
            break;
        }
        steps += 1;
        let Some(table) = workspace.table(node) else {
            debug!("Backtrace hit missing node {node}");
            break;
        };

        let predecessor_score = table.best_predecessor()
            .and_then(|p| workspace.table(p))
            .map_or(0.0, |t| t.score());

        let uppercase = workspace.coverage(node.position) > min_coverage;
        if let Some(letter) = node.base.letter(uppercase) {
            sequence.push(letter);
            eqv.push(table.score().trunc() as i32 - predecessor_score.trunc() as i32);
        }

        current = table.best_predecessor();
    }

    // the walk went from the end of the template towards the start
    sequence.reverse();
    eqv.reverse();
    ConsensusResult::new(sequence, eqv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_tags::{tag_alignment, Base, NodeKey};
    use crate::cns_config::BaseRejection;
    use crate::scoring::score_nodes;

    fn run(template: &[u8], alignments: &[(&[u8], &[u8])], min_coverage: u32) -> ConsensusResult {
        let mut workspace = ConsensusWorkspace::new(1000, 1000);
        workspace.prepare(template.len()).unwrap();
        for (read_id, (query_aln, template_aln)) in alignments.iter().enumerate() {
            let stream = tag_alignment(query_aln, template_aln, 0, 0, read_id, 0);
            workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        }
        let best = score_nodes(&mut workspace).unwrap();
        backtrace(&workspace, best, min_coverage)
    }

    #[test]
    fn test_majority_substitution() {
        let template: &[u8] = b"ACGTACGT";
        let alt: &[u8] = b"ACGTACAT";
        let result = run(template, &[
            (template, template),
            (alt, template),
            (template, template),
            (alt, template),
            (template, template)
        ], 2);
        assert_eq!(result.sequence(), b"ACGTACGT");

        // scores are 2.5, 5, ... 15, then 15.5 at the G (3 links) and 16 at the final T
        assert_eq!(result.eqv(), &[2, 3, 2, 3, 2, 3, 0, 1]);
    }

    #[test]
    fn test_strict_coverage_threshold() {
        let template: &[u8] = b"ACGT";
        let alignments = [(template, template), (template, template), (template, template)];

        // coverage equal to the threshold is lower-case
        let result = run(template, &alignments, 3);
        assert_eq!(result.sequence(), b"acgt");

        let result = run(template, &alignments, 2);
        assert_eq!(result.sequence(), b"ACGT");
    }

    #[test]
    fn test_single_read_insertion() {
        let template: &[u8] = b"ACGTACGT";
        let query_aln: &[u8] = b"ACGATACGT";
        let template_aln: &[u8] = b"ACG-TACGT";
        let result = run(template, &[(query_aln, template_aln)], 1);

        // a single read is below any useful coverage, so everything is lower-case including the inserted base
        assert_eq!(result.sequence(), b"acgatacgt");
        assert_eq!(result.eqv().len(), 9);
    }

    #[test]
    fn test_minority_insertion_dropped() {
        let template: &[u8] = b"ACGTACGT";
        let query_aln: &[u8] = b"ACGATACGT";
        let template_aln: &[u8] = b"ACG-TACGT";
        let result = run(template, &[
            (template, template),
            (query_aln, template_aln),
            (template, template),
            (template, template)
        ], 2);
        assert_eq!(result.sequence(), b"ACGTACGT");
    }

    #[test]
    fn test_majority_deletion_skips_gap() {
        let template: &[u8] = b"ACGTACGT";
        let deleted: &[u8] = b"ACG-ACGT";
        let result = run(template, &[
            (deleted, template),
            (deleted, template),
            (template, template)
        ], 1);

        // the gap wins at position 3 and emits nothing
        assert_eq!(result.sequence(), b"ACGACGT");
        assert_eq!(result.eqv().len(), 7);
    }

    #[test]
    fn test_length_bound() {
        let template: &[u8] = b"ACGT";
        let mut workspace = ConsensusWorkspace::new(100, 100);
        workspace.prepare(template.len()).unwrap();
        let stream = tag_alignment(template, template, 0, 0, 0, 0);
        workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        let best = score_nodes(&mut workspace).unwrap();
        assert_eq!(best.node, NodeKey::new(3, 0, Base::T));

        // a linear path stays well inside the bound
        let result = backtrace(&workspace, best, 0);
        assert_eq!(result.sequence(), b"ACGT");
        assert!(result.len() <= 2 * template.len());
    }

    #[test]
    fn test_length_bound_on_cycle() {
        let template: &[u8] = b"ACGT";
        let mut workspace = ConsensusWorkspace::new(100, 100);
        workspace.prepare(template.len()).unwrap();
        let stream = tag_alignment(template, template, 0, 0, 0, 0);
        workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        let best = score_nodes(&mut workspace).unwrap();

        // point the first node back at the last one, so the path never reaches the root
        let score = workspace.table_at(0, 0, 0).score();
        workspace.table_at_mut(0, 0, 0).set_best(Some(NodeKey::new(3, 0, Base::T)), score);

        let result = backtrace(&workspace, best, 0);
        assert_eq!(result.len(), 2 * template.len());
        assert_eq!(result.sequence(), b"ACGTACGT");
        assert_eq!(result.eqv().len(), 2 * template.len());
    }

    #[test]
    fn test_step_bound_on_gap_cycle() {
        let template: &[u8] = b"ACGT";
        let mut workspace = ConsensusWorkspace::new(100, 100);
        workspace.prepare(template.len()).unwrap();
        let stream = tag_alignment(b"A--T", template, 0, 0, 0, 0);
        workspace.add_tag_stream(&stream, BaseRejection::RejectRead).unwrap();
        let best = score_nodes(&mut workspace).unwrap();
        assert_eq!(backtrace(&workspace, best, 0).sequence(), b"AT");

        // two gap nodes pointing at each other emit nothing, the walk still has to end
        let gap_index = 4;
        let c_gap = NodeKey::new(1, 0, Base::Gap);
        let g_gap = NodeKey::new(2, 0, Base::Gap);
        workspace.table_at_mut(1, 0, gap_index).set_best(Some(g_gap), 1.0);
        workspace.table_at_mut(2, 0, gap_index).set_best(Some(c_gap), 1.0);

        let result = backtrace(&workspace, BestNode { node: g_gap, score: 1.0 }, 0);
        assert!(result.is_empty());

        // entering the cycle from the T only emits the T
        let result = backtrace(&workspace, best, 0);
        assert_eq!(result.sequence(), b"T");
    }
}
