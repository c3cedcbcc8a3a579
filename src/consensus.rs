
/*!
This module provides the consensus result type and the tag-level entry points that turn accumulated tags into a consensus.

# Example usage
```rust
use tagcon::alignment_tags::tag_alignment;
use tagcon::cns_config::BaseRejection;
use tagcon::consensus::consensus_from_tag_streams;
use tagcon::workspace::ConsensusWorkspace;

let template = b"ACGTACGT";
let streams = [
    tag_alignment(template, template, 0, 0, 0, 0),
    tag_alignment(b"ACGAACGT", template, 0, 0, 1, 0), // minority substitution
    tag_alignment(template, template, 0, 0, 2, 0)
];

let mut workspace = ConsensusWorkspace::new(1000, 100);
let result = consensus_from_tag_streams(&mut workspace, &streams, template.len(), 1, BaseRejection::RejectRead).unwrap();
assert_eq!(result.sequence(), template);
assert_eq!(result.eqv(), &[1, 2, 1, 1, 0, 2, 1, 2]);
```
*/

use log::{debug, warn};

use crate::alignment_tags::TagStream;
use crate::backtrace::backtrace;
use crate::cns_config::BaseRejection;
use crate::errors::ConsensusError;
use crate::scoring::score_nodes;
use crate::workspace::ConsensusWorkspace;

/// Contains a final consensus result
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsensusResult {
    /// The consensus; upper-case where the coverage was above the threshold, lower-case elsewhere
    sequence: Vec<u8>,
    /// One confidence value per consensus base
    eqv: Vec<i32>
}

impl ConsensusResult {
    /// Constructor
    pub fn new(sequence: Vec<u8>, eqv: Vec<i32>) -> ConsensusResult {
        ConsensusResult {
            sequence,
            eqv
        }
    }

    /// A result with no bases, returned when no alignment could contribute
    pub fn empty() -> ConsensusResult {
        Default::default()
    }

    /// Returns all maximal runs of upper-case `ACGT` that are at least `min_len` long, in order.
    /// These are the well-supported regions of the consensus.
    /// # Arguments
    /// * `min_len` - the shortest run to report
    pub fn corrected_regions(&self, min_len: usize) -> Vec<&[u8]> {
        self.sequence
            .split(|c| !matches!(c, b'A' | b'C' | b'G' | b'T'))
            .filter(|region| !region.is_empty() && region.len() >= min_len)
            .collect()
    }

    /// Returns the longest well-supported region, the last one on ties; None if there is no upper-case base at all
    pub fn longest_corrected_region(&self) -> Option<&[u8]> {
        self.corrected_regions(1)
            .into_iter()
            .max_by_key(|region| region.len())
    }

    // Getters
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn eqv(&self) -> &[i32] {
        &self.eqv
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Scores the DAG accumulated in the workspace and backtraces the best path.
/// # Arguments
/// * `workspace` - a prepared workspace with all tags recorded
/// * `min_coverage` - coverage threshold for upper-case calls
/// # Errors
/// * `DegenerateInput` if nothing in the workspace scores positively
pub fn call_consensus(workspace: &mut ConsensusWorkspace, min_coverage: u32) -> Result<ConsensusResult, ConsensusError> {
    let best = score_nodes(workspace)?;
    let result = backtrace(workspace, best, min_coverage);
    debug!("Called consensus of length {} with best score {} at {}", result.len(), best.score, best.node);
    Ok(result)
}

/// Runs the full tag-level pipeline: loads the template, folds every stream in, and calls the consensus.
/// Streams rejected for an unrecognized base are skipped with a warning; if no stream is accepted, the result is empty.
/// # Arguments
/// * `workspace` - the reusable storage, anything from a previous run is cleared
/// * `streams` - one tag stream per read
/// * `template_len` - the length of the template the streams were tagged against
/// * `min_coverage` - coverage threshold for upper-case calls
/// * `policy` - how tags with unrecognized bases are handled
/// # Errors
/// * `TemplateCapacityExceeded` if the template does not fit into the workspace
/// * `PositionOutOfRange` or `LinkCapacityExceeded` if a stream cannot be recorded
/// * `DegenerateInput` if the accepted streams do not produce a positive score
pub fn consensus_from_tag_streams(
    workspace: &mut ConsensusWorkspace, streams: &[TagStream], template_len: usize, min_coverage: u32, policy: BaseRejection
) -> Result<ConsensusResult, ConsensusError> {
    workspace.prepare(template_len)?;

    let mut accepted: usize = 0;
    for stream in streams.iter() {
        match workspace.add_tag_stream(stream, policy) {
            Ok(0) => {},
            Ok(_) => accepted += 1,
            Err(e) if e.is_read_local() => {
                warn!("Skipping read {}: {e}", stream.read_id());
            },
            Err(e) => return Err(e)
        }
    }

    if accepted == 0 {
        debug!("No tag streams accepted out of {}, returning an empty consensus", streams.len());
        return Ok(ConsensusResult::empty());
    }
    call_consensus(workspace, min_coverage)
}
