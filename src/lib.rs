/*!
# tagcon
This library computes a single best-supported consensus sequence for a template from many noisy read alignments, the core step of long-read error correction.

Each read alignment is converted into a stream of tags keyed by (template position, insertion offset, base).
The tags are accumulated into a weighted DAG, the heaviest path through the DAG is found with a single forward sweep, and the consensus is read back from that path.

Key benefits:
* The DAG storage lives in a caller-owned, reusable workspace; nothing is global, so one workspace per thread is all that is needed for parallel windows
* Capacity limits are configuration, and hitting them is a recoverable error
* Reads with unrecognized bases are rejected explicitly instead of corrupting the DAG

# Example usage
```rust
use tagcon::alignment_tags::tag_alignment;
use tagcon::cns_config::BaseRejection;
use tagcon::consensus::consensus_from_tag_streams;
use tagcon::workspace::ConsensusWorkspace;

let template = b"ACGTACGT";
let streams = [
    tag_alignment(template, template, 0, 0, 0, 0),
    tag_alignment(b"ACGAACGT", template, 0, 0, 1, 0), // this substitution should get voted out
    tag_alignment(template, template, 0, 0, 2, 0)
];

// the workspace can be reused for every window
let mut workspace = ConsensusWorkspace::default();
let result = consensus_from_tag_streams(&mut workspace, &streams, template.len(), 1, BaseRejection::RejectRead).unwrap();
assert_eq!(result.sequence(), template);
assert_eq!(result.eqv(), &[1, 2, 1, 1, 0, 2, 1, 2]);
```
*/

/// Converts pairwise alignments into tag streams
pub mod alignment_tags;
/// Reconstructs the consensus from the scored DAG
pub mod backtrace;
/// Configuration for the consensus pipeline
pub mod cns_config;
/// Main functionality for the consensus component
pub mod consensus;
/// Error types for the consensus core
pub mod errors;
/// Utility for generating examples
pub mod example_gen;
/// Storage for a single DAG node
pub mod link_table;
/// Aligns reads to the template and drives a full consensus window
pub mod orchestrator;
/// Heaviest-path scoring over the DAG
pub mod scoring;
/// K-mer seeding of read-to-template alignments
pub mod seed_index;
/// Basic pair-wise alignment utilities
pub mod sequence_alignment;
/// Reusable storage for the consensus DAG
pub mod workspace;
