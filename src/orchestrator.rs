
/*!
Drives the whole consensus for one template window: aligns each read to the template, filters the alignments, folds the passing ones into the workspace, and calls the consensus.
The first sequence is always the template; every other sequence is a read that may or may not overlap it.

# Example usage
```rust
use tagcon::cns_config::CnsConfigBuilder;
use tagcon::example_gen::generate_reads;
use tagcon::orchestrator::ConsensusGenerator;
use tagcon::workspace::ConsensusWorkspace;

// the template and 4 error-free copies of it
let (template, reads) = generate_reads(800, 4, 0.0, 0);
let mut sequences = vec![template.clone()];
sequences.extend(reads);

let config = CnsConfigBuilder::default()
    .min_coverage(2)
    .build().unwrap();
let generator = ConsensusGenerator::with_config(config).unwrap();
let mut workspace = ConsensusWorkspace::default();

let result = generator.generate_consensus(&mut workspace, &sequences).unwrap();
assert_eq!(result.sequence(), &template);
```
*/

use log::{debug, trace, warn};
use simple_error::bail;
use std::cmp::Reverse;
use std::ops::Range;

use crate::alignment_tags::tag_alignment;
use crate::cns_config::{CnsConfig, CnsConfigBuilder};
use crate::consensus::{call_consensus, ConsensusResult};
use crate::errors::ConsensusError;
use crate::seed_index::{AlignmentRange, KmerIndex};
use crate::sequence_alignment::{Alignment, BandedAligner, PairwiseAligner};
use crate::workspace::ConsensusWorkspace;

/// Generates consensus sequences for template windows with a fixed configuration and aligner.
/// The generator holds no mutable state, the DAG storage is the caller's workspace.
#[derive(Clone, Debug)]
pub struct ConsensusGenerator<A: PairwiseAligner = BandedAligner> {
    /// The configuration for filtering and calling
    config: CnsConfig,
    /// Produces the read-to-template alignments
    aligner: A
}

impl ConsensusGenerator<BandedAligner> {
    /// Creates a generator using the default banded aligner with the configured band.
    /// # Arguments
    /// * `config` - the configuration to use
    /// # Errors
    /// * if the config fails validation
    pub fn with_config(config: CnsConfig) -> Result<ConsensusGenerator<BandedAligner>, Box<dyn std::error::Error>> {
        let aligner = BandedAligner::new(config.band_tolerance);
        Self::with_aligner(config, aligner)
    }
}

impl<A: PairwiseAligner> ConsensusGenerator<A> {
    /// Creates a generator with a custom aligner.
    /// # Arguments
    /// * `config` - the configuration to use
    /// * `aligner` - produces the alignments that get tagged
    /// # Errors
    /// * if the config fails validation
    pub fn with_aligner(config: CnsConfig, aligner: A) -> Result<ConsensusGenerator<A>, Box<dyn std::error::Error>> {
        config.validate()?;
        Ok(ConsensusGenerator {
            config,
            aligner
        })
    }

    /// Generates the consensus for `sequences[0]`, locating each read on the template with a k-mer seed index.
    /// If no read produces an acceptable alignment, the result is empty.
    /// # Arguments
    /// * `workspace` - reusable DAG storage, anything from a previous window is cleared
    /// * `sequences` - the template followed by the reads; read ids in the tags are indices into this slice
    /// # Errors
    /// * if `sequences` is empty
    /// * `ConsensusError::TemplateCapacityExceeded` if the template does not fit in the workspace, before any alignment is done
    /// * any other `ConsensusError` from recording or calling, these abort the window
    pub fn generate_consensus<R: AsRef<[u8]>>(&self, workspace: &mut ConsensusWorkspace, sequences: &[R]) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
        let Some(template) = sequences.first() else {
            bail!("At least one sequence is required, the first is the template");
        };
        let template = template.as_ref();
        workspace.prepare(template.len())?;

        let selected: Vec<(usize, &[u8])> = self.select_reads(sequences)
            .into_iter()
            .map(move |read_id| (read_id, sequences[read_id].as_ref()))
            .collect();
        self.seeded_window(workspace, template, &selected)
    }

    /// Generates the consensus for `sequences[0]` after trimming each read down to the part that seeds onto the template.
    /// A read is dropped if its seeded range leaves more than `edge_tolerance` unaligned on both the read and the template at the same end,
    /// if the range is not longer than `trim_min_span`, or if it has fewer than `trim_min_seed_hits` seed hits.
    /// The kept reads lose `trim_size` bases at both ends of their range and are used longest first.
    /// # Arguments
    /// * `workspace` - reusable DAG storage, anything from a previous window is cleared
    /// * `sequences` - the template followed by the reads; read ids in the tags are indices into this slice
    /// # Errors
    /// * if `sequences` is empty
    /// * `ConsensusError::TemplateCapacityExceeded` if the template does not fit in the workspace, before any alignment is done
    /// * any other `ConsensusError` from recording or calling, these abort the window
    pub fn generate_consensus_with_trim<R: AsRef<[u8]>>(&self, workspace: &mut ConsensusWorkspace, sequences: &[R]) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
        let Some(template) = sequences.first() else {
            bail!("At least one sequence is required, the first is the template");
        };
        let template = template.as_ref();
        workspace.prepare(template.len())?;

        let index = KmerIndex::build(template, self.config.kmer_size, self.config.trim_kmer_mask_threshold);
        let mut trimmed: Vec<(usize, &[u8])> = sequences.iter()
            .enumerate()
            .skip(1)
            .filter_map(|(read_id, read)| {
                let read = read.as_ref();
                self.trimmed_range(&index, read_id, read, template.len())
                    .map(|range| (read_id, &read[range]))
            })
            .collect();
        // longest alignments first
        trimmed.sort_by_key(|&(_read_id, read)| Reverse(read.len()));
        debug!("Kept {} of {} reads after trimming", trimmed.len(), sequences.len() - 1);

        if trimmed.len() > self.config.max_reads {
            let lengths: Vec<usize> = std::iter::once(template.len())
                .chain(trimmed.iter().map(|(_read_id, read)| read.len()))
                .collect();
            trimmed = longest_read_indices(&lengths, self.config.max_reads, self.config.max_coverage_aln)
                .into_iter()
                .skip(1)
                .map(|i| trimmed[i - 1])
                .collect();
        }
        self.seeded_window(workspace, template, &trimmed)
    }

    /// Generates the consensus for `sequences[0]` using caller-provided alignment ranges instead of the seed index.
    /// Leading alignment columns with a gap on either side are trimmed before tagging so that every tag stream starts on a template-anchored column.
    /// # Arguments
    /// * `workspace` - reusable DAG storage, anything from a previous window is cleared
    /// * `sequences` - the template followed by the reads
    /// * `ranges` - one range per sequence; `ranges[0]` belongs to the template and is ignored
    /// # Errors
    /// * if `sequences` is empty or the number of ranges does not match the number of sequences
    /// * `ConsensusError::TemplateCapacityExceeded` if the template does not fit in the workspace, before any alignment is done
    /// * any other `ConsensusError` from recording or calling, these abort the window
    pub fn generate_consensus_from_mapping<R: AsRef<[u8]>>(
        &self, workspace: &mut ConsensusWorkspace, sequences: &[R], ranges: &[AlignmentRange]
    ) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
        let Some(template) = sequences.first() else {
            bail!("At least one sequence is required, the first is the template");
        };
        if ranges.len() != sequences.len() {
            bail!("Expected one alignment range per sequence, got {} ranges for {} sequences", ranges.len(), sequences.len());
        }
        let template = template.as_ref();
        workspace.prepare(template.len())?;

        let selected = self.select_reads(sequences);
        let mut accepted: usize = 0;
        for &read_id in selected.iter() {
            let read = sequences[read_id].as_ref();
            let range = ranges[read_id];
            if !range.fits(read.len(), template.len()) {
                warn!("Read {read_id}: alignment range {range:?} is outside of the read or template, skipping");
                continue;
            }
            if !self.passes_span_filter(read_id, &range) {
                continue;
            }
            let Some(mut alignment) = self.align_range(read, template, &range) else {
                trace!("Read {read_id}: aligner returned no alignment");
                continue;
            };
            let trimmed = alignment.trim_leading_gaps();
            if trimmed > 0 {
                trace!("Read {read_id}: trimmed {trimmed} leading indel columns");
            }
            if self.fold_alignment(workspace, read_id, &alignment)? {
                accepted += 1;
            }
        }

        self.finish_window(workspace, selected.len(), accepted)
    }

    /// Seeds every read on the template, aligns and folds the ones that pass, then calls the consensus.
    /// The workspace must already be prepared for `template`.
    fn seeded_window(&self, workspace: &mut ConsensusWorkspace, template: &[u8], reads: &[(usize, &[u8])]) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
        let index = KmerIndex::build(template, self.config.kmer_size, self.config.kmer_mask_threshold);
        let mut accepted: usize = 0;
        for &(read_id, read) in reads.iter() {
            let Some(range) = index.locate(read, self.config.seed_bin_size(), self.config.min_seed_hits) else {
                trace!("Read {read_id}: not enough k-mer hits on the template");
                continue;
            };
            if !self.passes_span_filter(read_id, &range) {
                continue;
            }
            let Some(alignment) = self.align_range(read, template, &range) else {
                trace!("Read {read_id}: aligner returned no alignment");
                continue;
            };
            if self.fold_alignment(workspace, read_id, &alignment)? {
                accepted += 1;
            }
        }

        self.finish_window(workspace, reads.len(), accepted)
    }

    /// Seeds a read for trim mode and returns the part of it to keep, None if the read is dropped
    fn trimmed_range(&self, index: &KmerIndex, read_id: usize, read: &[u8], template_len: usize) -> Option<Range<usize>> {
        let matches = index.find_matches(read);
        let Some(chain) = index.best_chain(&matches, self.config.seed_bin_size(), self.config.trim_min_seed_hits) else {
            trace!("Read {read_id}: not enough k-mer hits to trim");
            return None;
        };

        // reach half a k-mer past the last seed
        let half_k = self.config.kmer_size / 2;
        let (query_start, template_start) = (chain.range.query_start, chain.range.template_start);
        let query_end = (chain.range.query_end + half_k).min(read.len());
        let template_end = (chain.range.template_end + half_k).min(template_len);

        let tolerance = self.config.edge_tolerance;
        if query_start > tolerance && template_start > tolerance {
            trace!("Read {read_id}: unaligned start of {query_start}/{template_start} is past {tolerance}");
            return None;
        }
        if read.len() - query_end > tolerance && template_len - template_end > tolerance {
            trace!("Read {read_id}: unaligned end of {}/{} is past {tolerance}", read.len() - query_end, template_len - template_end);
            return None;
        }

        let query_span = query_end - query_start;
        let longest_span = query_span.max(template_end - template_start);
        if query_span <= self.config.trim_min_span || longest_span <= self.config.trim_min_span {
            trace!("Read {read_id}: seeded span {query_span} is not above {}", self.config.trim_min_span);
            return None;
        }
        Some(query_start + self.config.trim_size..query_end - self.config.trim_size)
    }

    /// Picks which reads (never the template) are aligned, in the order they are processed.
    /// All reads are used in input order unless there are more than `max_reads` sequences.
    fn select_reads<R: AsRef<[u8]>>(&self, sequences: &[R]) -> Vec<usize> {
        if sequences.len() <= self.config.max_reads {
            return (1..sequences.len()).collect();
        }

        let lengths: Vec<usize> = sequences.iter().map(|s| s.as_ref().len()).collect();
        let selected = longest_read_indices(&lengths, self.config.max_reads, self.config.max_coverage_aln);
        debug!("Selected {} of {} reads", selected.len().saturating_sub(1), sequences.len() - 1);
        selected.into_iter().skip(1).collect()
    }

    /// Checks the minimum spans and the span difference of a candidate range
    fn passes_span_filter(&self, read_id: usize, range: &AlignmentRange) -> bool {
        let query_span = range.query_span();
        let template_span = range.template_span();
        if query_span < self.config.min_aligned_span || template_span < self.config.min_aligned_span {
            trace!("Read {read_id}: span {query_span}/{template_span} is below {}", self.config.min_aligned_span);
            return false;
        }

        let span_diff = query_span.abs_diff(template_span);
        let allowed = (0.5 * self.config.max_indel_fraction * (query_span + template_span) as f64) as usize;
        if span_diff > allowed {
            trace!("Read {read_id}: span difference {span_diff} is above {allowed}");
            return false;
        }
        true
    }

    /// Aligns the read and template sub-slices of `range`, returning an alignment in full-sequence coordinates
    fn align_range(&self, read: &[u8], template: &[u8], range: &AlignmentRange) -> Option<Alignment> {
        let mut alignment = self.aligner.align(
            &read[range.query_start..range.query_end],
            &template[range.template_start..range.template_end]
        )?;
        alignment.offset_ranges(range.query_start, range.template_start);
        Some(alignment)
    }

    /// Applies the length and identity filters, then tags the alignment and records it.
    /// Returns true if the read contributed to the workspace.
    /// Read-local failures are logged and reported as false, anything else is an error.
    fn fold_alignment(&self, workspace: &mut ConsensusWorkspace, read_id: usize, alignment: &Alignment) -> Result<bool, ConsensusError> {
        let aligned_len = alignment.len();
        if aligned_len <= self.config.min_aligned_len {
            trace!("Read {read_id}: aligned length {aligned_len} is not above {}", self.config.min_aligned_len);
            return Ok(false);
        }
        let divergence = alignment.distance as f64 / aligned_len as f64;
        if divergence >= self.config.max_divergence() {
            trace!("Read {read_id}: divergence {divergence:.3} is not below {:.3}", self.config.max_divergence());
            return Ok(false);
        }

        let stream = tag_alignment(
            &alignment.query_aln, &alignment.template_aln,
            alignment.query_range.start, alignment.template_range.start,
            read_id, 0
        );
        match workspace.add_tag_stream(&stream, self.config.base_rejection) {
            Ok(recorded) => Ok(recorded > 0),
            Err(e) if e.is_read_local() => {
                warn!("Skipping read {read_id}: {e}");
                Ok(false)
            },
            Err(e) => Err(e)
        }
    }

    /// Calls the consensus once every read was considered
    fn finish_window(&self, workspace: &mut ConsensusWorkspace, considered: usize, accepted: usize) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
        debug!("Template length {}: {accepted} of {considered} reads accepted", workspace.template_len());
        if accepted == 0 {
            return Ok(ConsensusResult::empty());
        }
        let result = call_consensus(workspace, self.config.min_coverage)?;
        debug!("Consensus length {} with {} corrected bases", result.len(), result.corrected_regions(1).iter().map(|r| r.len()).sum::<usize>());
        Ok(result)
    }

    // Getters
    pub fn config(&self) -> &CnsConfig {
        &self.config
    }

    pub fn aligner(&self) -> &A {
        &self.aligner
    }
}

/// Generates the consensus for `sequences[0]` using the internal seed index and the default settings for everything else.
/// # Arguments
/// * `workspace` - reusable DAG storage, anything from a previous window is cleared
/// * `sequences` - the template followed by the reads
/// * `min_coverage` - a base is upper-case only if its coverage is strictly greater than this
/// * `kmer_size` - the seed k-mer length
/// * `min_identity` - minimum identity for an alignment to contribute
/// # Errors
/// * if the parameters are invalid, or anything `ConsensusGenerator::generate_consensus()` reports
pub fn generate_consensus<R: AsRef<[u8]>>(
    workspace: &mut ConsensusWorkspace, sequences: &[R], min_coverage: u32, kmer_size: usize, min_identity: f64
) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
    let generator = simple_generator(min_coverage, kmer_size, min_identity)?;
    generator.generate_consensus(workspace, sequences)
}

/// Generates the consensus for `sequences[0]` from caller-provided alignment ranges and the default settings for everything else.
/// # Arguments
/// * `workspace` - reusable DAG storage, anything from a previous window is cleared
/// * `sequences` - the template followed by the reads
/// * `ranges` - one range per sequence; `ranges[0]` is ignored
/// * `min_coverage` - a base is upper-case only if its coverage is strictly greater than this
/// * `kmer_size` - the seed k-mer length, only validated on this path
/// * `min_identity` - minimum identity for an alignment to contribute
/// # Errors
/// * if the parameters are invalid, or anything `ConsensusGenerator::generate_consensus_from_mapping()` reports
pub fn generate_consensus_from_mapping<R: AsRef<[u8]>>(
    workspace: &mut ConsensusWorkspace, sequences: &[R], ranges: &[AlignmentRange], min_coverage: u32, kmer_size: usize, min_identity: f64
) -> Result<ConsensusResult, Box<dyn std::error::Error>> {
    let generator = simple_generator(min_coverage, kmer_size, min_identity)?;
    generator.generate_consensus_from_mapping(workspace, sequences, ranges)
}

fn simple_generator(min_coverage: u32, kmer_size: usize, min_identity: f64) -> Result<ConsensusGenerator, Box<dyn std::error::Error>> {
    let config = CnsConfigBuilder::default()
        .min_coverage(min_coverage)
        .kmer_size(kmer_size)
        .min_identity(min_identity)
        .build()?;
    ConsensusGenerator::with_config(config)
}

/// Picks the template plus the longest reads.
/// Index 0 is the template and is always first; the reads follow from longest to shortest, ties in input order.
/// # Arguments
/// * `lengths` - sequence lengths, template first
/// * `max_reads` - the most sequences to return, template included
/// * `max_coverage_aln` - if non-zero, reads are added only until their total length passes this many times the template length
pub fn longest_read_indices(lengths: &[usize], max_reads: usize, max_coverage_aln: usize) -> Vec<usize> {
    let Some(&template_len) = lengths.first() else {
        return vec![];
    };
    let mut order: Vec<usize> = (1..lengths.len()).collect();
    order.sort_by_key(|&i| Reverse(lengths[i]));

    let mut keep = max_reads;
    if max_coverage_aln > 0 && template_len > 0 {
        keep = 1;
        let mut read_coverage: usize = 0;
        for &i in order.iter() {
            if read_coverage / template_len > max_coverage_aln {
                break;
            }
            keep += 1;
            read_coverage += lengths[i];
        }
        keep = keep.min(max_reads);
    }

    std::iter::once(0)
        .chain(order)
        .take(keep)
        .collect()
}
