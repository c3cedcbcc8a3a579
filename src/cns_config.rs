/*!
Contains configuration information for the tag consensus pipeline.
Typical usage is to the use the builder to construct the config, e.g.
```
use tagcon::cns_config::{BaseRejection, CnsConfig, CnsConfigBuilder};
let config: CnsConfig = CnsConfigBuilder::default()
    .min_coverage(4)
    .base_rejection(BaseRejection::RejectTag)
    .build()
    .unwrap();
assert!(config.validate().is_ok());
```
*/

use simple_error::bail;

/// Enumeration of what happens when an alignment tag carries a symbol outside of {A, C, G, T, -}.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BaseRejection {
    /// The whole read is dropped from the consensus, nothing from it is recorded
    #[default]
    RejectRead,
    /// Only the offending tag is dropped; the next accepted tag links to the last accepted one
    RejectTag
}

/**
Contains configuration information for the tag consensus pipeline.
Typical usage is to the use the builder to construct the config, e.g.
```
use tagcon::cns_config::{CnsConfig, CnsConfigBuilder};
let config: CnsConfig = CnsConfigBuilder::default()
    .min_identity(0.8)
    .max_template_len(50_000)
    .build()
    .unwrap();
```
*/
#[derive(derive_builder::Builder, Clone, Debug)]
#[builder(default)]
pub struct CnsConfig {
    /// A consensus base is upper-cased only if its template position coverage is strictly greater than this
    pub min_coverage: u32,
    /// The k-mer length used for seeding the internal alignments
    pub kmer_size: usize,
    /// Minimum identity of an alignment for it to contribute tags
    pub min_identity: f64,
    /// Largest template the workspace will accept
    pub max_template_len: usize,
    /// Largest number of distinct predecessor links a single DAG node may hold
    pub max_links_per_node: usize,
    /// Minimum span on both the read and the template for a candidate alignment
    pub min_aligned_span: usize,
    /// Maximum allowed difference between read and template span, as a fraction of the mean span
    pub max_indel_fraction: f64,
    /// An alignment must be strictly longer than this (in columns) to contribute tags
    pub min_aligned_len: usize,
    /// Extra band width for the pairwise aligner beyond the span length difference
    pub band_tolerance: usize,
    /// Diagonal bins for seed chaining are `kmer_size * seed_band_factor` wide
    pub seed_band_factor: usize,
    /// Minimum number of k-mer hits in the best diagonal bin
    pub min_seed_hits: usize,
    /// Template k-mers seen more often than this are ignored for seeding
    pub kmer_mask_threshold: usize,
    /// Maximum number of sequences (template included) used for a single consensus
    pub max_reads: usize,
    /// If non-zero, the longest reads are kept until they reach this many-fold template coverage
    pub max_coverage_aln: usize,
    /// What to do with reads carrying unrecognized bases
    pub base_rejection: BaseRejection,
    /// Trim mode: bases removed from each end of a read's seeded range
    pub trim_size: usize,
    /// Trim mode: a read is dropped if its seeded range leaves more than this unaligned on both sequences at the same end
    pub edge_tolerance: usize,
    /// Trim mode: the seeded range must be strictly longer than this on the read, and the longer span too
    pub trim_min_span: usize,
    /// Trim mode: minimum number of k-mer hits in the winning diagonal bin
    pub trim_min_seed_hits: usize,
    /// Trim mode: template k-mers seen more often than this are ignored for seeding
    pub trim_kmer_mask_threshold: usize
}

impl Default for CnsConfig {
    fn default() -> Self {
        Self {
            // 6 is the usual error-correction depth requirement
            min_coverage: 6,
            // 8-mers keep the index small and are enough for pre-assembly reads
            kmer_size: 8,
            // 70% identity tolerates raw long-read error rates
            min_identity: 0.70,
            // one pre-assembled read worth of template
            max_template_len: 128_000,
            // just under u16::MAX
            max_links_per_node: 65_533,
            // shorter overlaps carry too little signal
            min_aligned_span: 100,
            // 10% of the mean span, i.e. 5% of the combined spans
            max_indel_fraction: 0.10,
            min_aligned_len: 500,
            // wide enough for the usual indel drift across a read
            band_tolerance: 150,
            seed_band_factor: 6,
            min_seed_hits: 5,
            // effectively only masks simple repeats
            kmer_mask_threshold: 10_000,
            max_reads: 500,
            // disabled by default
            max_coverage_aln: 0,
            base_rejection: BaseRejection::RejectRead,
            trim_size: 50,
            edge_tolerance: 1000,
            trim_min_span: 500,
            // 21 hits is a chain score above 1000 at 48 per hit
            trim_min_seed_hits: 21,
            // only seed on k-mers that are close to unique in the template
            trim_kmer_mask_threshold: 16
        }
    }
}

impl CnsConfig {
    /// Sanity checks the configured values.
    /// # Errors
    /// * if the k-mer size cannot be 2-bit packed into a u64
    /// * if identity or indel fractions are outside of their valid ranges
    /// * if any of the capacity ceilings are 0
    /// * if trimming would leave nothing of a read that passes the trim span filter
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.kmer_size == 0 || self.kmer_size > 32 {
            bail!("kmer_size must be in 1..=32, got {}", self.kmer_size);
        }
        if !(0.0..=1.0).contains(&self.min_identity) {
            bail!("min_identity must be in [0, 1], got {}", self.min_identity);
        }
        if !self.max_indel_fraction.is_finite() || self.max_indel_fraction < 0.0 {
            bail!("max_indel_fraction must be a non-negative number, got {}", self.max_indel_fraction);
        }
        if self.max_template_len == 0 {
            bail!("max_template_len must be greater than 0");
        }
        if self.max_links_per_node == 0 {
            bail!("max_links_per_node must be greater than 0");
        }
        if self.seed_band_factor == 0 {
            bail!("seed_band_factor must be greater than 0");
        }
        if 2 * self.trim_size >= self.trim_min_span.max(1) {
            bail!("trim_size of {} would remove every read passing trim_min_span of {}", self.trim_size, self.trim_min_span);
        }
        if self.max_reads < 2 {
            bail!("max_reads must allow the template and at least one read, got {}", self.max_reads);
        }
        Ok(())
    }

    /// The width of a diagonal bin used for seed chaining
    pub fn seed_bin_size(&self) -> usize {
        self.kmer_size * self.seed_band_factor
    }

    /// The largest normalized edit distance an alignment may have to contribute tags
    pub fn max_divergence(&self) -> f64 {
        1.0 - self.min_identity
    }
}
