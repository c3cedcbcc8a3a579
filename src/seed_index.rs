
/*!
A k-mer seed index over a template, used to find the region of the template a read overlaps before running the pairwise aligner.
K-mers are 2-bit packed into a u64, so `k` is limited to 32.

# Example usage
```rust
use tagcon::seed_index::KmerIndex;

let template = b"ACGTTGCAAGCTTAGGCATCGATCGGATCCATGACTAGCTAGGCTTAACG";
let read = &template[10..40];

let index = KmerIndex::build(template, 8, 100);
let matches = index.find_matches(read);
let range = index.best_range(&matches, 48, 5).unwrap();
assert_eq!((range.query_start, range.query_end), (0, 30));
assert_eq!((range.template_start, range.template_end), (10, 40));
```
*/

use itertools::{Itertools, MinMaxResult};
use log::trace;
use rustc_hash::FxHashMap as HashMap;

/// A single shared k-mer between a read and the template
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KmerMatch {
    /// Start of the k-mer in the read
    pub query_pos: usize,
    /// Start of the k-mer in the template
    pub target_pos: usize
}

impl KmerMatch {
    /// The diagonal of the match, template position minus read position
    pub fn diagonal(&self) -> i64 {
        self.target_pos as i64 - self.query_pos as i64
    }
}

/// Half-open coordinate ranges on a read and the template that are expected to align to each other
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AlignmentRange {
    pub query_start: usize,
    pub query_end: usize,
    pub template_start: usize,
    pub template_end: usize
}

impl AlignmentRange {
    /// Constructor
    pub fn new(query_start: usize, query_end: usize, template_start: usize, template_end: usize) -> AlignmentRange {
        AlignmentRange {
            query_start,
            query_end,
            template_start,
            template_end
        }
    }

    pub fn query_span(&self) -> usize {
        self.query_end.saturating_sub(self.query_start)
    }

    pub fn template_span(&self) -> usize {
        self.template_end.saturating_sub(self.template_start)
    }

    /// Returns true if the ranges are non-empty and fit inside sequences of the given lengths
    pub fn fits(&self, query_len: usize, template_len: usize) -> bool {
        self.query_start < self.query_end && self.query_end <= query_len &&
            self.template_start < self.template_end && self.template_end <= template_len
    }
}

/// The ranges picked from the winning diagonal bin, with the number of matches that support them
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SeedChain {
    pub range: AlignmentRange,
    /// Matches within one bin of the winning diagonal
    pub hits: usize
}

/// Maps every k-mer of a template to the positions it occurs at
#[derive(Clone, Debug)]
pub struct KmerIndex {
    /// The k-mer length
    k: usize,
    /// Packed k-mer to sorted start positions in the template
    positions: HashMap<u64, Vec<usize>>
}

impl KmerIndex {
    /// Builds the index.
    /// Windows containing anything other than upper-case ACGT are skipped.
    /// # Arguments
    /// * `template` - the sequence to index
    /// * `k` - the k-mer length, must be in 1..=32
    /// * `mask_threshold` - k-mers occurring more often than this are dropped from the index
    pub fn build(template: &[u8], k: usize, mask_threshold: usize) -> KmerIndex {
        let mut positions: HashMap<u64, Vec<usize>> = Default::default();
        for_each_kmer(template, k, |pos, kmer| {
            positions.entry(kmer).or_default().push(pos);
        });

        let total = positions.len();
        positions.retain(|_kmer, hits| hits.len() <= mask_threshold);
        if positions.len() < total {
            trace!("Masked {} of {total} distinct k-mers", total - positions.len());
        }

        KmerIndex {
            k,
            positions
        }
    }

    /// Returns every shared k-mer between `read` and the template, ordered by read position and then template position
    pub fn find_matches(&self, read: &[u8]) -> Vec<KmerMatch> {
        let mut matches = vec![];
        for_each_kmer(read, self.k, |query_pos, kmer| {
            if let Some(hits) = self.positions.get(&kmer) {
                matches.extend(hits.iter().map(|&target_pos| KmerMatch { query_pos, target_pos }));
            }
        });
        matches
    }

    /// Picks the aligned region from a set of matches.
    /// Matches are binned by diagonal, the bin with the most matches wins (lowest diagonal on ties), and the
    /// range is the span of all matches within one bin of the winner, extended by `k` at the end.
    /// # Arguments
    /// * `matches` - the output of `find_matches()`
    /// * `bin_size` - width of a diagonal bin
    /// * `min_hits` - the winning bin needs at least this many matches
    pub fn best_range(&self, matches: &[KmerMatch], bin_size: usize, min_hits: usize) -> Option<AlignmentRange> {
        self.best_chain(matches, bin_size, min_hits).map(|chain| chain.range)
    }

    /// Same as `best_range()`, but also reports how many matches support the range
    pub fn best_chain(&self, matches: &[KmerMatch], bin_size: usize, min_hits: usize) -> Option<SeedChain> {
        let bin_size = bin_size.max(1) as i64;
        let bin_of = |m: &KmerMatch| m.diagonal().div_euclid(bin_size);

        let mut bin_counts: HashMap<i64, usize> = Default::default();
        for m in matches.iter() {
            *bin_counts.entry(bin_of(m)).or_insert(0) += 1;
        }

        let (best_bin, best_count) = bin_counts.into_iter()
            .max_by(|(b1, c1), (b2, c2)| c1.cmp(c2).then(b2.cmp(b1)))?;
        if best_count < min_hits.max(1) {
            trace!("Best diagonal bin has {best_count} hits, need {min_hits}");
            return None;
        }

        let chained: Vec<&KmerMatch> = matches.iter()
            .filter(|m| (bin_of(*m) - best_bin).abs() <= 1)
            .collect();
        let (query_start, query_last) = span_of(chained.iter().map(|m| m.query_pos))?;
        let (template_start, template_last) = span_of(chained.iter().map(|m| m.target_pos))?;
        Some(SeedChain {
            range: AlignmentRange::new(query_start, query_last + self.k, template_start, template_last + self.k),
            hits: chained.len()
        })
    }

    /// Convenience wrapper for `find_matches()` followed by `best_range()`
    pub fn locate(&self, read: &[u8], bin_size: usize, min_hits: usize) -> Option<AlignmentRange> {
        let matches = self.find_matches(read);
        self.best_range(&matches, bin_size, min_hits)
    }

    // Getters
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of distinct k-mers kept in the index
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn span_of(values: impl Iterator<Item = usize>) -> Option<(usize, usize)> {
    match values.minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max))
    }
}

fn encode_base(symbol: u8) -> Option<u64> {
    match symbol {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None
    }
}

/// Calls `f(start, packed)` for every k-mer in `seq` made only of ACGT
fn for_each_kmer(seq: &[u8], k: usize, mut f: impl FnMut(usize, u64)) {
    if k == 0 || k > 32 {
        return;
    }
    let mask: u64 = if k == 32 { u64::MAX } else { (1 << (2 * k)) - 1 };
    let mut kmer: u64 = 0;
    let mut valid: usize = 0;
    for (i, &s) in seq.iter().enumerate() {
        match encode_base(s) {
            Some(code) => {
                kmer = ((kmer << 2) | code) & mask;
                valid += 1;
            },
            None => {
                kmer = 0;
                valid = 0;
            }
        }
        if valid >= k {
            f(i + 1 - k, kmer);
        }
    }
}
