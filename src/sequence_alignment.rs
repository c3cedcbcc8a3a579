
/*!
Basic pair-wise alignment utilities.
The consensus only needs an aligned pair of strings per read, so the aligner sits behind the `PairwiseAligner` trait and can be swapped out.

# Example usage
```rust
use tagcon::sequence_alignment::{BandedAligner, PairwiseAligner};

let aligner = BandedAligner::new(10);
let alignment = aligner.align(b"ACGATACGT", b"ACGTACGT").unwrap();
assert_eq!(alignment.query_aln, b"ACGATACGT");
assert_eq!(alignment.template_aln, b"ACG-TACGT");
assert_eq!(alignment.distance, 1);
```
*/

use std::cmp::min;
use std::ops::Range;

use crate::alignment_tags::GAP;

/// An aligned pair of sequences
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    /// The aligned query, with `-` for gaps
    pub query_aln: Vec<u8>,
    /// The aligned template, with `-` for gaps; always the same length as `query_aln`
    pub template_aln: Vec<u8>,
    /// Unit-cost edit distance of the alignment
    pub distance: usize,
    /// The part of the query covered by the alignment
    pub query_range: Range<usize>,
    /// The part of the template covered by the alignment
    pub template_range: Range<usize>
}

impl Alignment {
    /// Number of aligned columns
    pub fn len(&self) -> usize {
        self.query_aln.len()
    }

    pub fn is_empty(&self) -> bool {
        self.query_aln.is_empty()
    }

    /// Removes leading columns that have a gap on either side, moving the range starts forward to match.
    /// After trimming, the first column is a match or mismatch (or the alignment is empty).
    /// Returns the number of columns removed.
    pub fn trim_leading_gaps(&mut self) -> usize {
        let trimmed = self.query_aln.iter()
            .zip(self.template_aln.iter())
            .take_while(|&(&q, &t)| q == GAP || t == GAP)
            .count();

        for (&q, &t) in self.query_aln[..trimmed].iter().zip(self.template_aln[..trimmed].iter()) {
            if q != GAP {
                self.query_range.start += 1;
            }
            if t != GAP {
                self.template_range.start += 1;
            }
        }
        self.query_aln.drain(..trimmed);
        self.template_aln.drain(..trimmed);
        trimmed
    }

    /// Shifts both ranges, for alignments computed on sub-slices
    pub fn offset_ranges(&mut self, query_offset: usize, template_offset: usize) {
        self.query_range = (self.query_range.start + query_offset)..(self.query_range.end + query_offset);
        self.template_range = (self.template_range.start + template_offset)..(self.template_range.end + template_offset);
    }
}

/// Anything that can produce an alignment of a read against a template region
pub trait PairwiseAligner {
    /// Aligns `query` against `template`.
    /// Returns None if no alignment could be produced.
    fn align(&self, query: &[u8], template: &[u8]) -> Option<Alignment>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Move {
    Start,
    /// consumes one base of each
    Diagonal,
    /// consumes a query base only
    Insertion,
    /// consumes a template base only
    Deletion
}

/// Unit-cost global aligner restricted to a diagonal band.
/// The band covers every diagonal between 0 and the length difference, plus `band_tolerance` on each side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandedAligner {
    band_tolerance: usize
}

impl BandedAligner {
    /// Constructor
    /// # Arguments
    /// * `band_tolerance` - how far the alignment may drift from the diagonals implied by the lengths
    pub fn new(band_tolerance: usize) -> BandedAligner {
        BandedAligner {
            band_tolerance
        }
    }

    pub fn band_tolerance(&self) -> usize {
        self.band_tolerance
    }
}

impl Default for BandedAligner {
    fn default() -> Self {
        Self::new(150)
    }
}

impl PairwiseAligner for BandedAligner {
    /// Ties during traceback prefer a diagonal step, then an insertion, then a deletion.
    fn align(&self, query: &[u8], template: &[u8]) -> Option<Alignment> {
        if query.is_empty() || template.is_empty() {
            return None;
        }

        let n = query.len();
        let m = template.len();
        let length_diff = m as i64 - n as i64;
        let lo = length_diff.min(0) - self.band_tolerance as i64;
        let hi = length_diff.max(0) + self.band_tolerance as i64;
        let width = (hi - lo + 1) as usize;

        // cell (i, j) lives at row i, column j - i - lo
        let cell = |i: usize, j: usize| -> Option<usize> {
            let d = j as i64 - i as i64;
            if d < lo || d > hi {
                None
            } else {
                Some(i * width + (d - lo) as usize)
            }
        };

        let mut costs: Vec<u32> = vec![u32::MAX; (n + 1) * width];
        let mut moves: Vec<Move> = vec![Move::Start; (n + 1) * width];
        for i in 0..=n {
            let j_start = (i as i64 + lo).max(0) as usize;
            let j_end = (i as i64 + hi).min(m as i64);
            if j_end < j_start as i64 {
                continue;
            }
            for j in j_start..=(j_end as usize) {
                let index = i * width + (j as i64 - i as i64 - lo) as usize;
                if i == 0 && j == 0 {
                    costs[index] = 0;
                    continue;
                }

                let cost_at = |ci: usize, cj: usize| -> Option<u32> {
                    cell(ci, cj).map(|c| costs[c]).filter(|&c| c != u32::MAX)
                };
                let mut best: Option<(u32, Move)> = None;
                let mut consider = |candidate: Option<u32>, step: Move| {
                    if let Some(c) = candidate {
                        if best.map_or(true, |(b, _)| c < b) {
                            best = Some((c, step));
                        }
                    }
                };
                if i > 0 && j > 0 {
                    let mismatch = (query[i - 1] != template[j - 1]) as u32;
                    consider(cost_at(i - 1, j - 1).map(|c| c + mismatch), Move::Diagonal);
                }
                if i > 0 {
                    consider(cost_at(i - 1, j).map(|c| c + 1), Move::Insertion);
                }
                if j > 0 {
                    consider(cost_at(i, j - 1).map(|c| c + 1), Move::Deletion);
                }
                if let Some((c, step)) = best {
                    costs[index] = c;
                    moves[index] = step;
                }
            }
        }

        let distance = costs[cell(n, m)?];
        if distance == u32::MAX {
            return None;
        }

        let mut query_aln: Vec<u8> = Vec::with_capacity(n.max(m));
        let mut template_aln: Vec<u8> = Vec::with_capacity(n.max(m));
        let (mut i, mut j) = (n, m);
        while i > 0 || j > 0 {
            match moves[cell(i, j)?] {
                Move::Diagonal => {
                    query_aln.push(query[i - 1]);
                    template_aln.push(template[j - 1]);
                    i -= 1;
                    j -= 1;
                },
                Move::Insertion => {
                    query_aln.push(query[i - 1]);
                    template_aln.push(GAP);
                    i -= 1;
                },
                Move::Deletion => {
                    query_aln.push(GAP);
                    template_aln.push(template[j - 1]);
                    j -= 1;
                },
                Move::Start => return None
            }
        }
        query_aln.reverse();
        template_aln.reverse();

        Some(Alignment {
            query_aln,
            template_aln,
            distance: distance as usize,
            query_range: 0..n,
            template_range: 0..m
        })
    }
}

/// Returns the unit-cost edit distance between two sequences.
/// # Arguments
/// * `v1` - the first sequence
/// * `v2` - the second sequence
/// # Examples
/// ```rust
/// use tagcon::sequence_alignment::edit_distance;
/// assert_eq!(edit_distance(b"ACGTA", b"ACGTA"), 0);
/// assert_eq!(edit_distance(b"ACGTA", b"ACTTA"), 1);
/// assert_eq!(edit_distance(b"ACGTA", b"CGTC"), 2);
/// ```
pub fn edit_distance(v1: &[u8], v2: &[u8]) -> usize {
    // two rows of the full DP matrix
    let mut previous: Vec<usize> = (0..=v2.len()).collect();
    let mut current: Vec<usize> = vec![0; v2.len() + 1];
    for (i, &c1) in v1.iter().enumerate() {
        current[0] = i + 1;
        for (j, &c2) in v2.iter().enumerate() {
            let substitution = previous[j] + (c1 != c2) as usize;
            current[j + 1] = min(substitution, min(previous[j + 1], current[j]) + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[v2.len()]
}
