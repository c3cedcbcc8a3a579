/*!
Converts a pairwise alignment into a stream of position-linked tags.
Each aligned column becomes one tag keyed by (template position, insertion offset, base), linked to the tag emitted before it.

# Example usage
```rust
use tagcon::alignment_tags::{tag_alignment, Base, NodeKey};

// one inserted read base between template positions 2 and 3
let stream = tag_alignment(b"ACGATACGT", b"ACG-TACGT", 0, 0, 1, 0);
assert_eq!(stream.len(), 9);

let inserted = &stream.tags()[3];
assert_eq!(inserted.key(), NodeKey::new(2, 1, Base::A));
assert_eq!(inserted.predecessor, Some(NodeKey::new(2, 0, Base::G)));
```
*/

use log::warn;
use std::fmt;

/// The gap symbol used in aligned strings
pub const GAP: u8 = b'-';
/// Number of recognized symbols, A, C, G, T, and the gap
pub const NUM_BASES: usize = 5;

/// A symbol from one column of an aligned read.
/// Anything outside of the recognized alphabet is kept as `Unrecognized` so it can be rejected explicitly downstream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Base {
    A,
    C,
    G,
    T,
    Gap,
    Unrecognized(u8)
}

impl Base {
    /// Maps an aligned-string symbol to a Base; only upper-case ACGT and `-` are recognized.
    pub fn from_ascii(symbol: u8) -> Base {
        match symbol {
            b'A' => Base::A,
            b'C' => Base::C,
            b'G' => Base::G,
            b'T' => Base::T,
            GAP => Base::Gap,
            other => Base::Unrecognized(other)
        }
    }

    /// The storage index of the base, or None if it cannot be stored.
    pub fn index(self) -> Option<usize> {
        match self {
            Base::A => Some(0),
            Base::C => Some(1),
            Base::G => Some(2),
            Base::T => Some(3),
            Base::Gap => Some(4),
            Base::Unrecognized(_) => None
        }
    }

    /// Inverse of `index()`
    pub fn from_index(index: usize) -> Option<Base> {
        match index {
            0 => Some(Base::A),
            1 => Some(Base::C),
            2 => Some(Base::G),
            3 => Some(Base::T),
            4 => Some(Base::Gap),
            _ => None
        }
    }

    /// The consensus letter for this base, None for gaps and unrecognized symbols.
    /// # Arguments
    /// * `uppercase` - if true, returns the upper-case letter, otherwise lower-case
    pub fn letter(self, uppercase: bool) -> Option<u8> {
        let upper = match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
            Base::Gap | Base::Unrecognized(_) => return None
        };
        if uppercase {
            Some(upper)
        } else {
            Some(upper.to_ascii_lowercase())
        }
    }

    /// The raw symbol as it would appear in an aligned string
    pub fn symbol(self) -> u8 {
        match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
            Base::Gap => GAP,
            Base::Unrecognized(s) => s
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol() as char)
    }
}

/// Identifies one DAG node: a template position, the insertion offset after it, and the base.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeKey {
    pub position: usize,
    pub delta: u8,
    pub base: Base
}

impl NodeKey {
    pub fn new(position: usize, delta: u8, base: Base) -> NodeKey {
        NodeKey {
            position,
            delta,
            base
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.position, self.delta, self.base)
    }
}

/// One aligned column of one read against the template
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignmentTag {
    /// Template coordinate of the last template-consuming column
    pub position: usize,
    /// Number of consecutive inserted read bases since that column, 0 for template-consuming columns
    pub delta: u8,
    /// The read symbol in this column, possibly a gap
    pub base: Base,
    /// The previously emitted tag of the same read; None for the first tag
    pub predecessor: Option<NodeKey>,
    /// The read this tag came from
    pub read_id: usize
}

impl AlignmentTag {
    /// The DAG node this tag is recorded into
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.position, self.delta, self.base)
    }
}

/// All tags for a single read, in alignment order.
/// The stream length is the only end marker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagStream {
    /// The read these tags came from
    read_id: usize,
    /// The ordered tags
    tags: Vec<AlignmentTag>,
    /// Half-open range of read coordinates covered by the emitted tags
    query_span: (usize, usize)
}

impl TagStream {
    // Getters
    pub fn read_id(&self) -> usize {
        self.read_id
    }

    pub fn tags(&self) -> &[AlignmentTag] {
        &self.tags
    }

    pub fn query_span(&self) -> (usize, usize) {
        self.query_span
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Walks an aligned pair column by column and emits one tag per column.
/// Emission stops, without error, the first time the template coordinate would be negative or the insertion offset no longer fits in a u8.
/// Everything after that column is discarded.
/// # Arguments
/// * `query_aln` - the aligned read string, `-` for gaps
/// * `template_aln` - the aligned template string, `-` for gaps; should be the same length as `query_aln`
/// * `query_start` - read coordinate of the first aligned column
/// * `template_start` - template coordinate of the first aligned column
/// * `read_id` - identifier stored in every tag
/// * `template_offset` - added to every template coordinate
pub fn tag_alignment(query_aln: &[u8], template_aln: &[u8], query_start: usize, template_start: usize, read_id: usize, template_offset: i64) -> TagStream {
    if query_aln.len() != template_aln.len() {
        warn!("Aligned strings for read {read_id} differ in length ({} != {}), only the common prefix is tagged", query_aln.len(), template_aln.len());
    }

    // j is the template coordinate, jj the insertion offset since the last template base
    let mut i: usize = query_start;
    let mut j: i64 = template_start as i64 - 1;
    let mut jj: i64 = 0;
    let mut predecessor: Option<NodeKey> = None;
    let mut tags = Vec::with_capacity(query_aln.len().min(template_aln.len()));

    for (&q, &t) in query_aln.iter().zip(template_aln.iter()) {
        if q == GAP && t == GAP {
            // consumes nothing on either side
            continue;
        }

        let mut next_i = i;
        if q != GAP {
            next_i += 1;
            jj += 1;
        }
        if t != GAP {
            j += 1;
            jj = 0;
        }

        let position = j + template_offset;
        if position < 0 || jj >= u8::MAX as i64 {
            break;
        }

        let tag = AlignmentTag {
            position: position as usize,
            delta: jj as u8,
            base: Base::from_ascii(q),
            predecessor,
            read_id
        };
        predecessor = Some(tag.key());
        tags.push(tag);
        i = next_i;
    }

    TagStream {
        read_id,
        tags,
        query_span: (query_start, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_mapping() {
        for (i, &s) in b"ACGT-".iter().enumerate() {
            let base = Base::from_ascii(s);
            assert_eq!(base.index(), Some(i));
            assert_eq!(Base::from_index(i), Some(base));
            assert_eq!(base.symbol(), s);
        }
        assert_eq!(Base::from_ascii(b'N'), Base::Unrecognized(b'N'));
        assert_eq!(Base::from_ascii(b'a'), Base::Unrecognized(b'a'));
        assert_eq!(Base::Unrecognized(b'N').index(), None);
        assert_eq!(Base::from_index(5), None);

        assert_eq!(Base::C.letter(true), Some(b'C'));
        assert_eq!(Base::C.letter(false), Some(b'c'));
        assert_eq!(Base::Gap.letter(true), None);
        assert_eq!(Base::Unrecognized(b'N').letter(true), None);
    }

    #[test]
    fn test_exact_match() {
        let stream = tag_alignment(b"ACGT", b"ACGT", 0, 10, 7, 0);
        assert_eq!(stream.len(), 4);
        assert_eq!(stream.read_id(), 7);
        assert_eq!(stream.query_span(), (0, 4));

        let tags = stream.tags();
        assert_eq!(tags[0], AlignmentTag {
            position: 10,
            delta: 0,
            base: Base::A,
            predecessor: None,
            read_id: 7
        });
        for (k, tag) in tags.iter().enumerate().skip(1) {
            assert_eq!(tag.position, 10 + k);
            assert_eq!(tag.delta, 0);
            assert_eq!(tag.predecessor, Some(tags[k - 1].key()));
        }
    }

    #[test]
    fn test_insertion_and_deletion() {
        // insertion of 2 bases after template position 1, deletion of template position 3
        let stream = tag_alignment(b"ACTTG-A", b"AC--GTA", 5, 0, 0, 0);
        let keys: Vec<NodeKey> = stream.tags().iter().map(|t| t.key()).collect();
        assert_eq!(keys, vec![
            NodeKey::new(0, 0, Base::A),
            NodeKey::new(1, 0, Base::C),
            NodeKey::new(1, 1, Base::T),
            NodeKey::new(1, 2, Base::T),
            NodeKey::new(2, 0, Base::G),
            NodeKey::new(3, 0, Base::Gap),
            NodeKey::new(4, 0, Base::A)
        ]);
        assert_eq!(stream.tags()[4].predecessor, Some(NodeKey::new(1, 2, Base::T)));
        assert_eq!(stream.query_span(), (5, 11));
    }

    #[test]
    fn test_template_offset() {
        let stream = tag_alignment(b"ACG", b"ACG", 0, 0, 0, 100);
        assert_eq!(stream.tags()[0].position, 100);
        assert_eq!(stream.tags()[2].position, 102);
    }

    #[test]
    fn test_negative_position_truncates() {
        // leading insertion at template start has nowhere to anchor
        let stream = tag_alignment(b"TACG", b"-ACG", 0, 0, 0, 0);
        assert!(stream.is_empty());
        assert_eq!(stream.query_span(), (0, 0));

        // a negative offset drops everything until the coordinate is valid
        let stream = tag_alignment(b"ACGT", b"ACGT", 0, 0, 0, -2);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_long_insertion_truncates() {
        // 300 inserted bases after template position 1
        let insert_len = 300;
        let mut query = b"AC".to_vec();
        query.extend(std::iter::repeat(b'T').take(insert_len));
        query.extend_from_slice(b"GT");
        let mut template = b"AC".to_vec();
        template.extend(std::iter::repeat(GAP).take(insert_len));
        template.extend_from_slice(b"GT");

        let stream = tag_alignment(&query, &template, 0, 0, 0, 0);

        // 2 anchored bases plus deltas 1..=254
        assert_eq!(stream.len(), 2 + 254);
        let last = stream.tags().last().unwrap();
        assert_eq!(last.position, 1);
        assert_eq!(last.delta, 254);

        // nothing after the run was tagged and the anchors are untouched
        assert!(stream.tags().iter().all(|t| t.position <= 1));
        assert_eq!(stream.tags()[0].key(), NodeKey::new(0, 0, Base::A));
        assert_eq!(stream.tags()[1].key(), NodeKey::new(1, 0, Base::C));
        assert_eq!(stream.query_span(), (0, 256));
    }

    #[test]
    fn test_double_gap_skipped() {
        let stream = tag_alignment(b"A-C", b"A-C", 0, 0, 0, 0);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.tags()[1].predecessor, Some(NodeKey::new(0, 0, Base::A)));
    }

    #[test]
    fn test_unrecognized_kept() {
        let stream = tag_alignment(b"ANG", b"ACG", 0, 0, 0, 0);
        assert_eq!(stream.tags()[1].base, Base::Unrecognized(b'N'));
        assert_eq!(stream.tags()[2].predecessor, Some(NodeKey::new(1, 0, Base::Unrecognized(b'N'))));
    }

    #[test]
    fn test_mismatched_lengths() {
        let stream = tag_alignment(b"ACGT", b"AC", 0, 0, 0, 0);
        assert_eq!(stream.len(), 2);
    }
}
