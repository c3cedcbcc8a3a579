
use crate::alignment_tags::NodeKey;

/// Failures that can stop a consensus computation for a template window.
/// Per-read problems are only fatal if the caller decides so; see [`ConsensusError::is_read_local`].
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum ConsensusError {
    #[error("template length {template_len} exceeds workspace capacity of {max_template_len}")]
    TemplateCapacityExceeded { template_len: usize, max_template_len: usize },
    #[error("node {node} exceeded the limit of {max_links} distinct links")]
    LinkCapacityExceeded { node: NodeKey, max_links: usize },
    #[error("read {read_id} has unrecognized base {symbol:?} at template position {position}")]
    UnrecognizedBase { read_id: usize, position: usize, symbol: char },
    #[error("read {read_id} has a tag at position {position}, outside of template length {template_len}")]
    PositionOutOfRange { read_id: usize, position: usize, template_len: usize },
    #[error("no consensus node received a positive score")]
    DegenerateInput
}

impl ConsensusError {
    /// Returns true for either of the capacity ceilings
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, ConsensusError::TemplateCapacityExceeded { .. } | ConsensusError::LinkCapacityExceeded { .. })
    }

    /// Returns true if the error only concerns a single read, which can be skipped without aborting the window
    pub fn is_read_local(&self) -> bool {
        matches!(self, ConsensusError::UnrecognizedBase { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_tags::Base;

    #[test]
    fn test_error_messages() {
        let err = ConsensusError::UnrecognizedBase { read_id: 3, position: 10, symbol: 'N' };
        assert_eq!(err.to_string(), "read 3 has unrecognized base 'N' at template position 10");
        assert!(err.is_read_local());
        assert!(!err.is_capacity_exceeded());

        let err = ConsensusError::LinkCapacityExceeded {
            node: NodeKey::new(5, 1, Base::G),
            max_links: 2
        };
        assert_eq!(err.to_string(), "node (5, 1, G) exceeded the limit of 2 distinct links");
        assert!(err.is_capacity_exceeded());
        assert!(!err.is_read_local());
    }
}
