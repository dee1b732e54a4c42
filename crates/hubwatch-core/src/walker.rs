//! Recursive record traversal.
//!
//! The walker builds a decoded shadow copy of a record while threading the
//! watch-list through the traversal as an explicit accumulator: every call
//! takes the current list by value and hands back what is left of it.

use crate::decoder;
use crate::error::DecodeError;
use crate::value::{Fields, RecordValue};
use crate::watchlist::WatchList;
use tracing::trace;

/// Default limit on record nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Output of walking one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Walked {
    /// The decoded shadow copy of the record.
    pub result: RecordValue,
    /// Watch-list entries nothing in the record consumed.
    pub remaining: WatchList,
}

/// Decodes records field by field, recursing into nested structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walker {
    max_depth: usize,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Walker {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Decode `record` and consume the matching entries of `watch`.
    ///
    /// A record that is not a mapping or sequence is returned unchanged.
    ///
    /// # Errors
    /// [`DecodeError::DepthExceeded`] if the record nests deeper than the
    /// configured limit.
    pub fn walk(&self, record: &RecordValue, watch: WatchList) -> Result<Walked, DecodeError> {
        let (result, remaining) = self.walk_node(record, watch, 1)?;
        Ok(Walked { result, remaining })
    }

    fn walk_node(
        &self,
        node: &RecordValue,
        mut watch: WatchList,
        depth: usize,
    ) -> Result<(RecordValue, WatchList), DecodeError> {
        if depth > self.max_depth {
            return Err(DecodeError::DepthExceeded {
                depth,
                limit: self.max_depth,
            });
        }

        match node {
            RecordValue::Mapping(fields) => {
                let mut out = Fields::with_capacity(fields.len());
                for (name, value) in fields {
                    let (decoded, rest) = self.walk_field(name, value, watch, depth)?;
                    watch = rest;
                    out.insert(name.clone(), decoded);
                }
                Ok((RecordValue::Mapping(out), watch))
            }
            // Sequence elements are keyed by their index.
            RecordValue::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, value) in items.iter().enumerate() {
                    let (decoded, rest) =
                        self.walk_field(&idx.to_string(), value, watch, depth)?;
                    watch = rest;
                    out.push(decoded);
                }
                Ok((RecordValue::Sequence(out), watch))
            }
            other => Ok((other.clone(), watch)),
        }
    }

    fn walk_field(
        &self,
        name: &str,
        value: &RecordValue,
        watch: WatchList,
        depth: usize,
    ) -> Result<(RecordValue, WatchList), DecodeError> {
        if let Some(leaf) = decoder::decode(value) {
            trace!("decoded field '{name}' as {}", leaf.tag);
            let watch = watch.reduce(name, &leaf.value);
            return Ok((leaf.value, watch));
        }

        match value.child_count() {
            Some(n) if n > 0 => self.walk_node(value, watch, depth + 1),
            _ => Ok((value.clone(), watch)),
        }
    }
}

/// Walk `record` with the default depth limit.
pub fn walk(record: &RecordValue, watch: WatchList) -> Result<Walked, DecodeError> {
    Walker::default().walk(record, watch)
}
