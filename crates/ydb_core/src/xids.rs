//! Nested transaction id chains.
//!
//! An [`XidChain`] lists the ids of every transaction on the path from the
//! outermost transaction to the innermost one. The implicit root (no
//! transaction at all) is the empty chain, so a chain of capacity `N` can
//! describe at most `N - 1` levels of nesting.
//!
//! Encoded form, carried in every logged mutation:
//!
//! ```text
//! | count (1) | id[0] (8, LE) | ... | id[count-1] (8, LE) |
//! ```

use crate::error::{YdbError, YdbResult};
use crate::types::TxnId;
use std::sync::Arc;

/// Capacity of a chain, counting the implicit root.
pub const MAX_TRANSACTION_RECORDS: usize = 255;

/// Deepest nesting a chain can describe.
pub const MAX_NESTING_DEPTH: usize = MAX_TRANSACTION_RECORDS - 1;

/// An immutable chain of transaction ids, outermost first.
///
/// Clones share storage; [`push`](Self::push) always builds a new chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XidChain {
    ids: Arc<[TxnId]>,
}

impl XidChain {
    /// Returns the chain of the implicit root transaction.
    #[must_use]
    pub fn root() -> Self {
        Self {
            ids: Arc::from(Vec::new()),
        }
    }

    /// Returns a new chain with `id` appended as the innermost level.
    ///
    /// # Errors
    ///
    /// Returns [`YdbError::CapacityExceeded`] when the chain is already at
    /// [`MAX_NESTING_DEPTH`]. `self` is unchanged either way.
    pub fn push(&self, id: TxnId) -> YdbResult<Self> {
        if self.ids.len() >= MAX_NESTING_DEPTH {
            return Err(YdbError::CapacityExceeded {
                capacity: MAX_TRANSACTION_RECORDS,
            });
        }
        let mut ids = Vec::with_capacity(self.ids.len() + 1);
        ids.extend_from_slice(&self.ids);
        ids.push(id);
        Ok(Self { ids: ids.into() })
    }

    /// Returns the ids, outermost first.
    #[must_use]
    pub fn ids(&self) -> &[TxnId] {
        &self.ids
    }

    /// Returns the nesting depth (0 for the root).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true for the root chain.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.ids.is_empty()
    }

    /// Same as [`is_root`](Self::is_root).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Returns the outermost transaction id.
    #[must_use]
    pub fn outermost(&self) -> Option<TxnId> {
        self.ids.first().copied()
    }

    /// Returns the innermost transaction id.
    #[must_use]
    pub fn innermost(&self) -> Option<TxnId> {
        self.ids.last().copied()
    }

    /// Returns true if `id` is one of the levels of this chain.
    #[must_use]
    pub fn contains(&self, id: TxnId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns the number of bytes [`encode_into`](Self::encode_into) writes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + self.ids.len() * 8
    }

    /// Appends the encoded chain to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        // len <= MAX_NESTING_DEPTH, which fits a byte
        buf.push(self.ids.len() as u8);
        for id in self.ids.iter() {
            buf.extend_from_slice(&id.as_u64().to_le_bytes());
        }
    }

    /// Encodes the chain.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes a chain from the front of `bytes`.
    ///
    /// Returns the chain and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Fails on truncated input or a count above [`MAX_NESTING_DEPTH`].
    pub fn decode(bytes: &[u8]) -> YdbResult<(Self, usize)> {
        let (&count, rest) = bytes
            .split_first()
            .ok_or_else(|| YdbError::log_corruption("empty xid chain"))?;
        let count = usize::from(count);
        if count > MAX_NESTING_DEPTH {
            return Err(YdbError::log_corruption(format!(
                "xid chain depth {count} exceeds {MAX_NESTING_DEPTH}"
            )));
        }
        let needed = count * 8;
        if rest.len() < needed {
            return Err(YdbError::log_corruption("truncated xid chain"));
        }
        let ids: Vec<TxnId> = rest[..needed]
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                TxnId::new(u64::from_le_bytes(raw))
            })
            .collect();
        Ok((Self { ids: ids.into() }, 1 + needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn root_is_empty() {
        let root = XidChain::root();
        assert!(root.is_root());
        assert_eq!(root.len(), 0);
        assert_eq!(root.innermost(), None);
        assert_eq!(root.encode(), vec![0]);
    }

    #[test]
    fn push_appends_innermost() {
        let parent = XidChain::root().push(TxnId::new(3)).unwrap();
        let child = parent.push(TxnId::new(8)).unwrap();
        assert_eq!(parent.ids(), &[TxnId::new(3)]);
        assert_eq!(child.ids(), &[TxnId::new(3), TxnId::new(8)]);
        assert_eq!(child.outermost(), Some(TxnId::new(3)));
        assert_eq!(child.innermost(), Some(TxnId::new(8)));
        assert!(child.contains(TxnId::new(3)));
        assert!(!parent.contains(TxnId::new(8)));
    }

    #[test]
    fn push_past_capacity_fails_and_keeps_chain() {
        let mut chain = XidChain::root();
        for id in 1..=MAX_NESTING_DEPTH as u64 {
            chain = chain.push(TxnId::new(id)).unwrap();
        }
        assert_eq!(chain.len(), MAX_NESTING_DEPTH);
        let before = chain.clone();
        let err = chain.push(TxnId::new(1000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(chain, before);
    }

    #[test]
    fn decode_rejects_truncation() {
        let chain = XidChain::root()
            .push(TxnId::new(1))
            .unwrap()
            .push(TxnId::new(2))
            .unwrap();
        let bytes = chain.encode();
        assert!(XidChain::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(XidChain::decode(&[]).is_err());
        assert!(XidChain::decode(&[255]).is_err());
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let chain = XidChain::root().push(TxnId::new(77)).unwrap();
        let mut bytes = chain.encode();
        bytes.extend_from_slice(b"tail");
        let (decoded, used) = XidChain::decode(&bytes).unwrap();
        assert_eq!(decoded, chain);
        assert_eq!(used, 9);
    }

    proptest! {
        #[test]
        fn pushed_chains_are_ordered_and_bounded(steps in 0usize..300) {
            let mut chain = XidChain::root();
            let mut next = 1u64;
            for _ in 0..steps {
                match chain.push(TxnId::new(next)) {
                    Ok(pushed) => chain = pushed,
                    Err(err) => {
                        prop_assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
                        prop_assert_eq!(chain.len(), MAX_NESTING_DEPTH);
                    }
                }
                next += 1;
            }
            prop_assert!(chain.len() <= MAX_NESTING_DEPTH);
            prop_assert!(chain.ids().windows(2).all(|w| w[0] <= w[1]));
            let (decoded, used) = XidChain::decode(&chain.encode()).unwrap();
            prop_assert_eq!(used, chain.encoded_len());
            prop_assert_eq!(decoded, chain);
        }
    }
}
