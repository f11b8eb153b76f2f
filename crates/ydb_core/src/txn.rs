//! Nested transactions.
//!
//! A [`Transaction`] owns the undo entries of every mutation made under it.
//! Committing a nested transaction hands its entries to the parent, so the
//! parent's abort still reverses them; committing an outermost transaction
//! drops them. Aborting applies them newest first.
//!
//! While a child is unresolved its parent accepts no mutations, so undo
//! entries always sit in the order their changes were made.
//!
//! ```text
//! Active ──commit──▶ Resolving ──▶ Committed
//!    │                   │
//!    │                   └─ logger refused ─▶ Active
//!    └──abort/drop──▶ Resolving ──▶ Aborted
//! ```
//!
//! A resolved transaction lets go of its environment.

use crate::env::Environment;
use crate::error::{YdbError, YdbResult};
use crate::types::TxnId;
use crate::xids::XidChain;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// A reversible step recorded under a transaction.
///
/// Trees push one entry per applied mutation. `undo` runs at most once.
pub trait Rollback: Send {
    /// Reverses the step.
    fn undo(&self) -> YdbResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    /// Claimed by one `commit` or `abort` call.
    Resolving,
    Committed,
    Aborted,
}

pub(crate) struct TxnInner {
    id: TxnId,
    xids: XidChain,
    parent: Option<Arc<TxnInner>>,
    /// Released once the transaction is resolved.
    env: Mutex<Option<Environment>>,
    state: Mutex<TxnState>,
    children: Mutex<Vec<Weak<TxnInner>>>,
    undo: Mutex<Vec<Box<dyn Rollback>>>,
}

impl TxnInner {
    fn unusable(&self, state: TxnState) -> YdbError {
        let what = match state {
            TxnState::Active => "active",
            TxnState::Resolving => "being resolved",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
        };
        YdbError::invalid_argument(format!("{} is {what}", self.id))
    }

    fn ensure_active(&self) -> YdbResult<()> {
        match *self.state.lock() {
            TxnState::Active => Ok(()),
            state => Err(self.unusable(state)),
        }
    }

    /// Moves an active transaction to `Resolving`. Exactly one caller wins.
    fn try_claim(&self) -> bool {
        let mut state = self.state.lock();
        if *state == TxnState::Active {
            *state = TxnState::Resolving;
            true
        } else {
            false
        }
    }

    fn claim(&self) -> YdbResult<()> {
        let mut state = self.state.lock();
        match *state {
            TxnState::Active => {
                *state = TxnState::Resolving;
                Ok(())
            }
            other => Err(self.unusable(other)),
        }
    }

    fn env(&self) -> YdbResult<Environment> {
        self.env
            .lock()
            .clone()
            .ok_or_else(|| YdbError::invalid_state(format!("{} is resolved", self.id)))
    }

    fn belongs_to(&self, env: &Environment) -> bool {
        self.env.lock().as_ref().is_some_and(|own| own.same_as(env))
    }

    fn live_children(&self) -> Vec<Arc<TxnInner>> {
        let mut children = self.children.lock();
        children.retain(|child| child.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    fn has_active_child(&self) -> bool {
        self.live_children()
            .iter()
            .any(|child| matches!(*child.state.lock(), TxnState::Active | TxnState::Resolving))
    }

    /// Ends in `state` and lets go of the environment.
    fn finish(&self, state: TxnState) {
        *self.state.lock() = state;
        let env = self.env.lock().take();
        drop(env);
    }

    fn commit(&self) -> YdbResult<()> {
        self.claim()?;
        match self.commit_claimed() {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.lock() = TxnState::Active;
                Err(e)
            }
        }
    }

    fn commit_claimed(&self) -> YdbResult<()> {
        let env = self.env()?;
        for child in self.live_children() {
            if child.try_claim() {
                if let Err(e) = child.commit_claimed() {
                    *child.state.lock() = TxnState::Active;
                    return Err(e);
                }
            }
        }

        if let Some(logger) = env.logger() {
            logger.commit(self.id)?;
        }

        let undo = std::mem::take(&mut *self.undo.lock());
        if let Some(parent) = &self.parent {
            parent.undo.lock().extend(undo);
        }
        env.counters().record_commit();
        debug!(txid = self.id.as_u64(), depth = self.xids.len(), "transaction committed");
        self.finish(TxnState::Committed);
        Ok(())
    }

    fn abort(&self) -> YdbResult<()> {
        self.claim()?;
        self.abort_claimed()
    }

    /// Always ends `Aborted`; a failed undo poisons the environment instead.
    fn abort_claimed(&self) -> YdbResult<()> {
        let env = self.env()?;
        let result = self.rollback(&env);
        self.finish(TxnState::Aborted);
        result
    }

    fn rollback(&self, env: &Environment) -> YdbResult<()> {
        for child in self.live_children() {
            if child.try_claim() {
                child.abort_claimed()?;
            }
        }

        if let Some(logger) = env.logger() {
            if let Err(e) = logger.abort(self.id) {
                warn!(txid = self.id.as_u64(), error = %e, "failed to log abort");
            }
        }

        env.counters().record_abort();
        let undo = std::mem::take(&mut *self.undo.lock());
        for entry in undo.iter().rev() {
            if let Err(e) = entry.undo() {
                error!(txid = self.id.as_u64(), error = %e, "rollback failed");
                env.poison();
                return Err(YdbError::RollbackFailed {
                    txid: self.id.as_u64(),
                    message: e.to_string(),
                });
            }
        }
        debug!(txid = self.id.as_u64(), undone = undo.len(), "transaction aborted");
        Ok(())
    }
}

/// A handle on one level of a nested transaction.
///
/// Dropping an unresolved transaction aborts it.
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl Transaction {
    pub(crate) fn begin(env: &Environment, parent: Option<&Transaction>) -> YdbResult<Self> {
        let parent_inner = match parent {
            Some(parent) => {
                parent.inner.ensure_active()?;
                if !parent.inner.belongs_to(env) {
                    return Err(YdbError::invalid_argument(
                        "parent transaction belongs to another environment",
                    ));
                }
                Some(Arc::clone(&parent.inner))
            }
            None => None,
        };

        let id = env.allocate_txnid();
        let xids = match &parent_inner {
            Some(parent) => parent.xids.push(id)?,
            None => XidChain::root().push(id)?,
        };
        let parent_id = parent_inner.as_ref().map(|p| p.id);

        if let Some(logger) = env.logger() {
            logger.begin(id, parent_id)?;
        }

        let inner = Arc::new(TxnInner {
            id,
            xids,
            parent: parent_inner,
            env: Mutex::new(Some(env.clone())),
            state: Mutex::new(TxnState::Active),
            children: Mutex::new(Vec::new()),
            undo: Mutex::new(Vec::new()),
        });
        if let Some(parent) = &inner.parent {
            parent.children.lock().push(Arc::downgrade(&inner));
        }
        env.counters().record_begin();
        debug!(
            txid = id.as_u64(),
            parent = parent_id.map(TxnId::as_u64),
            "transaction begun"
        );
        Ok(Self { inner })
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.inner.id
    }

    /// Returns the parent's id for a nested transaction.
    #[must_use]
    pub fn parent_id(&self) -> Option<TxnId> {
        self.inner.parent.as_ref().map(|p| p.id)
    }

    /// Ids from the outermost transaction down to this one.
    #[must_use]
    pub fn xids(&self) -> &XidChain {
        &self.inner.xids
    }

    /// Returns true until the transaction commits or aborts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.inner.state.lock() == TxnState::Active
    }

    /// Returns the environment the transaction runs in, until it is
    /// resolved.
    #[must_use]
    pub fn env(&self) -> Option<Environment> {
        self.inner.env.lock().clone()
    }

    pub(crate) fn belongs_to(&self, env: &Environment) -> bool {
        self.inner.belongs_to(env)
    }

    /// Records a step to reverse if this transaction (or an ancestor it
    /// commits into) aborts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the transaction is resolved or has an
    /// unresolved child.
    pub fn add_rollback(&self, entry: Box<dyn Rollback>) -> YdbResult<()> {
        self.ensure_writable()?;
        self.inner.undo.lock().push(entry);
        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> YdbResult<()> {
        self.inner.ensure_active()
    }

    /// Checks that a mutation may be made under this transaction.
    ///
    /// A transaction with an unresolved child is read-only until the child
    /// commits or aborts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the transaction is resolved or has an
    /// unresolved child.
    pub fn ensure_writable(&self) -> YdbResult<()> {
        self.inner.ensure_active()?;
        if self.inner.has_active_child() {
            return Err(YdbError::invalid_argument(format!(
                "{} has an unresolved child transaction",
                self.inner.id
            )));
        }
        Ok(())
    }

    /// Commits live descendants, then this transaction.
    ///
    /// The logger decides: if it fails to record the commit, the transaction
    /// stays active and its error is returned.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the transaction is already resolved.
    pub fn commit(&self) -> YdbResult<()> {
        if let Some(env) = self.env() {
            env.check_health()?;
        }
        self.inner.commit()
    }

    /// Aborts live descendants, then reverses every change made under this
    /// transaction.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the transaction is already resolved, or
    /// `RollbackFailed` if a change could not be reversed. The environment
    /// is unusable after the latter.
    pub fn abort(&self) -> YdbResult<()> {
        self.inner.abort()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.inner.try_claim() {
            warn!(txid = self.inner.id.as_u64(), "aborting unresolved transaction on drop");
            if let Err(e) = self.inner.abort_claimed() {
                error!(txid = self.inner.id.as_u64(), error = %e, "abort on drop failed");
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("xids", &self.inner.xids)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
