//! Cursor over a [`CachedTree`].
//!
//! A cursor remembers the pair it stands on rather than an index, so other
//! handles may change the file between calls. When the remembered pair is
//! gone, the cursor sits in the gap it left behind: `Next` returns the pair
//! that followed it and `Current` reports nothing there.

use super::cached::{subdb_mut, xids_of, CachedTree};
use super::subdb::{Cmp, SubDb, UndoOp};
use super::TreeCursor;
use crate::error::{YdbError, YdbResult};
use crate::flags::CursorOp;
use crate::log::LogRecord;
use crate::txn::Transaction;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
struct Position {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Index among the key's duplicates.
    ordinal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Located {
    Exact(usize),
    Gap(usize),
}

fn locate(subdb: &SubDb, pos: &Position, cmp: Cmp<'_>) -> Located {
    let run = subdb.key_run(&pos.key, cmp);
    let hint = run.start + pos.ordinal;
    if hint < run.end && subdb.entries[hint].1 == pos.value {
        return Located::Exact(hint);
    }
    if let Some(offset) = subdb.entries[run.clone()]
        .iter()
        .position(|(_, v)| *v == pos.value)
    {
        return Located::Exact(run.start + offset);
    }
    Located::Gap(run.start + pos.ordinal.min(run.len()))
}

fn unpositioned() -> YdbError {
    YdbError::invalid_argument("cursor is not positioned")
}

pub(super) struct CachedCursor<'a> {
    tree: &'a CachedTree,
    pos: Option<Position>,
}

impl<'a> CachedCursor<'a> {
    pub(super) fn new(tree: &'a CachedTree) -> Self {
        Self { tree, pos: None }
    }

    fn target(
        &self,
        subdb: &SubDb,
        key: Option<&[u8]>,
        op: CursorOp,
        cmp: Cmp<'_>,
    ) -> YdbResult<Option<usize>> {
        let n = subdb.entries.len();
        let located = self.pos.as_ref().map(|pos| locate(subdb, pos, cmp));
        let index = match op {
            CursorOp::First => (n > 0).then_some(0),
            CursorOp::Last => n.checked_sub(1),
            CursorOp::Next => match located {
                None => (n > 0).then_some(0),
                Some(Located::Exact(i)) => Some(i + 1).filter(|next| *next < n),
                Some(Located::Gap(i)) => Some(i).filter(|next| *next < n),
            },
            CursorOp::Prev => match located {
                None => n.checked_sub(1),
                Some(Located::Exact(i) | Located::Gap(i)) => i.checked_sub(1),
            },
            CursorOp::Current => match located.ok_or_else(unpositioned)? {
                Located::Exact(i) => Some(i),
                Located::Gap(_) => None,
            },
            CursorOp::Set => {
                let key = key.ok_or_else(|| YdbError::invalid_argument("Set needs a key"))?;
                let run = subdb.key_run(key, cmp);
                (!run.is_empty()).then_some(run.start)
            }
            CursorOp::SetRange => {
                let key =
                    key.ok_or_else(|| YdbError::invalid_argument("SetRange needs a key"))?;
                let index = subdb.lower_bound(key, cmp);
                (index < n).then_some(index)
            }
            CursorOp::NextDup => {
                let (Some(located), Some(pos)) = (located, self.pos.as_ref()) else {
                    return Err(unpositioned());
                };
                let next = match located {
                    Located::Exact(i) => i + 1,
                    Located::Gap(i) => i,
                };
                (next < n && cmp(&subdb.entries[next].0, &pos.key) == Ordering::Equal)
                    .then_some(next)
            }
            CursorOp::NextNoDup => {
                let pos = self.pos.as_ref().ok_or_else(unpositioned)?;
                let run = subdb.key_run(&pos.key, cmp);
                (run.end < n).then_some(run.end)
            }
        };
        Ok(index)
    }
}

impl TreeCursor for CachedCursor<'_> {
    fn get(
        &mut self,
        key: Option<&[u8]>,
        op: CursorOp,
        txn: Option<&Transaction>,
    ) -> YdbResult<(Vec<u8>, Vec<u8>)> {
        let tree = self.tree;
        let bound = tree.bound()?;
        if let Some(txn) = txn {
            txn.ensure_active()?;
        }
        let cmp = &**tree.cmp();
        let mut state = bound.file.state.lock();
        let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;

        let index = self
            .target(subdb, key, op, cmp)?
            .ok_or_else(|| YdbError::not_found("no pair at cursor position"))?;
        let (found_key, found_value) = subdb.entries[index].clone();
        let ordinal = index - subdb.lower_bound(&found_key, cmp);
        self.pos = Some(Position {
            key: found_key.clone(),
            value: found_value.clone(),
            ordinal,
        });
        Ok((found_key, found_value))
    }

    fn delete(&mut self, txn: Option<&Transaction>) -> YdbResult<()> {
        let tree = self.tree;
        let bound = tree.bound()?;
        if let Some(txn) = txn {
            txn.ensure_writable()?;
        }
        let pos = self.pos.as_ref().ok_or_else(unpositioned)?;
        let cmp = &**tree.cmp();

        let undo = {
            let mut state = bound.file.state.lock();
            let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
            let Located::Exact(index) = locate(subdb, pos, cmp) else {
                return Err(YdbError::not_found("pair under cursor was deleted"));
            };
            bound.log(
                subdb,
                &LogRecord::Delete {
                    xids: xids_of(txn),
                    file: bound.file_name.clone(),
                    subdb: bound.subdb.clone(),
                    key: pos.key.clone(),
                    value: Some(pos.value.clone()),
                },
            )?;
            let ((key, value), ordinal) = subdb.remove_at(index, cmp);
            state.dirty = true;
            UndoOp::Reinsert {
                key,
                value,
                ordinal,
            }
        };
        tree.push_undo(bound, txn, Some(undo))
    }

    fn close(&mut self) {
        self.pos = None;
    }
}
