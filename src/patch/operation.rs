//! Section patch operations and their canonical ordering.

use std::cmp::Ordering;

/// One edit of a section. Positions are ordinals within the section: the old ordinal for
/// deletes, the patched ordinal for adds, and both for a replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOperation<T> {
    Delete(u32),
    Add(u32, T),
    Replace(u32, T),
}

impl<T> PatchOperation<T> {
    pub fn position(&self) -> u32 {
        match self {
            PatchOperation::Delete(p) | PatchOperation::Add(p, _) | PatchOperation::Replace(p, _) => *p,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PatchOperation::Delete(_) => 0,
            PatchOperation::Add(..) => 1,
            PatchOperation::Replace(..) => 2,
        }
    }

    pub fn item(&self) -> Option<&T> {
        match self {
            PatchOperation::Delete(_) => None,
            PatchOperation::Add(_, item) | PatchOperation::Replace(_, item) => Some(item),
        }
    }

    pub fn item_mut(&mut self) -> Option<&mut T> {
        match self {
            PatchOperation::Delete(_) => None,
            PatchOperation::Add(_, item) | PatchOperation::Replace(_, item) => Some(item),
        }
    }
}

fn by_position<T>(a: &PatchOperation<T>, b: &PatchOperation<T>) -> Ordering {
    a.position().cmp(&b.position()).then(a.rank().cmp(&b.rank()))
}

/// Sort by (position, delete < add < replace) and fold a delete directly followed by an
/// add at the same position into a replace.
pub fn sort_and_coalesce<T>(mut ops: Vec<PatchOperation<T>>) -> Vec<PatchOperation<T>> {
    ops.sort_by(by_position);

    let mut out: Vec<PatchOperation<T>> = Vec::with_capacity(ops.len());
    for op in ops {
        if let PatchOperation::Add(pos, item) = op {
            if let Some(PatchOperation::Delete(prev)) = out.last() {
                if *prev == pos {
                    out.pop();
                    out.push(PatchOperation::Replace(pos, item));
                    continue;
                }
            }
            out.push(PatchOperation::Add(pos, item));
        } else {
            out.push(op);
        }
    }
    out
}

/// Positions of a sorted operation list split by kind, plus the index of each payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPositions {
    pub deletes: Vec<u32>,
    pub adds: Vec<u32>,
    pub replaces: Vec<u32>,
}

impl OperationPositions {
    pub fn of<T>(ops: &[PatchOperation<T>]) -> OperationPositions {
        let mut positions = OperationPositions::default();
        for op in ops {
            match op {
                PatchOperation::Delete(p) => positions.deletes.push(*p),
                PatchOperation::Add(p, _) => positions.adds.push(*p),
                PatchOperation::Replace(p, _) => positions.replaces.push(*p),
            }
        }
        positions
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.adds.is_empty() && self.replaces.is_empty()
    }
}

/// Payloads of a sorted operation list: adds and replaces merged by ascending position.
pub fn payloads<T: Clone>(ops: &[PatchOperation<T>]) -> Vec<T> {
    let mut with_pos: Vec<(u32, &T)> = ops.iter().filter_map(|op| op.item().map(|i| (op.position(), i))).collect();
    with_pos.sort_by_key(|(p, _)| *p);
    with_pos.into_iter().map(|(_, item)| item.clone()).collect()
}
