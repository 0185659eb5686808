//! The cursor walk that merges surviving old items with inserted ones.
//!
//! Generation runs it to simulate the patched layout and application runs it to produce
//! that layout, so both sides agree on every key and offset.

use crate::dex::error::{DexError, ErrorKind};
use crate::patch::operation::OperationPositions;

/// What happens at one step of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write payload number `payload` at patched ordinal `position`.
    Insert { position: u32, payload: usize },
    /// Old item `old` does not survive.
    Drop { old: u32 },
    /// Old item `old` survives at patched ordinal `position`.
    Keep { old: u32, position: u32 },
}

/// Walk `old_count` old items against `ops`, calling `visit` for every step in output
/// order. Inserts win over old items at the same patched ordinal. Operation lists that
/// leave gaps or are never reached fail with `failure`.
pub fn walk<F>(old_count: u32, ops: &OperationPositions, failure: ErrorKind, mut visit: F) -> Result<(), DexError>
where
    F: FnMut(Step) -> Result<(), DexError>,
{
    let mut counted = 0u32;
    let mut old = 0u32;
    let (mut add_i, mut del_i) = (0usize, 0usize);
    // replaces are consumed twice: once as an insert, once as a dropped old item
    let (mut rep_in, mut rep_out) = (0usize, 0usize);

    while old < old_count || add_i < ops.adds.len() || rep_in < ops.replaces.len() {
        if ops.adds.get(add_i) == Some(&counted) {
            visit(Step::Insert { position: counted, payload: add_i + rep_in })?;
            add_i += 1;
            counted += 1;
        } else if ops.replaces.get(rep_in) == Some(&counted) {
            visit(Step::Insert { position: counted, payload: add_i + rep_in })?;
            rep_in += 1;
            counted += 1;
        } else if old >= old_count {
            return Err(DexError::new(
                failure,
                &format!("Insert position {} leaves a gap after the last item", counted),
            ));
        } else if ops.deletes.get(del_i) == Some(&old) {
            visit(Step::Drop { old })?;
            del_i += 1;
            old += 1;
        } else if ops.replaces.get(rep_out) == Some(&old) {
            visit(Step::Drop { old })?;
            rep_out += 1;
            old += 1;
        } else {
            visit(Step::Keep { old, position: counted })?;
            old += 1;
            counted += 1;
        }
    }

    if del_i != ops.deletes.len() || rep_out != ops.replaces.len() {
        let stray = ops.deletes.get(del_i).or(ops.replaces.get(rep_out)).copied().unwrap_or(old_count);
        return Err(DexError::new(
            failure,
            &format!("Operation at old position {} lies outside the {} old items", stray, old_count),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn steps(old_count: u32, deletes: &[u32], adds: &[u32], replaces: &[u32]) -> Result<Vec<Step>, DexError> {
        let ops = OperationPositions { deletes: deletes.to_vec(), adds: adds.to_vec(), replaces: replaces.to_vec() };
        let mut out = vec![];
        walk(old_count, &ops, ErrorKind::CorruptPatch, |s| {
            out.push(s);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn delete_head_and_append() {
        // a b c -> b c d
        let s = steps(3, &[0], &[2], &[]).unwrap();
        assert_eq!(
            s,
            vec![
                Step::Drop { old: 0 },
                Step::Keep { old: 1, position: 0 },
                Step::Keep { old: 2, position: 1 },
                Step::Insert { position: 2, payload: 0 },
            ]
        );
    }

    #[test]
    fn replace_emits_payload_then_drops_old() {
        let s = steps(2, &[], &[], &[1]).unwrap();
        assert_eq!(
            s,
            vec![
                Step::Keep { old: 0, position: 0 },
                Step::Insert { position: 1, payload: 0 },
                Step::Drop { old: 1 },
            ]
        );

        // a leading add shifts the replace payload to the second slot
        let s = steps(2, &[], &[0], &[1]).unwrap();
        assert_eq!(s[1], Step::Insert { position: 1, payload: 1 });
        assert_eq!(s[2], Step::Keep { old: 0, position: 2 });
    }

    #[test]
    fn empty_old_section_takes_only_adds() {
        let s = steps(0, &[], &[0, 1], &[]).unwrap();
        assert_eq!(s.len(), 2);
        assert!(steps(0, &[], &[0, 2], &[]).is_err());
    }

    #[test]
    fn unreachable_operations_fail() {
        assert_eq!(steps(2, &[5], &[], &[]).unwrap_err().kind(), ErrorKind::CorruptPatch);
        assert!(steps(2, &[1, 0], &[], &[]).is_err());
        assert!(steps(3, &[], &[], &[7]).is_err());
    }
}
