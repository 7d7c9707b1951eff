//! Rebasing stored local operations over remote edits.
//!
//! For each field the engine holds two chains of local operations. The past
//! chain (closed batches on the undo stack, oldest first, then the open
//! batch) leads up to the field's current text, every operation expressed
//! against the text just before it. The future chain (the redo stack, next
//! redo first) starts from the current text. A remote edit arrives expressed
//! against the current text, so it is swapped backwards through the past
//! chain and carried forwards through the future chain, rewriting every
//! stored operation it crosses.
//!
//! Stored operations are rebased as primitive inserts and deletes. A remote
//! insert landing inside a local span splits that span, so undo or redo
//! never removes the collaborator's text. A remote delete that removes part
//! of a local span trims it, so the local operation only touches what is
//! still there. Replacements that survive whole are merged back.

use reportdesk_types::Operation;
use tracing::debug;

use crate::batcher::OperationBatcher;
use crate::text::{char_len, char_slice};
use crate::undo::UndoRedoStack;

/// Counts of stored operations touched by one remote edit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformReport {
    /// Moved without changing their text
    pub shifted: usize,
    /// Split, trimmed or dropped
    pub clamped: usize,
}

impl TransformReport {
    fn record(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Untouched => {}
            Adjustment::Shifted => self.shifted += 1,
            Adjustment::Clamped => self.clamped += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shifted == 0 && self.clamped == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjustment {
    Untouched,
    Shifted,
    Clamped,
}

/// One half of a remote edit. Only extents matter when rebasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Insert { at: usize, len: usize },
    Delete { at: usize, len: usize },
}

fn pieces(remote: &Operation) -> Vec<Piece> {
    let mut out = Vec::with_capacity(2);
    if remote.deleted_length > 0 {
        out.push(Piece::Delete {
            at: remote.position,
            len: remote.deleted_length,
        });
    }
    let inserted = remote.inserted_length();
    if inserted > 0 {
        out.push(Piece::Insert {
            at: remote.position,
            len: inserted,
        });
    }
    out
}

fn moved(op: &Operation, position: usize) -> Operation {
    Operation {
        position,
        ..op.clone()
    }
}

fn insert_like(op: &Operation, position: usize, text: String) -> Operation {
    Operation {
        position,
        deleted_length: 0,
        deleted_text: String::new(),
        inserted_text: text,
        ..op.clone()
    }
}

/// `text` with chars `from..to` removed.
fn without(text: &str, from: usize, to: usize) -> String {
    let mut out = char_slice(text, 0, from).to_string();
    out.push_str(char_slice(text, to, char_len(text)));
    out
}

/// Split a replacement into its delete and insert halves; drop no-ops.
fn primitives(op: Operation) -> Vec<Operation> {
    if op.is_noop() {
        return Vec::new();
    }
    if op.deleted_length == 0 || op.inserted_text.is_empty() {
        return vec![op];
    }
    let insert = insert_like(&op, op.position, op.inserted_text.clone());
    let delete = Operation {
        inserted_text: String::new(),
        ..op
    };
    vec![delete, insert]
}

/// Rejoin a delete directly followed by an insert from the same edit.
fn merge(ops: Vec<Operation>) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops {
        if let Some(last) = out.last_mut() {
            if last.inserted_text.is_empty()
                && op.deleted_length == 0
                && last.position == op.position
                && last.origin_version == op.origin_version
            {
                last.inserted_text = op.inserted_text;
                continue;
            }
        }
        out.push(op);
    }
    out
}

fn classify(original: &Operation, rewritten: &[Operation]) -> Adjustment {
    match rewritten {
        [only] if only == original => Adjustment::Untouched,
        [only]
            if only.inserted_text == original.inserted_text
                && only.deleted_text == original.deleted_text =>
        {
            Adjustment::Shifted
        }
        _ => Adjustment::Clamped,
    }
}

/// Exchange the primitive `op` with a remote `piece` applied right after it.
///
/// Returns the piece(s) as they apply before `op`, in order, and `op`
/// rewritten to apply after them.
fn swap(op: &Operation, piece: Piece) -> (Vec<Piece>, Vec<Operation>, Adjustment) {
    let (earlier, rewritten) = if op.deleted_length == 0 {
        swap_insert(op, piece)
    } else {
        swap_delete(op, piece)
    };
    let adjustment = classify(op, &rewritten);
    (earlier, rewritten, adjustment)
}

fn swap_insert(op: &Operation, piece: Piece) -> (Vec<Piece>, Vec<Operation>) {
    let p = op.position;
    let n = op.inserted_length();

    match piece {
        Piece::Insert { at, len } if at <= p => (vec![piece], vec![moved(op, p + len)]),
        Piece::Insert { at, len } if at >= p + n => {
            (vec![Piece::Insert { at: at - n, len }], vec![op.clone()])
        }
        Piece::Insert { at, len } => {
            // lands inside the local span: split around it
            let k = at - p;
            let head = insert_like(op, p, char_slice(&op.inserted_text, 0, k).to_string());
            let tail = insert_like(op, p + k + len, char_slice(&op.inserted_text, k, n).to_string());
            (vec![Piece::Insert { at: p, len }], vec![head, tail])
        }
        Piece::Delete { at, len } if at + len <= p => (vec![piece], vec![moved(op, p - len)]),
        Piece::Delete { at, len } if at >= p + n => {
            (vec![Piece::Delete { at: at - n, len }], vec![op.clone()])
        }
        Piece::Delete { at, len } => {
            let end = at + len;
            let outside = p.saturating_sub(at) + end.saturating_sub(p + n);
            let start = at.min(p);
            let kept = without(&op.inserted_text, at.max(p) - p, end.min(p + n) - p);

            let earlier = if outside > 0 {
                vec![Piece::Delete { at: start, len: outside }]
            } else {
                Vec::new()
            };
            let rewritten = if kept.is_empty() {
                Vec::new()
            } else {
                vec![insert_like(op, start, kept)]
            };
            (earlier, rewritten)
        }
    }
}

fn swap_delete(op: &Operation, piece: Piece) -> (Vec<Piece>, Vec<Operation>) {
    let p = op.position;
    let n = op.deleted_length;

    match piece {
        Piece::Insert { at, len } if at <= p => (vec![piece], vec![moved(op, p + len)]),
        Piece::Insert { at, len } => (vec![Piece::Insert { at: at + n, len }], vec![op.clone()]),
        Piece::Delete { at, len } if at + len <= p => (vec![piece], vec![moved(op, p - len)]),
        Piece::Delete { at, len } if at >= p => {
            (vec![Piece::Delete { at: at + n, len }], vec![op.clone()])
        }
        Piece::Delete { at, len } => {
            // the remote range spans the point where our text was removed
            let earlier = vec![
                Piece::Delete { at, len: p - at },
                Piece::Delete {
                    at: at + n,
                    len: at + len - p,
                },
            ];
            (earlier, vec![moved(op, at)])
        }
    }
}

type Chain = Vec<(usize, Operation)>;

/// Carry `piece`, which applies after `chain[..end]`, back to the start of
/// the chain. Returns the new length of that prefix.
fn rebase_back(chain: &mut Chain, end: usize, piece: Piece, report: &mut TransformReport) -> usize {
    let mut end = end;
    let mut piece = piece;
    let mut above = 0;

    while end > 0 {
        let (group, op) = chain[end - 1].clone();
        let (earlier, rewritten, adjustment) = swap(&op, piece);
        report.record(adjustment);
        above += rewritten.len();
        chain.splice(end - 1..end, rewritten.into_iter().map(|op| (group, op)));
        end -= 1;

        match earlier.len() {
            0 => break,
            1 => piece = earlier[0],
            _ => {
                for piece in earlier {
                    end = rebase_back(chain, end, piece, report);
                }
                break;
            }
        }
    }
    end + above
}

/// Carry `piece`, which applies before `chain[start..]`, to the end of the
/// chain.
fn rebase_forward(chain: &mut Chain, start: usize, piece: Piece, report: &mut TransformReport) {
    let mut start = start;
    let mut piece = piece;

    while start < chain.len() {
        let (group, op) = chain[start].clone();
        // a future op is the inverse of a past one that would undo it
        let (later, rewritten, adjustment) = swap(&op.inverse(), piece);
        report.record(adjustment);
        let rewritten: Vec<_> = rewritten
            .into_iter()
            .rev()
            .map(|op| (group, op.inverse()))
            .collect();
        let count = rewritten.len();
        chain.splice(start..start + 1, rewritten);
        start += count;

        match later.len() {
            0 => return,
            1 => piece = later[0],
            _ => {
                for piece in later {
                    rebase_forward(chain, start, piece, report);
                }
                return;
            }
        }
    }
}

fn flatten(groups: &[&mut Vec<Operation>]) -> Chain {
    groups
        .iter()
        .enumerate()
        .flat_map(|(group, ops)| {
            ops.iter()
                .cloned()
                .flat_map(primitives)
                .map(move |op| (group, op))
        })
        .collect()
}

fn scatter(groups: &mut [&mut Vec<Operation>], chain: Chain) {
    for ops in groups.iter_mut() {
        ops.clear();
    }
    for (group, op) in chain {
        groups[group].push(op);
    }
    for ops in groups.iter_mut() {
        let merged = merge(std::mem::take(&mut **ops));
        **ops = merged;
    }
}

fn rebase_past_groups(groups: &mut [&mut Vec<Operation>], remote: &Operation) -> TransformReport {
    let mut report = TransformReport::default();
    if groups.is_empty() {
        return report;
    }
    let mut chain = flatten(groups);
    for piece in pieces(remote) {
        let end = chain.len();
        rebase_back(&mut chain, end, piece, &mut report);
    }
    scatter(groups, chain);
    report
}

fn rebase_future_groups(groups: &mut [&mut Vec<Operation>], remote: &Operation) -> TransformReport {
    let mut report = TransformReport::default();
    if groups.is_empty() {
        return report;
    }
    let mut chain = flatten(groups);
    for piece in pieces(remote) {
        rebase_forward(&mut chain, 0, piece, &mut report);
    }
    scatter(groups, chain);
    report
}

/// Rebase `ops`, which lead up to the current text (oldest first), over
/// `remote`, which was applied to the current text.
pub fn rebase_past(ops: &mut Vec<Operation>, remote: &Operation) -> TransformReport {
    rebase_past_groups(&mut [ops], remote)
}

/// Rebase `ops`, still to be applied to the current text in order, over
/// `remote`, which was applied to the current text.
pub fn rebase_future(ops: &mut Vec<Operation>, remote: &Operation) -> TransformReport {
    rebase_future_groups(&mut [ops], remote)
}

/// Rebase every stored operation for `remote.field` over `remote`.
///
/// `remote` must already be clamped to the field's current text. Successive
/// remote edits compose: each one rebases chains already rewritten by the
/// ones before it.
pub fn track_remote_operation(
    remote: &Operation,
    batcher: &mut OperationBatcher,
    stack: &mut UndoRedoStack,
) -> TransformReport {
    let field = remote.field.as_str();
    let (mut past, mut future) = stack.chains_mut(field);
    past.extend(batcher.pending_operations_mut(field));

    let mut report = rebase_past_groups(&mut past, remote);
    let redo = rebase_future_groups(&mut future, remote);
    report.shifted += redo.shifted;
    report.clamped += redo.clamped;

    if !report.is_empty() {
        debug!(
            %field,
            shifted = report.shifted,
            clamped = report.clamped,
            "rebased stored operations over remote edit"
        );
    }
    report
}
