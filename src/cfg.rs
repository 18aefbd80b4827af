//! Control-flow-graph construction, pruning, and linearization (component H).
//!
//! The IR generator emits one flat [`Instr`] stream per function with
//! forward-referenced labels already resolved to [`LabelId`]s. This module
//! recovers block structure from that stream, discards blocks unreachable
//! from the entry, and re-flattens the survivors back into a stream with
//! the same instruction-per-line shape `irgen` produced, just shorter.

use crate::ir::{Instr, LabelId};
use bit_set::BitSet;
use std::collections::HashMap;

/// Split a function body into basic blocks: a new block starts at a `nop`
/// label and after every terminator.
fn split_blocks(body: &[Instr]) -> Vec<Vec<Instr>> {
    let mut blocks = Vec::new();
    let mut current: Vec<Instr> = Vec::new();
    for instr in body {
        if matches!(instr, Instr::Nop { .. }) && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push(instr.clone());
        if instr.is_terminator() {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn label_index(blocks: &[Vec<Instr>]) -> HashMap<LabelId, usize> {
    blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| match b.first() {
            Some(Instr::Nop { label }) => Some((*label, i)),
            _ => None,
        })
        .collect()
}

/// Reachability walk from block zero (the entry), followed by a
/// relinearization that keeps the original block order — which is already
/// the "iterate blocks in id order" rule, since ids here are just each
/// block's position in the original stream.
pub fn prune_and_linearize(body: Vec<Instr>) -> Vec<Instr> {
    let blocks = split_blocks(&body);
    if blocks.is_empty() {
        return body;
    }
    let labels = label_index(&blocks);
    let mut reachable = BitSet::with_capacity(blocks.len());
    let mut stack = vec![0usize];
    reachable.insert(0);
    while let Some(i) = stack.pop() {
        for succ in successors(&blocks[i], i, blocks.len(), &labels) {
            if reachable.insert(succ) {
                stack.push(succ);
            }
        }
    }
    blocks.into_iter().enumerate().filter(|(i, _)| reachable.contains(*i)).flat_map(|(_, b)| b).collect()
}

fn successors(block: &[Instr], index: usize, block_count: usize, labels: &HashMap<LabelId, usize>) -> Vec<usize> {
    let mut out = Vec::new();
    match block.last() {
        Some(Instr::Br { label }) => {
            if let Some(&t) = labels.get(label) {
                out.push(t);
            }
        }
        Some(Instr::BrCond { label, .. }) => {
            if let Some(&t) = labels.get(label) {
                out.push(t);
            }
            if index + 1 < block_count {
                out.push(index + 1);
            }
        }
        Some(Instr::Ret { .. }) => {}
        _ => {
            if index + 1 < block_count {
                out.push(index + 1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IrWidth;
    use crate::ir::{ConstLit, IrType, Operand};

    fn ret(n: i128) -> Instr {
        Instr::Ret { value: Some(Operand::Const(IrType::Int(IrWidth::I32), ConstLit::Int(n))) }
    }

    #[test]
    fn unreachable_block_after_unconditional_jump_is_dropped() {
        let body = vec![
            Instr::Br { label: LabelId(1) },
            Instr::Nop { label: LabelId(0) },
            ret(99), // dead: nothing jumps to l0
            Instr::Nop { label: LabelId(1) },
            ret(0),
        ];
        let linear = prune_and_linearize(body);
        assert!(!linear.contains(&ret(99)));
        assert!(linear.contains(&ret(0)));
    }

    #[test]
    fn infinite_loop_leaves_merge_label_unreachable() {
        // while (1) {} lowers to an unconditional back-edge — no br_cond is
        // emitted for an always-true controlling expression — so the merge
        // block l1 has no incoming edge and pruning drops it.
        let body = vec![
            Instr::Nop { label: LabelId(0) },
            Instr::Br { label: LabelId(0) },
            Instr::Nop { label: LabelId(1) },
            Instr::Ret { value: None },
        ];
        let linear = prune_and_linearize(body);
        assert!(!linear.iter().any(|i| matches!(i, Instr::Nop { label: LabelId(1) })));
    }

    #[test]
    fn entry_block_is_first_in_output() {
        let body = vec![ret(7)];
        let linear = prune_and_linearize(body);
        assert_eq!(linear[0], ret(7));
    }
}
