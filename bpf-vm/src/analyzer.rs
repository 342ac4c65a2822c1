//! Static control-flow analysis for tooling.
//!
//! Nothing here runs during execution; callers opt in when they want
//! dead-code reports or a successor graph.

use crate::program::Program;

use bpf_asm::{Instruction, OperandFormat};
use itertools::Itertools;

use std::collections::VecDeque;

/// A jump that transfers control but changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundantJump {
    /// `ja +0`: falls through to the next instruction anyway.
    JumpToNext,
    /// Conditional whose true and false targets coincide.
    SameTargets,
}

/// Control-flow facts about one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    successors: Vec<Vec<usize>>,
    reachable: Vec<bool>,
    redundant: Vec<(usize, RedundantJump)>,
}

impl Analysis {
    /// Successor indices of instruction `index`.
    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    /// Whether instruction `index` can execute at all.
    pub fn is_reachable(&self, index: usize) -> bool {
        self.reachable[index]
    }

    /// Indices no path from instruction 0 reaches, in order.
    pub fn unreachable(&self) -> Vec<usize> {
        self.reachable
            .iter()
            .enumerate()
            .filter(|(_, reachable)| !**reachable)
            .map(|(index, _)| index)
            .sorted()
            .collect()
    }

    /// Jumps that transfer control without effect.
    pub fn redundant_jumps(&self) -> &[(usize, RedundantJump)] {
        &self.redundant
    }
}

/// Builds the successor graph and runs reachability from instruction 0.
pub fn analyze(program: &Program) -> Analysis {
    let instructions = program.instructions();
    let len = instructions.len();

    let successors: Vec<Vec<usize>> = instructions
        .iter()
        .enumerate()
        .map(|(index, insn)| instruction_successors(index, insn, len))
        .collect();

    let mut reachable = vec![false; len];
    let mut queue = VecDeque::new();
    if len > 0 {
        reachable[0] = true;
        queue.push_back(0);
    }
    while let Some(index) = queue.pop_front() {
        for &next in &successors[index] {
            if !reachable[next] {
                reachable[next] = true;
                queue.push_back(next);
            }
        }
    }

    let redundant = instructions
        .iter()
        .enumerate()
        .filter_map(|(index, insn)| redundancy(insn).map(|kind| (index, kind)))
        .collect();

    Analysis {
        successors,
        reachable,
        redundant,
    }
}

fn instruction_successors(index: usize, insn: &Instruction, len: usize) -> Vec<usize> {
    let in_range = |target: i64| -> Option<usize> {
        (0..len as i64).contains(&target).then_some(target as usize)
    };

    match insn.operand_format() {
        Some(OperandFormat::JumpCond) => {
            let jt = in_range(index as i64 + 1 + insn.jt() as i64);
            let jf = in_range(index as i64 + 1 + insn.jf() as i64);
            jt.into_iter().chain(jf).unique().collect()
        }
        Some(OperandFormat::JumpUncond) => in_range(index as i64 + 1 + insn.offset() as i64)
            .into_iter()
            .collect(),
        // Returns end execution.
        _ if matches!(insn.op(), 0x06 | 0x16) => Vec::new(),
        // Everything else falls through.
        _ => in_range(index as i64 + 1).into_iter().collect(),
    }
}

fn redundancy(insn: &Instruction) -> Option<RedundantJump> {
    match insn.operand_format() {
        Some(OperandFormat::JumpUncond) if insn.offset() == 0 => {
            Some(RedundantJump::JumpToNext)
        }
        Some(OperandFormat::JumpCond) if insn.jt() == insn.jf() => {
            Some(RedundantJump::SameTargets)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpf_asm::op;

    #[test]
    fn straight_line_programs_are_fully_reachable() {
        let program = Program::from_instructions([op::ldh(12), op::ret_a()]);
        let analysis = analyze(&program);
        assert!(analysis.unreachable().is_empty());
        assert_eq!(analysis.successors(0), &[1]);
        assert!(analysis.successors(1).is_empty());
    }

    #[test]
    fn code_behind_a_return_is_dead() {
        let program = Program::from_instructions([
            op::ret_k(0),
            op::ldh(12),
            op::ret_a(),
        ]);
        let analysis = analyze(&program);
        assert_eq!(analysis.unreachable(), vec![1, 2]);
    }

    #[test]
    fn branches_fan_out_to_both_targets() {
        let program = Program::from_instructions([
            op::jeq_k(1, 0, 1),
            op::ret_k(1),
            op::ret_k(0),
        ]);
        let analysis = analyze(&program);
        assert_eq!(analysis.successors(0), &[1, 2]);
        assert!(analysis.unreachable().is_empty());
    }

    #[test]
    fn pointless_jumps_are_flagged() {
        let program = Program::from_instructions([
            op::ja(0),
            op::jeq_k(1, 2, 2),
            op::ret_k(1),
            op::ret_k(1),
            op::ret_k(0),
        ]);
        let analysis = analyze(&program);
        assert_eq!(
            analysis.redundant_jumps(),
            &[
                (0, RedundantJump::JumpToNext),
                (1, RedundantJump::SameTargets)
            ]
        );
    }
}
