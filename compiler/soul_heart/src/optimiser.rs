//! Block-level clean-ups.
//!
//! The front-end only needs reachability: lowering can leave orphan
//! blocks behind `break`/`continue`, and the termination check must not
//! fail a function because an unreachable block lacks a return value.

use crate::ir::{BlockId, Function, Statement, Terminator};

/// Remove blocks unreachable from the entry block, remapping branch
/// targets.
pub fn remove_unreachable_blocks(function: &mut Function) {
    if function.blocks.is_empty() {
        return;
    }

    let mut reachable = vec![false; function.blocks.len()];
    let mut worklist = vec![0usize];
    while let Some(index) = worklist.pop() {
        if reachable[index] {
            continue;
        }
        reachable[index] = true;
        match &function.blocks[index].terminator {
            Some(Terminator::Branch(t)) => worklist.push(t.0 as usize),
            Some(Terminator::BranchIf {
                true_target,
                false_target,
                ..
            }) => {
                worklist.push(true_target.0 as usize);
                worklist.push(false_target.0 as usize);
            }
            Some(Terminator::Return(_)) | None => {}
        }
    }

    if reachable.iter().all(|&r| r) {
        return;
    }

    // Compact the block list and remap ids.
    let mut remap = vec![u32::MAX; function.blocks.len()];
    let mut kept = Vec::with_capacity(function.blocks.len());
    for (i, block) in std::mem::take(&mut function.blocks).into_iter().enumerate() {
        if reachable[i] {
            remap[i] = kept.len() as u32;
            kept.push(block);
        }
    }

    for block in &mut kept {
        if let Some(terminator) = &mut block.terminator {
            match terminator {
                Terminator::Branch(t) => t.0 = remap[t.0 as usize],
                Terminator::BranchIf {
                    true_target,
                    false_target,
                    ..
                } => {
                    true_target.0 = remap[true_target.0 as usize];
                    false_target.0 = remap[false_target.0 as usize];
                }
                Terminator::Return(_) => {}
            }
        }
    }

    function.blocks = kept;
}

/// Count statements of each kind, for tests and debug dumps.
pub fn count_statements(function: &Function, mut predicate: impl FnMut(&Statement) -> bool) -> usize {
    function
        .blocks
        .iter()
        .flat_map(|b| b.statements.iter())
        .filter(|s| predicate(s))
        .count()
}

/// True when any block branches backwards (a loop edge).
pub fn has_back_edge(function: &Function) -> bool {
    function.blocks.iter().enumerate().any(|(i, block)| {
        let targets: Vec<BlockId> = match &block.terminator {
            Some(Terminator::Branch(t)) => vec![*t],
            Some(Terminator::BranchIf {
                true_target,
                false_target,
                ..
            }) => vec![*true_target, *false_target],
            _ => Vec::new(),
        };
        targets.iter().any(|t| (t.0 as usize) <= i)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Block;
    use soul_ir::types::Type;

    fn block(name: &str, terminator: Terminator) -> Block {
        Block {
            name: name.to_string(),
            statements: Vec::new(),
            terminator: Some(terminator),
        }
    }

    fn function(blocks: Vec<Block>) -> Function {
        Function {
            name: "f".to_string(),
            return_type: Type::int32(),
            parameters: Vec::new(),
            locals: Vec::new(),
            blocks,
            is_run_function: false,
            is_event_function: false,
            is_init_function: false,
            has_no_body: false,
            intrinsic: soul_ir::intrinsic::IntrinsicType::None,
            annotation: Vec::new(),
        }
    }

    #[test]
    fn strips_orphan_blocks() {
        // Block 1 is unreachable and would fail the value-return check.
        let mut f = function(vec![
            block("@block_0", Terminator::Return(Some(crate::ir::Expr::Constant(
                soul_ir::value::Value::int32(1),
            )))),
            block("@block_1", Terminator::Return(None)),
        ]);
        remove_unreachable_blocks(&mut f);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].name, "@block_0");
    }

    #[test]
    fn keeps_loops_and_remaps() {
        let mut f = function(vec![
            block("@a", Terminator::Branch(BlockId(2))),
            block("@orphan", Terminator::Return(None)),
            block("@b", Terminator::Branch(BlockId(0))),
        ]);
        remove_unreachable_blocks(&mut f);
        assert_eq!(f.blocks.len(), 2);
        assert!(matches!(
            f.blocks[0].terminator,
            Some(Terminator::Branch(BlockId(1)))
        ));
        assert!(has_back_edge(&f));
    }
}
