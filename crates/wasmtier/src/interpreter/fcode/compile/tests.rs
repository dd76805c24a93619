use super::*;
use crate::code::{self, BinOp};
use crate::types::{GlobalType, ValType};

const I32: ValType = ValType::I32;

struct LocalsScope(Vec<ValType>);

impl Scope for LocalsScope {
    fn local_type(&self, index: u32) -> Option<ValType> {
        self.0.get(index as usize).copied()
    }
    fn global_type(&self, _: u32) -> Option<GlobalType> {
        None
    }
    fn function_signature(&self, _: u32) -> Option<&FuncType> {
        None
    }
    fn func_type(&self, _: u32) -> Option<&FuncType> {
        None
    }
    fn has_table(&self, _: u32) -> bool {
        false
    }
    fn has_memory(&self, _: u32) -> bool {
        false
    }
}

fn compile_body(locals: &[ValType], params: usize, results: &[ValType], bytes: &[u8]) -> Fcode {
    let scope = LocalsScope(locals.to_vec());
    let ty = FuncType::new(locals[..params].iter().copied(), results.iter().copied());
    let body = code::decode(bytes, &ty, &scope).unwrap();
    compile(Rc::new(body), &ty, locals.len(), &scope)
}

#[test]
fn local_set_takes_over_destination() {
    // local.get 0; local.get 1; i32.add; local.set 2; end
    let fcode = compile_body(
        &[I32, I32, I32],
        2,
        &[],
        &[0x20, 0x00, 0x20, 0x01, 0x6a, 0x21, 0x02, 0x0b],
    );
    assert_eq!(
        fcode.instructions,
        [
            FInstr::Binary {
                op: BinOp::I32Add,
                dest: 2,
                lhs: 0,
                rhs: Operand::Slot(1)
            },
            FInstr::Return { stack_height: 0 },
        ]
    );
}

#[test]
fn constant_operand_is_folded() {
    // local.get 0; i32.const 5; i32.add; end
    let fcode = compile_body(&[I32], 1, &[I32], &[0x20, 0x00, 0x41, 0x05, 0x6a, 0x0b]);
    assert_eq!(
        fcode.instructions,
        [
            FInstr::Binary {
                op: BinOp::I32Add,
                dest: 1,
                lhs: 0,
                rhs: Operand::Imm(5)
            },
            FInstr::Return { stack_height: 1 },
        ]
    );
}

#[test]
fn commutative_constant_moves_right() {
    // i32.const 5; local.get 0; i32.add; end
    let fcode = compile_body(&[I32], 1, &[I32], &[0x41, 0x05, 0x20, 0x00, 0x6a, 0x0b]);
    assert!(matches!(
        fcode.instructions[0],
        FInstr::Binary {
            lhs: 0,
            rhs: Operand::Imm(5),
            ..
        }
    ));

    // i32.const 5; local.get 0; i32.sub; end
    let fcode = compile_body(&[I32], 1, &[I32], &[0x41, 0x05, 0x20, 0x00, 0x6b, 0x0b]);
    assert_eq!(
        fcode.instructions[..2],
        [
            FInstr::Const { dest: 1, value: 5 },
            FInstr::Binary {
                op: BinOp::I32Sub,
                dest: 1,
                lhs: 1,
                rhs: Operand::Slot(0)
            },
        ]
    );
}

#[test]
fn compare_fuses_into_br_if() {
    // block; local.get 0; i32.const 0; i32.eq; br_if 0; end; end
    let fcode = compile_body(
        &[I32],
        1,
        &[],
        &[0x02, 0x40, 0x20, 0x00, 0x41, 0x00, 0x46, 0x0d, 0x00, 0x0b, 0x0b],
    );
    assert_eq!(
        fcode.instructions,
        [
            FInstr::BrIfCmp {
                cond: Cond::Compare(BinOp::I32Eq, 0, Operand::Imm(0)),
                label: 1
            },
            FInstr::Return { stack_height: 0 },
        ]
    );
    assert_eq!(fcode.labels[1].continuation, 1);
}

#[test]
fn local_condition_is_not_fused() {
    // loop; local.get 0; br_if 0; end; end
    let fcode = compile_body(&[I32], 1, &[], &[0x03, 0x40, 0x20, 0x00, 0x0d, 0x00, 0x0b, 0x0b]);
    assert_eq!(
        fcode.instructions,
        [
            FInstr::BrIf { cond: 0, label: 1 },
            FInstr::Return { stack_height: 0 },
        ]
    );
    assert_eq!(fcode.labels[1].continuation, 0);
    assert_eq!(fcode.labels[1].arity, 0);
}

#[test]
fn pending_read_lands_before_local_is_overwritten() {
    // local.get 0; i32.const 1; local.set 0; end
    let fcode = compile_body(&[I32], 1, &[I32], &[0x20, 0x00, 0x41, 0x01, 0x21, 0x00, 0x0b]);
    assert_eq!(
        fcode.instructions,
        [
            FInstr::Copy { dest: 1, src: 0 },
            FInstr::Const { dest: 0, value: 1 },
            FInstr::Return { stack_height: 1 },
        ]
    );
}

#[test]
fn branch_from_deeper_stack_moves_values() {
    // block (result i32); i32.const 1; i32.const 2; br 0; end; end
    let fcode = compile_body(
        &[],
        0,
        &[I32],
        &[0x02, 0x7f, 0x41, 0x01, 0x41, 0x02, 0x0c, 0x00, 0x0b, 0x0b],
    );
    assert_eq!(
        fcode.instructions,
        [
            FInstr::Const { dest: 1, value: 2 },
            FInstr::BrMove {
                label: 1,
                stack_height: 2
            },
            FInstr::Return { stack_height: 1 },
        ]
    );
    assert_eq!(fcode.labels[1].continuation, 2);
}

#[test]
fn if_else_records_both_entries() {
    // local.get 0; if (result i32); i32.const 1; else; i32.const 2; end; end
    let fcode = compile_body(
        &[I32],
        1,
        &[I32],
        &[0x20, 0x00, 0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b],
    );
    assert_eq!(
        fcode.instructions,
        [
            FInstr::If { cond: 0, label: 1 },
            FInstr::Const { dest: 1, value: 1 },
            FInstr::Else { label: 1 },
            FInstr::Const { dest: 1, value: 2 },
            FInstr::Return { stack_height: 1 },
        ]
    );
    assert_eq!(fcode.labels[1].else_ip, Some(3));
    assert_eq!(fcode.labels[1].continuation, 4);
}
