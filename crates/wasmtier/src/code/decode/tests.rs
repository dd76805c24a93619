use super::*;
use crate::types::GlobalType;

#[derive(Default)]
struct TestScope {
    locals: Vec<ValType>,
    globals: Vec<GlobalType>,
    functions: Vec<FuncType>,
    types: Vec<FuncType>,
    memory: bool,
    table: bool,
}

impl Scope for TestScope {
    fn local_type(&self, index: u32) -> Option<ValType> {
        self.locals.get(index as usize).copied()
    }
    fn global_type(&self, index: u32) -> Option<GlobalType> {
        self.globals.get(index as usize).copied()
    }
    fn function_signature(&self, index: u32) -> Option<&FuncType> {
        self.functions.get(index as usize)
    }
    fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.types.get(index as usize)
    }
    fn has_table(&self, index: u32) -> bool {
        index == 0 && self.table
    }
    fn has_memory(&self, index: u32) -> bool {
        index == 0 && self.memory
    }
}

fn sig(params: &[ValType], results: &[ValType]) -> FuncType {
    FuncType::new(params.iter().copied(), results.iter().copied())
}

fn decode_with(
    scope: &TestScope,
    results: &[ValType],
    bytes: &[u8],
) -> Result<Body, ValidationError> {
    let signature = sig(&[], results);
    decode(bytes, &signature, scope)
}

const I32: ValType = ValType::I32;
const I64: ValType = ValType::I64;

#[test]
fn add_constants() {
    let scope = TestScope::default();
    // i32.const 1; i32.const 2; i32.add; end
    let body = decode_with(&scope, &[I32], &[0x41, 0x01, 0x41, 0x02, 0x6a, 0x0b]).unwrap();
    let opcodes: Vec<_> = body.instructions.iter().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        [Opcode::I32Const, Opcode::I32Const, Opcode::I32Add, Opcode::End]
    );
    assert_eq!(body.instructions[1].immediate, Immediate::I32(2));
    assert_eq!(body.metrics.max_stack_depth, 2);
    assert_eq!(body.metrics.max_nesting, 1);
    assert!(!body.metrics.has_loops);
}

#[test]
fn block_continuations_are_patched() {
    let scope = TestScope::default();
    // block (result i32) i32.const 7 end; end
    let body = decode_with(&scope, &[I32], &[0x02, 0x7f, 0x41, 0x07, 0x0b, 0x0b]).unwrap();
    let block = &body.instructions[0];
    assert_eq!(block.continuation(), 3);
    assert_eq!(block.block(), (0, 0, 1));
    assert_eq!(body.metrics.label_count, 2);
    assert_eq!(body.metrics.max_nesting, 2);
}

#[test]
fn if_else_labels() {
    let scope = TestScope {
        locals: vec![I32],
        ..TestScope::default()
    };
    // local.get 0; if (result i32) i32.const 1 else i32.const 2 end; end
    let bytes = [
        0x20, 0x00, 0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b,
    ];
    let body = decode_with(&scope, &[I32], &bytes).unwrap();
    let if_instr = &body.instructions[1];
    assert_eq!(if_instr.opcode, Opcode::If);
    assert_eq!(if_instr.continuation(), 6);
    assert_eq!(if_instr.else_ip(), 3);
    assert_eq!(body.instructions[3].opcode, Opcode::Else);
    assert_eq!(body.instructions[3].continuation(), 6);
}

#[test]
fn loop_targets_itself_and_sets_metric() {
    let scope = TestScope::default();
    // loop br 0 end; end
    let body = decode_with(&scope, &[], &[0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b]).unwrap();
    assert_eq!(body.instructions[0].continuation(), 0);
    assert!(body.metrics.has_loops);
}

#[test]
fn code_after_br_is_polymorphic() {
    let scope = TestScope::default();
    // block (result i32) unreachable i32.add end; end
    let bytes = [0x02, 0x7f, 0x00, 0x6a, 0x0b, 0x0b];
    assert!(decode_with(&scope, &[I32], &bytes).is_ok());
}

#[test]
fn stack_underflow() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[I32], &[0x6a, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::StackUnderflow);
}

#[test]
fn type_mismatch() {
    let scope = TestScope::default();
    // i64.const 1; i32.eqz
    let err = decode_with(&scope, &[I32], &[0x42, 0x01, 0x45, 0x0b]).unwrap_err();
    assert_eq!(
        err,
        ValidationError::TypeMismatch {
            expected: I32,
            actual: I64
        }
    );
}

#[test]
fn leftover_values_are_unbalanced() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[], &[0x41, 0x01, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::UnbalancedStack);
}

#[test]
fn if_without_else_must_pass_params_through() {
    let scope = TestScope {
        locals: vec![I32],
        ..TestScope::default()
    };
    // local.get 0; if (result i32) i32.const 7 end; end
    let bytes = [0x20, 0x00, 0x04, 0x7f, 0x41, 0x07, 0x0b, 0x0b];
    let err = decode_with(&scope, &[I32], &bytes).unwrap_err();
    assert_eq!(err, ValidationError::UnbalancedStack);

    // local.get 0; if i32.const 7 drop end; end
    let bytes = [0x20, 0x00, 0x04, 0x40, 0x41, 0x07, 0x1a, 0x0b, 0x0b];
    assert!(decode_with(&scope, &[], &bytes).is_ok());

    // i32.const 1; local.get 0; if (param i32) (result i32) i32.const 2 i32.add end; end
    let scope = TestScope {
        locals: vec![I32],
        types: vec![sig(&[I32], &[I32])],
        ..TestScope::default()
    };
    let bytes = [
        0x41, 0x01, 0x20, 0x00, 0x04, 0x00, 0x41, 0x02, 0x6a, 0x0b, 0x0b,
    ];
    assert!(decode_with(&scope, &[I32], &bytes).is_ok());
}

#[test]
fn unknown_indices() {
    let scope = TestScope::default();
    assert_eq!(
        decode_with(&scope, &[I32], &[0x20, 0x03, 0x0b]).unwrap_err(),
        ValidationError::UnknownLocal(3)
    );
    assert_eq!(
        decode_with(&scope, &[], &[0x10, 0x00, 0x0b]).unwrap_err(),
        ValidationError::UnknownFunction(0)
    );
    assert_eq!(
        decode_with(&scope, &[I32], &[0x23, 0x01, 0x0b]).unwrap_err(),
        ValidationError::UnknownGlobal(1)
    );
    assert_eq!(
        decode_with(&scope, &[I32], &[0x41, 0x00, 0x28, 0x02, 0x00, 0x0b]).unwrap_err(),
        ValidationError::UnknownMemory(0)
    );
}

#[test]
fn immutable_global() {
    let scope = TestScope {
        globals: vec![GlobalType {
            content: I32,
            mutable: false,
        }],
        ..TestScope::default()
    };
    let err = decode_with(&scope, &[], &[0x41, 0x00, 0x24, 0x00, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::ImmutableGlobal(0));
}

#[test]
fn branch_depth_out_of_range() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[], &[0x0c, 0x01, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::InvalidLabel(1));
}

#[test]
fn br_table_arity_mismatch() {
    let scope = TestScope::default();
    // block (result i32) block i32.const 0 i32.const 0 br_table 0 1 end end
    let bytes = [
        0x02, 0x7f, 0x02, 0x40, 0x41, 0x00, 0x41, 0x00, 0x0e, 0x01, 0x00, 0x01, 0x0b, 0x0b, 0x0b,
    ];
    let err = decode_with(&scope, &[I32], &bytes).unwrap_err();
    assert_eq!(err, ValidationError::BrTableArityMismatch);
}

#[test]
fn else_without_if() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[], &[0x02, 0x40, 0x05, 0x0b, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::InvalidNesting);
}

#[test]
fn bytes_after_final_end() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[], &[0x0b, 0x01]).unwrap_err();
    assert_eq!(err, ValidationError::UnexpectedEnd);
}

#[test]
fn truncated_body() {
    let scope = TestScope::default();
    let err = decode_with(&scope, &[], &[0x02, 0x40, 0x0b]).unwrap_err();
    assert_eq!(err, ValidationError::UnexpectedEof);
}

#[test]
fn call_uses_signature() {
    let scope = TestScope {
        functions: vec![sig(&[I32, I32], &[I64])],
        ..TestScope::default()
    };
    let bytes = [0x41, 0x01, 0x41, 0x02, 0x10, 0x00, 0x0b];
    let body = decode_with(&scope, &[I64], &bytes).unwrap();
    assert_eq!(body.instructions[2].index(), 0);
}

#[test]
fn saturating_truncation_prefix() {
    let scope = TestScope::default();
    // f32.const 1.5; i32.trunc_sat_f32_s
    let bytes = [0x43, 0x00, 0x00, 0xc0, 0x3f, 0xfc, 0x00, 0x0b];
    let body = decode_with(&scope, &[I32], &bytes).unwrap();
    assert_eq!(body.instructions[1].opcode, Opcode::I32TruncSatF32S);
}
