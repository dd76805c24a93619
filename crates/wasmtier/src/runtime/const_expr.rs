use wasmparser::Operator;

/// One operator of a constant initializer expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConstOp {
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    GlobalGet(u32),
    RefFunc(u32),
    RefNull,
    I32Add,
    I32Sub,
    I32Mul,
    I64Add,
    I64Sub,
    I64Mul,
}

/// A constant expression used by global initializers and segment offsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConstExpr(Vec<ConstOp>);

fn binop(stack: &mut Vec<ConstValue>, f: fn(u64, u64) -> u64) -> Option<()> {
    let Some(ConstValue::Num(b)) = stack.pop() else {
        return None;
    };
    let Some(ConstValue::Num(a)) = stack.pop() else {
        return None;
    };
    stack.push(ConstValue::Num(f(a, b)));
    Some(())
}

/// Result of evaluating a constant expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConstValue {
    /// A number in raw slot encoding.
    Num(u64),
    FuncRef(Option<u32>),
}

impl ConstExpr {
    pub(crate) fn from_ops(ops: Vec<ConstOp>) -> Self {
        ConstExpr(ops)
    }

    pub(crate) fn parse(expr: &wasmparser::ConstExpr<'_>) -> Result<Self, anyhow::Error> {
        let mut reader = expr.get_operators_reader();
        let mut ops = Vec::new();
        loop {
            let op = match reader.read()? {
                Operator::End => break,
                Operator::I32Const { value } => ConstOp::I32Const(value),
                Operator::I64Const { value } => ConstOp::I64Const(value),
                Operator::F32Const { value } => ConstOp::F32Const(value.bits()),
                Operator::F64Const { value } => ConstOp::F64Const(value.bits()),
                Operator::GlobalGet { global_index } => ConstOp::GlobalGet(global_index),
                Operator::RefFunc { function_index } => ConstOp::RefFunc(function_index),
                Operator::RefNull { .. } => ConstOp::RefNull,
                Operator::I32Add => ConstOp::I32Add,
                Operator::I32Sub => ConstOp::I32Sub,
                Operator::I32Mul => ConstOp::I32Mul,
                Operator::I64Add => ConstOp::I64Add,
                Operator::I64Sub => ConstOp::I64Sub,
                Operator::I64Mul => ConstOp::I64Mul,
                other => anyhow::bail!("unsupported constant expression operator {other:?}"),
            };
            ops.push(op);
        }
        Ok(ConstExpr(ops))
    }

    /// Evaluate against the raw values of the globals initialized so far.
    pub(crate) fn eval(&self, globals: &[u64]) -> Option<ConstValue> {
        let mut stack: Vec<ConstValue> = Vec::new();
        for op in &self.0 {
            match *op {
                ConstOp::I32Const(v) => stack.push(ConstValue::Num(v as u32 as u64)),
                ConstOp::I64Const(v) => stack.push(ConstValue::Num(v as u64)),
                ConstOp::F32Const(bits) => stack.push(ConstValue::Num(bits as u64)),
                ConstOp::F64Const(bits) => stack.push(ConstValue::Num(bits)),
                ConstOp::GlobalGet(index) => {
                    stack.push(ConstValue::Num(*globals.get(index as usize)?))
                }
                ConstOp::RefFunc(index) => stack.push(ConstValue::FuncRef(Some(index))),
                ConstOp::RefNull => stack.push(ConstValue::FuncRef(None)),
                ConstOp::I32Add => binop(&mut stack, |a, b| (a as u32).wrapping_add(b as u32) as u64)?,
                ConstOp::I32Sub => binop(&mut stack, |a, b| (a as u32).wrapping_sub(b as u32) as u64)?,
                ConstOp::I32Mul => binop(&mut stack, |a, b| (a as u32).wrapping_mul(b as u32) as u64)?,
                ConstOp::I64Add => binop(&mut stack, u64::wrapping_add)?,
                ConstOp::I64Sub => binop(&mut stack, u64::wrapping_sub)?,
                ConstOp::I64Mul => binop(&mut stack, u64::wrapping_mul)?,
            }
        }
        stack.pop()
    }

    /// Evaluate an offset expression to an `i32` address.
    pub(crate) fn eval_offset(&self, globals: &[u64]) -> Result<u32, anyhow::Error> {
        match self.eval(globals) {
            Some(ConstValue::Num(v)) => Ok(v as u32),
            other => anyhow::bail!("unsupported segment offset {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_const_arithmetic() {
        let expr = ConstExpr::from_ops(vec![
            ConstOp::GlobalGet(0),
            ConstOp::I32Const(-1),
            ConstOp::I32Add,
        ]);
        assert_eq!(expr.eval(&[10]), Some(ConstValue::Num(9)));
        assert_eq!(expr.eval(&[]), None);
    }

    #[test]
    fn func_refs() {
        let expr = ConstExpr::from_ops(vec![ConstOp::RefFunc(3)]);
        assert_eq!(expr.eval(&[]), Some(ConstValue::FuncRef(Some(3))));
        assert!(expr.eval_offset(&[]).is_err());
    }
}
