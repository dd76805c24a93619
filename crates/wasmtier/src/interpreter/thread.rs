use super::trace::Tracer;
use super::Trap;

/// Per-call-chain bookkeeping: call depth, native stack use and the
/// optional tracer.
///
/// Every wasm call nests a few native frames, so the depth limit alone
/// does not bound stack use: frame sizes differ between builds. The
/// distance from the stack position where the chain started is checked
/// on every call as well.
pub(crate) struct Thread<'t> {
    depth: u32,
    max_depth: u32,
    origin: usize,
    max_stack_bytes: usize,
    tracer: Option<&'t mut dyn Tracer>,
}

#[inline(always)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

impl<'t> Thread<'t> {
    pub(crate) fn new(
        max_depth: u32,
        max_stack_bytes: usize,
        tracer: Option<&'t mut dyn Tracer>,
    ) -> Self {
        Thread {
            depth: 0,
            max_depth,
            origin: stack_position(),
            max_stack_bytes,
            tracer,
        }
    }

    /// Account for one more nested call.
    pub(crate) fn enter(&mut self) -> Result<(), Trap> {
        if self.depth >= self.max_depth || self.stack_used() > self.max_stack_bytes {
            tracing::debug!(depth = self.depth, stack = self.stack_used(), "call stack exhausted");
            return Err(Trap::CallStackExhausted);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }

    /// Native stack consumed since the chain started.
    fn stack_used(&self) -> usize {
        self.origin.abs_diff(stack_position())
    }

    pub(crate) fn is_tracing(&self) -> bool {
        self.tracer.is_some()
    }

    pub(crate) fn tracer(&mut self) -> Option<&mut (dyn Tracer + 't)> {
        self.tracer.as_deref_mut()
    }
}
