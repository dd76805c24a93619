//! The value arena shared by every frame of one call chain.
//!
//! Layout of a frame (grows upward):
//! ```text
//! [params | declared locals | blocks ........ | stack ............]
//!  ^base                      ^blocks_base      ^stack_base
//! ```
//!
//! A callee's params are the top of its caller's operand stack, so a call
//! copies nothing on entry. On return the results are copied down to the
//! callee's `base`, which is exactly where the caller expects them.
//!
//! Frames are addressed by offset, never by pointer. When the arena has to
//! grow it is reallocated as a whole and each live frame's windows are
//! recomputed from its stored base.

use std::ops::Range;

/// Sizes of the windows of a frame, taken from the callee's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct FrameLayout {
    pub(crate) num_params: usize,
    /// Params plus declared locals.
    pub(crate) num_locals: usize,
    /// Continuation stack capacity in slots; zero for fcode.
    pub(crate) max_blocks: usize,
    pub(crate) max_stack: usize,
}

impl FrameLayout {
    pub(crate) fn size(&self) -> usize {
        self.num_locals + self.max_blocks + self.max_stack
    }
}

/// An active frame: a layout pinned at an arena offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) base: usize,
    pub(crate) layout: FrameLayout,
    blocks_base: usize,
    stack_base: usize,
    end: usize,
}

impl Frame {
    fn at(base: usize, layout: FrameLayout) -> Self {
        let blocks_base = base + layout.num_locals;
        let stack_base = blocks_base + layout.max_blocks;
        Frame {
            base,
            layout,
            blocks_base,
            stack_base,
            end: stack_base + layout.max_stack,
        }
    }

    /// Params followed by declared locals.
    pub(crate) fn locals(&self) -> Range<usize> {
        self.base..self.blocks_base
    }

    pub(crate) fn blocks(&self) -> Range<usize> {
        self.blocks_base..self.stack_base
    }

    pub(crate) fn stack(&self) -> Range<usize> {
        self.stack_base..self.end
    }
}

const GROWTH_QUANTUM: usize = 1024;

pub(crate) struct Machine {
    arena: Vec<u64>,
    frames: Vec<Frame>,
    growths: u32,
}

impl Machine {
    pub(crate) fn new(initial_slots: usize) -> Self {
        Machine {
            arena: vec![0; initial_slots.max(1)],
            frames: Vec::new(),
            growths: 0,
        }
    }

    /// Number of times the arena has been reallocated.
    pub(crate) fn growths(&self) -> u32 {
        self.growths
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> u64 {
        self.arena[index]
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, value: u64) {
        self.arena[index] = value;
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> &[u64] {
        &self.arena[range]
    }

    pub(crate) fn slice_mut(&mut self, range: Range<usize>) -> &mut [u64] {
        &mut self.arena[range]
    }

    /// Copy `count` slots from `src` down (or up) to `dst`.
    #[inline]
    pub(crate) fn copy(&mut self, src: usize, dst: usize, count: usize) {
        if src != dst && count > 0 {
            self.arena.copy_within(src..src + count, dst);
        }
    }

    /// Split the arena around `mid` for host calls, which read their params
    /// below `mid` and write results above it.
    pub(crate) fn split_at_mut(&mut self, mid: usize) -> (&mut [u64], &mut [u64]) {
        self.arena.split_at_mut(mid)
    }

    fn reserve(&mut self, end: usize) {
        if end <= self.arena.len() {
            return;
        }
        let old = self.arena.len();
        let wanted = end.div_ceil(GROWTH_QUANTUM) * GROWTH_QUANTUM;
        let new_len = wanted.max(old * 2);
        let mut arena = vec![0; new_len];
        arena[..old].copy_from_slice(&self.arena);
        self.arena = arena;
        for frame in &mut self.frames {
            *frame = Frame::at(frame.base, frame.layout);
        }
        self.growths += 1;
        tracing::debug!(old, new = new_len, frames = self.frames.len(), "value arena grown");
    }

    /// Make sure `count` slots starting at `base` are addressable, for
    /// writing call arguments before the callee's frame exists.
    pub(crate) fn ensure(&mut self, base: usize, count: usize) {
        self.reserve(base + count);
    }

    /// Enter a frame whose params already sit at `base`. Declared locals
    /// are zeroed.
    pub(crate) fn push(&mut self, base: usize, layout: FrameLayout) -> Frame {
        self.reserve(base + layout.size());
        let frame = Frame::at(base, layout);
        self.arena[base + layout.num_params..base + layout.num_locals].fill(0);
        self.frames.push(frame);
        frame
    }

    /// Leave the top frame, moving `count` results from `results` to the
    /// frame's base.
    pub(crate) fn pop(&mut self, results: usize, count: usize) {
        if let Some(frame) = self.frames.pop() {
            self.copy(results, frame.base, count);
        }
    }

    /// Unwind every frame above `depth` after a trap.
    pub(crate) fn unwind_to(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(params: usize, locals: usize, stack: usize) -> FrameLayout {
        FrameLayout {
            num_params: params,
            num_locals: locals,
            max_blocks: 2,
            max_stack: stack,
        }
    }

    #[test]
    fn windows_follow_layout() {
        let mut m = Machine::new(64);
        let frame = m.push(4, layout(1, 3, 5));
        assert_eq!(frame.locals(), 4..7);
        assert_eq!(frame.blocks(), 7..9);
        assert_eq!(frame.stack(), 9..14);
    }

    #[test]
    fn declared_locals_are_zeroed_params_kept() {
        let mut m = Machine::new(16);
        m.slice_mut(0..4).copy_from_slice(&[7, 9, 9, 9]);
        let frame = m.push(0, layout(1, 4, 1));
        assert_eq!(m.slice(frame.locals()), &[7, 0, 0, 0]);
    }

    #[test]
    fn growth_preserves_live_frames() {
        let mut m = Machine::new(8);
        let mut base = 0;
        for depth in 0..50u64 {
            let frame = m.push(base, layout(0, 2, 4));
            m.set(frame.locals().start, depth);
            m.set(frame.locals().start + 1, depth * 10);
            base = frame.stack().start;
        }
        assert!(m.growths() > 0);
        assert!(m.capacity() >= base);
        for (depth, frame) in m.frames().iter().enumerate() {
            assert_eq!(m.get(frame.locals().start), depth as u64);
            assert_eq!(m.get(frame.locals().start + 1), depth as u64 * 10);
        }
    }

    #[test]
    fn pop_moves_results_to_base() {
        let mut m = Machine::new(32);
        let frame = m.push(3, layout(0, 1, 4));
        m.set(frame.stack().start, 11);
        m.set(frame.stack().start + 1, 22);
        m.pop(frame.stack().start, 2);
        assert_eq!(m.slice(3..5), &[11, 22]);
        assert_eq!(m.depth(), 0);
    }
}
