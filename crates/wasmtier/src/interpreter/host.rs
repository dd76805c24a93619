use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::Trap;
use crate::runtime::Memory;
use crate::types::FuncType;
use crate::value::Val;

/// What a host function can reach of the calling instance.
///
/// The memory is borrowed on demand; drop the guard before calling into
/// another instance that shares it.
pub struct Caller<'a> {
    pub(crate) memory: Option<&'a RefCell<Memory>>,
}

impl<'a> Caller<'a> {
    pub fn memory(&self) -> Option<Ref<'_, Memory>> {
        self.memory.map(RefCell::borrow)
    }

    pub fn memory_mut(&mut self) -> Option<RefMut<'_, Memory>> {
        self.memory.map(RefCell::borrow_mut)
    }
}

type HostFn = dyn Fn(&mut Caller<'_>, &[u64], &mut [u64]) -> Result<(), Trap>;

/// A function implemented by the embedder.
///
/// Arguments and results cross the boundary as raw slot words, the same
/// encoding frames use, so a host call runs in an ordinary frame of the
/// call chain's arena.
#[derive(Clone)]
pub struct HostFunc {
    ty: FuncType,
    func: Rc<HostFn>,
}

impl HostFunc {
    /// A host function over raw slot words.
    pub fn new(
        ty: FuncType,
        func: impl Fn(&mut Caller<'_>, &[u64], &mut [u64]) -> Result<(), Trap> + 'static,
    ) -> Self {
        HostFunc {
            ty,
            func: Rc::new(func),
        }
    }

    /// A host function over typed values.
    pub fn wrap(
        ty: FuncType,
        func: impl Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + 'static,
    ) -> Self {
        let sig = ty.clone();
        HostFunc::new(ty, move |caller, args, results| {
            let vals: Vec<Val> = sig
                .params()
                .iter()
                .zip(args)
                .map(|(&ty, &bits)| Val::from_bits(ty, bits))
                .collect();
            let out = func(caller, &vals)?;
            if out.len() != results.len()
                || out.iter().zip(sig.results()).any(|(v, &ty)| v.ty() != ty)
            {
                return Err(Trap::Host(format!(
                    "host function returned {out:?}, expected {sig}"
                )));
            }
            for (slot, val) in results.iter_mut().zip(&out) {
                *slot = val.to_bits();
            }
            Ok(())
        })
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub(crate) fn call(
        &self,
        caller: &mut Caller<'_>,
        args: &[u64],
        results: &mut [u64],
    ) -> Result<(), Trap> {
        (self.func)(caller, args, results)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc").field("ty", &self.ty).finish_non_exhaustive()
    }
}
