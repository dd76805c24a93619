/// Table 0: function indices, `None` for uninitialized entries.
#[derive(Debug, Clone, Default)]
pub struct Table {
    elements: Vec<Option<u32>>,
}

impl Table {
    pub(crate) fn new(size: u32) -> Self {
        Table {
            elements: vec![None; size as usize],
        }
    }

    pub fn len(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// `None` when `index` is past the end, `Some(None)` for an
    /// uninitialized element.
    pub fn get(&self, index: u32) -> Option<Option<u32>> {
        self.elements.get(index as usize).copied()
    }

    pub(crate) fn initialize(&mut self, offset: u32, items: &[Option<u32>]) -> Result<(), anyhow::Error> {
        let start = offset as usize;
        let end = start
            .checked_add(items.len())
            .filter(|&end| end <= self.elements.len())
            .ok_or_else(|| anyhow::anyhow!("out of bounds table access"))?;
        self.elements[start..end].copy_from_slice(items);
        Ok(())
    }
}
