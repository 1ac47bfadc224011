//! # Physical Memory Access
//!
//! The table and its forwarded copies live at physical addresses. The reader
//! reaches them through [`PhysMapRo`], so it works the same whether the OS
//! identity maps low memory, uses a direct map, or copied the table into a
//! buffer of its own.

/// Map a physical region and return a *read-only* byte slice for its contents.
pub trait PhysMapRo {
    /// The `len` bytes at `paddr`, or `None` if the range is not accessible.
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]>;
}

/// A byte buffer standing in for physical memory starting at `base`.
#[derive(Debug, Clone, Copy)]
pub struct SliceMemory<'a> {
    base: u64,
    bytes: &'a [u8],
}

impl<'a> SliceMemory<'a> {
    #[must_use]
    pub const fn new(base: u64, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl PhysMapRo for SliceMemory<'_> {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(paddr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end)
    }
}

/// Physical memory seen through a fixed-offset direct map (HHDM).
#[derive(Debug, Clone, Copy)]
pub struct HhdmMap {
    offset: u64,
}

impl HhdmMap {
    /// # Safety
    /// Every physical address handed to [`PhysMapRo::map_ro`] must be mapped
    /// readable at `offset + paddr`, and the memory must not be written while
    /// a returned slice is alive.
    #[must_use]
    pub const unsafe fn new(offset: u64) -> Self {
        Self { offset }
    }
}

impl PhysMapRo for HhdmMap {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]> {
        let va = usize::try_from(self.offset.checked_add(paddr)?).ok()?;
        if va == 0 {
            return None;
        }
        isize::try_from(va.checked_add(len)?).ok()?;
        let ptr = core::ptr::with_exposed_provenance::<u8>(va);
        // SAFETY: `ptr` is non-null and `va + len` fits in `isize`; mapping and
        // immutability are guaranteed by the contract of `HhdmMap::new`.
        Some(unsafe { core::slice::from_raw_parts(ptr, len) })
    }
}
