//! Paged address-space model and the memory layout builder.

/// Incremental, validated layout construction.
pub mod layout;
/// Memory range kinds, payloads and the realized layout.
pub mod map;
/// Size token parsing and page alignment.
pub mod size;

pub use layout::{MemoryLayoutBuilder, RangeOptions, RomPadding};
pub use map::{
    MemoryLayout, MemoryRange, RangeKind, RangePayload, SpecialHandlers, SpecialRead,
    SpecialWrite,
};
pub use size::{pages_for, parse_size, SizeToken, GIB, KIB, MIB};

/// Bit shift converting addresses to page numbers.
pub const PAGE_SHIFT: u32 = 16;
/// Size in bytes of one page (64 KiB).
pub const PAGE_BYTES: u32 = 1 << PAGE_SHIFT;
/// Mask selecting the in-page offset of an address.
pub const PAGE_MASK: u32 = PAGE_BYTES - 1;

/// Returns the page number containing `addr`.
#[must_use]
pub const fn page_of(addr: u32) -> u32 {
    addr >> PAGE_SHIFT
}

/// Returns the first byte address of `page`.
#[must_use]
pub const fn page_start(page: u32) -> u64 {
    (page as u64) << PAGE_SHIFT
}

#[cfg(test)]
mod tests {
    use super::{page_of, page_start, PAGE_BYTES, PAGE_MASK};

    #[test]
    fn page_geometry_is_64kib() {
        assert_eq!(PAGE_BYTES, 0x1_0000);
        assert_eq!(PAGE_MASK, 0xFFFF);
        assert_eq!(page_of(0x0001_FFFF), 1);
        assert_eq!(page_of(0x0002_0000), 2);
        assert_eq!(page_start(0xFFFF), 0xFFFF_0000);
        assert_eq!(page_start(0x1_0000), 0x1_0000_0000);
    }
}
