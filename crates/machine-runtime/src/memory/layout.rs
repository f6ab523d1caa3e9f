//! Incremental construction of a paged memory layout.
//!
//! Ranges are kept sorted by start page and never share a page. Every
//! mutating call either fully succeeds or leaves the builder untouched.

use std::rc::Rc;

use crate::memory::map::page_map_string;
use crate::memory::size::{pages_for, SizeToken};
use crate::memory::{MemoryLayout, MemoryRange, RangeKind, RangePayload, SpecialHandlers};
use crate::memory::{KIB, PAGE_BYTES};
use crate::ConfigError;

/// Fill word answered by empty ranges unless configured otherwise.
pub const DEFAULT_EMPTY_FILL: u32 = 0xFFFF_FFFF;
/// Default units used by the address-based helpers (1 KiB).
pub const DEFAULT_UNITS: u64 = KIB;

/// Per-range placement options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOptions {
    /// Split the range around already placed ranges instead of failing.
    pub sparse: bool,
    /// Allow A-line traps to fire from code in this range.
    pub traps: bool,
    /// Descriptive name carried by the placed range(s).
    pub name: Option<String>,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            sparse: false,
            traps: true,
            name: None,
        }
    }
}

impl RangeOptions {
    /// Default options: dense placement, traps enabled, unnamed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables sparse placement.
    #[must_use]
    pub const fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Enables or disables A-line traps.
    #[must_use]
    pub const fn traps(mut self, traps: bool) -> Self {
        self.traps = traps;
        self
    }

    /// Attaches a descriptive name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Padding policy for ROM content that does not fill whole pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RomPadding {
    /// Content must already be page sized.
    #[default]
    None,
    /// Pad with zero bytes.
    Zero,
    /// Pad with the given byte.
    Fill(u8),
}

/// Accumulates memory ranges and validates them against a page budget.
#[derive(Debug, Clone)]
pub struct MemoryLayoutBuilder {
    auto_align: bool,
    ram_at_zero: bool,
    ranges: Vec<MemoryRange>,
}

impl Default for MemoryLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLayoutBuilder {
    /// Creates an empty builder with strict alignment and the RAM-at-zero policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auto_align: false,
            ram_at_zero: true,
            ranges: Vec::new(),
        }
    }

    /// Rounds unaligned sizes up to whole pages instead of rejecting them.
    #[must_use]
    pub const fn with_auto_align(mut self, auto_align: bool) -> Self {
        self.auto_align = auto_align;
        self
    }

    /// Enables or disables the requirement that page 0 is RAM.
    #[must_use]
    pub const fn with_ram_at_zero(mut self, ram_at_zero: bool) -> Self {
        self.ram_at_zero = ram_at_zero;
        self
    }

    /// Returns `true` when unaligned sizes are rounded up.
    #[must_use]
    pub const fn auto_align(&self) -> bool {
        self.auto_align
    }

    /// Returns the placed ranges in ascending page order.
    #[must_use]
    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }

    /// Returns the number of pages needed to hold the layout.
    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.ranges.last().map_or(0, MemoryRange::next_page)
    }

    /// Renders the layout as one glyph per page (see [`RangeKind::glyph`]).
    #[must_use]
    pub fn page_map(&self) -> String {
        page_map_string(&self.ranges)
    }

    /// Adds a RAM range.
    ///
    /// # Errors
    ///
    /// See [`MemoryLayoutBuilder::add_range`].
    pub fn add_ram_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        self.add_range(start_page, num_pages, RangeKind::Ram, RangePayload::None, options)
    }

    /// Adds a ROM range, optionally preloaded with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RomNeedsPadding`] for partial-page content without
    /// padding, [`ConfigError::RomTooLarge`] when the content exceeds the range,
    /// and placement errors of [`MemoryLayoutBuilder::add_range`].
    pub fn add_rom_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        data: Option<&[u8]>,
        padding: RomPadding,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let payload = match data {
            Some(data) => RangePayload::Rom(prepare_rom(data, num_pages, padding)?),
            None => RangePayload::None,
        };
        self.add_range(start_page, num_pages, RangeKind::Rom, payload, options)
    }

    /// Adds a special range served by host accessors.
    ///
    /// # Errors
    ///
    /// See [`MemoryLayoutBuilder::add_range`].
    pub fn add_special_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        handlers: SpecialHandlers,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let payload = RangePayload::Special(handlers);
        self.add_range(start_page, num_pages, RangeKind::Special, payload, options)
    }

    /// Adds an empty range answering `fill` on reads.
    ///
    /// # Errors
    ///
    /// See [`MemoryLayoutBuilder::add_range`].
    pub fn add_empty_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        fill: u32,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let payload = RangePayload::Empty(fill);
        self.add_range(start_page, num_pages, RangeKind::Empty, payload, options)
    }

    /// Adds a range aliasing the pages starting at `base_page`.
    ///
    /// # Errors
    ///
    /// See [`MemoryLayoutBuilder::add_range`].
    pub fn add_mirror_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        base_page: u32,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let payload = RangePayload::Mirror(base_page);
        self.add_range(start_page, num_pages, RangeKind::Mirror, payload, options)
    }

    /// Reserves pages so that later sparse ranges flow around them.
    ///
    /// # Errors
    ///
    /// See [`MemoryLayoutBuilder::add_range`].
    pub fn add_reserve_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        self.add_range(
            start_page,
            num_pages,
            RangeKind::Reserve,
            RangePayload::None,
            options,
        )
    }

    /// Adds a RAM range given by byte address and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors of [`pages_for`] plus placement errors.
    pub fn add_ram_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        self.add_ram_range(start_page, num_pages, options)
    }

    /// Adds a ROM range given by byte address and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors plus the errors of [`MemoryLayoutBuilder::add_rom_range`].
    pub fn add_rom_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        data: Option<&[u8]>,
        padding: RomPadding,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        self.add_rom_range(start_page, num_pages, data, padding, options)
    }

    /// Adds a special range given by byte address and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors plus placement errors.
    pub fn add_special_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        handlers: SpecialHandlers,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        self.add_special_range(start_page, num_pages, handlers, options)
    }

    /// Adds an empty range given by byte address and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors plus placement errors.
    pub fn add_empty_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        fill: u32,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        self.add_empty_range(start_page, num_pages, fill, options)
    }

    /// Adds a mirror range given by byte addresses and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors plus placement errors.
    pub fn add_mirror_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        base_addr: impl Into<SizeToken<'a>>,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        let base_page = pages_for(base_addr.into(), 1, self.auto_align)?;
        self.add_mirror_range(start_page, num_pages, base_page, options)
    }

    /// Reserves a range given by byte address and size in `units`.
    ///
    /// # Errors
    ///
    /// Size and alignment errors plus placement errors.
    pub fn add_reserve_range_addr<'a>(
        &mut self,
        addr: impl Into<SizeToken<'a>>,
        size: impl Into<SizeToken<'a>>,
        units: u64,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        let (start_page, num_pages) = self.resolve(addr.into(), size.into(), units)?;
        self.add_reserve_range(start_page, num_pages, options)
    }

    /// Places a range of any kind and returns the sub-ranges actually placed.
    ///
    /// Dense placement yields exactly one range. Sparse placement yields one
    /// range per free gap inside the request, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRange`] for zero pages,
    /// [`ConfigError::InvalidPayload`] when `payload` does not suit `kind`,
    /// [`ConfigError::MirrorOutOfRange`] when a mirror base span wraps,
    /// [`ConfigError::Overlap`] when dense placement hits an existing range and
    /// [`ConfigError::NoFreePages`] when sparse placement finds no gap.
    pub fn add_range(
        &mut self,
        start_page: u32,
        num_pages: u32,
        kind: RangeKind,
        payload: RangePayload,
        options: &RangeOptions,
    ) -> Result<Vec<MemoryRange>, ConfigError> {
        if num_pages == 0 {
            return Err(ConfigError::EmptyRange { start_page });
        }
        if !payload.fits(kind) {
            return Err(ConfigError::InvalidPayload { start_page, kind });
        }
        if let RangePayload::Mirror(base_page) = &payload {
            let base_page = *base_page;
            if base_page.checked_add(num_pages).is_none() {
                return Err(ConfigError::MirrorOutOfRange {
                    start_page,
                    num_pages,
                    base_page,
                });
            }
        }
        let range = MemoryRange {
            start_page,
            num_pages,
            kind,
            payload,
            traps: options.traps,
            name: options.name.clone(),
        };

        let plan = self.plan_placement(&range, options.sparse)?;
        let placed = plan.iter().map(|(_, piece)| piece.clone()).collect();
        for (slot, piece) in plan.into_iter().rev() {
            self.ranges.insert(slot, piece);
        }
        Ok(placed)
    }

    /// Validates the layout against a page budget.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyLayout`], [`ConfigError::TooManyPages`],
    /// [`ConfigError::NoRamAtZero`] or [`ConfigError::MirrorOutOfRange`] when a
    /// mirror aliases pages past the end of the layout.
    pub fn check(&self, max_pages: u32) -> Result<(), ConfigError> {
        let want = self.num_pages();
        if want == 0 {
            return Err(ConfigError::EmptyLayout);
        }
        if want > max_pages {
            return Err(ConfigError::TooManyPages {
                want,
                max: max_pages,
            });
        }
        if self.ram_at_zero {
            let first = &self.ranges[0];
            if first.start_page > 0 || first.kind != RangeKind::Ram {
                return Err(ConfigError::NoRamAtZero);
            }
        }
        for range in &self.ranges {
            if let RangePayload::Mirror(base_page) = range.payload {
                let inside = base_page
                    .checked_add(range.num_pages)
                    .is_some_and(|end| end <= want);
                if !inside {
                    return Err(ConfigError::MirrorOutOfRange {
                        start_page: range.start_page,
                        num_pages: range.num_pages,
                        base_page,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates the layout and freezes it.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryLayoutBuilder::check`].
    pub fn build(self, max_pages: u32) -> Result<MemoryLayout, ConfigError> {
        self.check(max_pages)?;
        Ok(MemoryLayout::from_checked(self.ranges))
    }

    fn resolve(
        &self,
        addr: SizeToken<'_>,
        size: SizeToken<'_>,
        units: u64,
    ) -> Result<(u32, u32), ConfigError> {
        let start_page = pages_for(addr, 1, self.auto_align)?;
        let num_pages = pages_for(size, units, self.auto_align)?;
        Ok((start_page, num_pages))
    }

    /// Computes where each piece of `range` goes without touching the list.
    ///
    /// Slots refer to indices in the current list; pieces come out in
    /// ascending order with strictly increasing slots.
    fn plan_placement(
        &self,
        range: &MemoryRange,
        sparse: bool,
    ) -> Result<Vec<(usize, MemoryRange)>, ConfigError> {
        let end = range.next_page();
        let mut cursor = range.start_page;
        let mut pieces = Vec::new();
        let mut tail_slot = self.ranges.len();

        for (index, existing) in self.ranges.iter().enumerate() {
            if existing.next_page() <= cursor {
                continue;
            }
            if existing.start_page >= end {
                tail_slot = index;
                break;
            }
            if !sparse {
                return Err(ConfigError::Overlap {
                    start_page: range.start_page,
                    num_pages: range.num_pages,
                    existing_start: existing.start_page,
                    existing_pages: existing.num_pages,
                });
            }
            if existing.start_page > cursor {
                pieces.push((index, range.slice(cursor, existing.start_page - cursor)));
            }
            cursor = existing.next_page();
            if cursor >= end {
                break;
            }
        }

        if cursor < end {
            pieces.push((tail_slot, range.slice(cursor, end - cursor)));
        }
        if pieces.is_empty() {
            return Err(ConfigError::NoFreePages {
                start_page: range.start_page,
                num_pages: range.num_pages,
            });
        }
        Ok(pieces)
    }
}

fn prepare_rom(data: &[u8], num_pages: u32, padding: RomPadding) -> Result<Rc<[u8]>, ConfigError> {
    let page = PAGE_BYTES as usize;
    let capacity = num_pages as usize * page;
    if data.len() > capacity {
        return Err(ConfigError::RomTooLarge {
            len: data.len(),
            num_pages,
        });
    }

    let remainder = data.len() % page;
    if remainder == 0 {
        return Ok(Rc::from(data));
    }
    let fill = match padding {
        RomPadding::None => return Err(ConfigError::RomNeedsPadding { len: data.len() }),
        RomPadding::Zero => 0,
        RomPadding::Fill(byte) => byte,
    };
    let mut padded = Vec::with_capacity(data.len() + page - remainder);
    padded.extend_from_slice(data);
    padded.resize(data.len() + page - remainder, fill);
    Ok(Rc::from(padded))
}
