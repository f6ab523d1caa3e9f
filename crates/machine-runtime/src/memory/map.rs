//! Memory range kinds, payloads and the realized, immutable layout.

use std::fmt;
use std::rc::Rc;

use crate::memory::{page_start, PAGE_BYTES};
use crate::{CallbackError, MemAccess};

/// Host read accessor for special (I/O) regions; returns the value read.
pub type SpecialRead = Rc<dyn Fn(&MemAccess) -> Result<u32, CallbackError>>;
/// Host write accessor for special (I/O) regions; receives the value written.
pub type SpecialWrite = Rc<dyn Fn(&MemAccess) -> Result<(), CallbackError>>;

/// Classification of a page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RangeKind {
    /// Read/write backing store.
    Ram,
    /// Read-only backing store, optionally preloaded.
    Rom,
    /// Accesses are forwarded to host accessors.
    Special,
    /// Reads answer a constant fill word, writes are dropped.
    Empty,
    /// Aliases the backing store of another page.
    Mirror,
    /// Kept free on purpose; accesses trap.
    Reserve,
    /// Gap between configured ranges; accesses trap.
    Unallocated,
}

impl RangeKind {
    /// Returns the one-character glyph used by page map strings.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Ram => 'a',
            Self::Rom => 'o',
            Self::Special => 'S',
            Self::Empty => 'E',
            Self::Mirror => 'M',
            Self::Reserve => 'X',
            Self::Unallocated => '_',
        }
    }

    /// Returns `true` for kinds that get realized into the engine.
    #[must_use]
    pub const fn is_mapped(self) -> bool {
        !matches!(self, Self::Reserve | Self::Unallocated)
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ram => "RAM",
            Self::Rom => "ROM",
            Self::Special => "SPECIAL",
            Self::Empty => "EMPTY",
            Self::Mirror => "MIRROR",
            Self::Reserve => "RESERVE",
            Self::Unallocated => "UNALLOCATED",
        };
        f.write_str(name)
    }
}

/// Read/write accessor pair bound to a special region.
///
/// A missing accessor makes the corresponding access direction a no-op
/// (reads answer zero).
#[derive(Clone, Default)]
pub struct SpecialHandlers {
    /// Read accessor.
    pub read: Option<SpecialRead>,
    /// Write accessor.
    pub write: Option<SpecialWrite>,
}

impl SpecialHandlers {
    /// Creates a handler pair from two closures.
    pub fn new<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&MemAccess) -> Result<u32, CallbackError> + 'static,
        W: Fn(&MemAccess) -> Result<(), CallbackError> + 'static,
    {
        Self {
            read: Some(Rc::new(read)),
            write: Some(Rc::new(write)),
        }
    }

    /// Creates a read-only handler pair.
    pub fn read_only<R>(read: R) -> Self
    where
        R: Fn(&MemAccess) -> Result<u32, CallbackError> + 'static,
    {
        Self {
            read: Some(Rc::new(read)),
            write: None,
        }
    }
}

impl PartialEq for SpecialHandlers {
    fn eq(&self, other: &Self) -> bool {
        let read_eq = match (&self.read, &other.read) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        let write_eq = match (&self.write, &other.write) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        read_eq && write_eq
    }
}

impl fmt::Debug for SpecialHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialHandlers")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Kind-dependent data attached to a range.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RangePayload {
    /// No payload (RAM, RESERVE, ROM without content).
    #[default]
    None,
    /// Initial ROM content, always a whole number of pages.
    Rom(Rc<[u8]>),
    /// Host accessor pair.
    Special(SpecialHandlers),
    /// Fill word answered by reads.
    Empty(u32),
    /// Page whose backing store is aliased.
    Mirror(u32),
}

impl RangePayload {
    /// Returns `true` when this payload may be attached to a `kind` range.
    #[must_use]
    pub const fn fits(&self, kind: RangeKind) -> bool {
        matches!(
            (kind, self),
            (RangeKind::Ram | RangeKind::Reserve | RangeKind::Unallocated, Self::None)
                | (RangeKind::Rom, Self::None | Self::Rom(_))
                | (RangeKind::Special, Self::Special(_))
                | (RangeKind::Empty, Self::Empty(_))
                | (RangeKind::Mirror, Self::Mirror(_))
        )
    }
}

/// One contiguous, page-aligned region of the address space.
#[derive(Debug, Clone)]
pub struct MemoryRange {
    /// First page covered.
    pub start_page: u32,
    /// Number of pages covered.
    pub num_pages: u32,
    /// Region classification.
    pub kind: RangeKind,
    /// Kind-dependent payload.
    pub payload: RangePayload,
    /// Whether A-line traps may fire from code in this range.
    pub traps: bool,
    /// Optional descriptive name, ignored by equality.
    pub name: Option<String>,
}

impl MemoryRange {
    /// Creates a range without payload.
    #[must_use]
    pub const fn new(start_page: u32, num_pages: u32, kind: RangeKind) -> Self {
        Self {
            start_page,
            num_pages,
            kind,
            payload: RangePayload::None,
            traps: true,
            name: None,
        }
    }

    /// Returns the first page after this range.
    #[must_use]
    pub const fn next_page(&self) -> u32 {
        self.start_page.saturating_add(self.num_pages)
    }

    /// Returns the first byte address of this range.
    #[must_use]
    pub const fn start_addr(&self) -> u64 {
        page_start(self.start_page)
    }

    /// Returns `true` when `page` lies inside this range.
    #[must_use]
    pub const fn contains_page(&self, page: u32) -> bool {
        page >= self.start_page && page < self.next_page()
    }

    /// Carves the sub-range `[start_page, start_page + num_pages)` out of this range.
    ///
    /// ROM content is sliced to match the new start; mirror bases shift along.
    #[must_use]
    pub fn slice(&self, start_page: u32, num_pages: u32) -> Self {
        let skipped = start_page - self.start_page;
        let payload = match &self.payload {
            RangePayload::Rom(data) => {
                let offset = skipped as usize * PAGE_BYTES as usize;
                let end = offset + num_pages as usize * PAGE_BYTES as usize;
                RangePayload::Rom(Rc::from(&data[offset.min(data.len())..end.min(data.len())]))
            }
            RangePayload::Mirror(base) => RangePayload::Mirror(base.saturating_add(skipped)),
            other => other.clone(),
        };
        Self {
            start_page,
            num_pages,
            kind: self.kind,
            payload,
            traps: self.traps,
            name: self.name.clone(),
        }
    }
}

impl PartialEq for MemoryRange {
    fn eq(&self, other: &Self) -> bool {
        self.start_page == other.start_page
            && self.num_pages == other.num_pages
            && self.kind == other.kind
            && self.payload == other.payload
            && self.traps == other.traps
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages {:#06x}+{:#x} @{:#010x}",
            self.kind,
            self.start_page,
            self.num_pages,
            self.start_addr()
        )?;
        if let Some(name) = &self.name {
            write!(f, " '{name}'")?;
        }
        Ok(())
    }
}

/// Renders a sorted range list as one glyph per page, gaps as `_`.
#[must_use]
pub fn page_map_string(ranges: &[MemoryRange]) -> String {
    let mut map = String::new();
    let mut cursor = 0;
    for range in ranges {
        let gap = range.start_page.saturating_sub(cursor);
        map.extend(std::iter::repeat(RangeKind::Unallocated.glyph()).take(gap as usize));
        map.extend(std::iter::repeat(range.kind.glyph()).take(range.num_pages as usize));
        cursor = range.next_page();
    }
    map
}

/// Validated, immutable layout ready to be realized into an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryLayout {
    ranges: Vec<MemoryRange>,
}

impl MemoryLayout {
    pub(crate) const fn from_checked(ranges: Vec<MemoryRange>) -> Self {
        Self { ranges }
    }

    /// Returns ranges in ascending page order.
    #[must_use]
    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }

    /// Returns the number of pages spanned, up to the end of the last range.
    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.ranges.last().map_or(0, MemoryRange::next_page)
    }

    /// Returns the range covering `page`, if any.
    #[must_use]
    pub fn range_for_page(&self, page: u32) -> Option<&MemoryRange> {
        let index = self.ranges.partition_point(|r| r.next_page() <= page);
        self.ranges.get(index).filter(|r| r.contains_page(page))
    }

    /// Returns the kind of `page`, [`RangeKind::Unallocated`] for gaps.
    #[must_use]
    pub fn kind_at(&self, page: u32) -> RangeKind {
        self.range_for_page(page)
            .map_or(RangeKind::Unallocated, |r| r.kind)
    }

    /// Renders the layout as one glyph per page.
    #[must_use]
    pub fn page_map(&self) -> String {
        page_map_string(&self.ranges)
    }
}
