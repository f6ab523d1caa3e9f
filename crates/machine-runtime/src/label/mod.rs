//! Address range annotations used by trace and disassembly output.

use std::fmt;
use std::rc::Rc;

use crate::LabelError;

/// Page-indexed label store.
pub mod store;

pub use store::LabelStore;

/// Annotation text of a label.
#[derive(Clone)]
pub enum LabelData {
    /// Fixed text.
    Literal(String),
    /// Text computed from the queried address.
    Computed(Rc<dyn Fn(u32) -> String>),
}

impl LabelData {
    /// Creates a computed payload from a closure.
    pub fn computed(f: impl Fn(u32) -> String + 'static) -> Self {
        Self::Computed(Rc::new(f))
    }

    /// Renders the text for a query at `addr`.
    #[must_use]
    pub fn text(&self, addr: u32) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Computed(f) => f(addr),
        }
    }
}

impl From<&str> for LabelData {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for LabelData {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl PartialEq for LabelData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Computed(a), Self::Computed(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for LabelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// One annotated address range.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    id: u64,
    addr: u32,
    size: u32,
    data: LabelData,
}

/// Shared read-only handle to a stored label.
pub type LabelRef = Rc<Label>;

impl Label {
    /// Validates the range and creates a label.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::ZeroSize`] or [`LabelError::AddressOverflow`].
    pub(crate) fn new(id: u64, addr: u32, size: u32, data: LabelData) -> Result<Self, LabelError> {
        if size == 0 {
            return Err(LabelError::ZeroSize { addr });
        }
        if addr.checked_add(size - 1).is_none() {
            return Err(LabelError::AddressOverflow { addr, size });
        }
        Ok(Self {
            id,
            addr,
            size,
            data,
        })
    }

    /// Store-assigned identity.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// First covered address.
    #[must_use]
    pub const fn addr(&self) -> u32 {
        self.addr
    }

    /// Number of covered bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Last covered address (inclusive).
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.addr + (self.size - 1)
    }

    /// Annotation payload.
    #[must_use]
    pub const fn data(&self) -> &LabelData {
        &self.data
    }

    /// Returns `true` when `addr` lies inside the label.
    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        self.addr <= addr && addr <= self.end()
    }

    /// Returns `true` when the label overlaps the inclusive range `[addr, end]`.
    #[must_use]
    pub const fn intersects(&self, addr: u32, end: u32) -> bool {
        self.addr <= end && addr <= self.end()
    }
}

/// Query and mutation contract shared by the real and the disabled label store.
pub trait LabelIndex: fmt::Debug {
    /// Number of stored labels.
    fn num_labels(&self) -> usize;

    /// Number of labels touching `page`.
    fn num_page_labels(&self, page: u32) -> usize;

    /// All labels, ascending by start address.
    fn all_labels(&self) -> Vec<LabelRef>;

    /// Labels touching `page`, ascending by start address.
    fn page_labels(&self, page: u32) -> &[LabelRef];

    /// Adds a label covering `[addr, addr + size)`.
    ///
    /// # Errors
    ///
    /// Rejects empty, wrapping and out-of-range labels.
    fn add(&mut self, addr: u32, size: u32, data: LabelData) -> Result<LabelRef, LabelError>;

    /// Removes `label`; returns `false` when it was not stored.
    fn remove(&mut self, label: &Label) -> bool;

    /// Removes every label overlapping `[addr, addr + size)` and returns how many went.
    fn remove_labels_inside(&mut self, addr: u32, size: u32) -> usize;

    /// First label, ascending by start address, covering `addr`.
    fn find(&self, addr: u32) -> Option<LabelRef>;

    /// Labels overlapping `[addr, addr + size)` ascending by start address, `None` if empty.
    fn find_intersecting(&self, addr: u32, size: u32) -> Option<Vec<LabelRef>>;
}

/// Label store used when labels are disabled.
///
/// Queries answer empty, mutations are dropped. `add` still validates the
/// range and returns a detached handle so callers need not branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLabelStore;

impl LabelIndex for NullLabelStore {
    fn num_labels(&self) -> usize {
        0
    }

    fn num_page_labels(&self, _page: u32) -> usize {
        0
    }

    fn all_labels(&self) -> Vec<LabelRef> {
        Vec::new()
    }

    fn page_labels(&self, _page: u32) -> &[LabelRef] {
        &[]
    }

    fn add(&mut self, addr: u32, size: u32, data: LabelData) -> Result<LabelRef, LabelError> {
        Label::new(0, addr, size, data).map(Rc::new)
    }

    fn remove(&mut self, _label: &Label) -> bool {
        false
    }

    fn remove_labels_inside(&mut self, _addr: u32, _size: u32) -> usize {
        0
    }

    fn find(&self, _addr: u32) -> Option<LabelRef> {
        None
    }

    fn find_intersecting(&self, _addr: u32, _size: u32) -> Option<Vec<LabelRef>> {
        None
    }
}

/// Renders `label` for a trace line at `addr`: the text, plus `+offset` in hex
/// when `addr` lies past the label start.
#[must_use]
pub fn format_label(label: &Label, addr: u32) -> String {
    let mut text = label.data.text(addr);
    if addr > label.addr {
        text.push_str(&format!("+{:x}", addr - label.addr));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{format_label, Label, LabelData, LabelIndex, NullLabelStore};
    use crate::LabelError;

    #[test]
    fn label_ranges_are_validated() {
        assert_eq!(
            Label::new(1, 0x10, 0, "x".into()),
            Err(LabelError::ZeroSize { addr: 0x10 })
        );
        assert_eq!(
            Label::new(1, u32::MAX, 2, "x".into()),
            Err(LabelError::AddressOverflow {
                addr: u32::MAX,
                size: 2
            })
        );
        let last = Label::new(1, u32::MAX, 1, "x".into()).expect("single byte at the top");
        assert_eq!(last.end(), u32::MAX);
    }

    #[test]
    fn intersection_is_inclusive_on_both_ends() {
        let label = Label::new(1, 0x100, 0x10, "x".into()).expect("valid");
        assert!(label.contains(0x100) && label.contains(0x10F));
        assert!(!label.contains(0x110));
        assert!(label.intersects(0x10F, 0x200));
        assert!(!label.intersects(0x110, 0x200));
        assert!(label.intersects(0, 0x100));
    }

    #[test]
    fn format_appends_hex_offset() {
        let label = Label::new(1, 0x1000, 0x40, "main".into()).expect("valid");
        assert_eq!(format_label(&label, 0x1000), "main");
        assert_eq!(format_label(&label, 0x101A), "main+1a");

        let computed = Label::new(
            2,
            0x2000,
            4,
            LabelData::computed(|addr| format!("dyn_{addr:x}")),
        )
        .expect("valid");
        assert_eq!(format_label(&computed, 0x2002), "dyn_2002+2");
    }

    #[test]
    fn null_store_ignores_everything() {
        let mut store = NullLabelStore;
        let label = store.add(0x100, 4, "x".into()).expect("valid range");
        assert_eq!(label.addr(), 0x100);
        assert_eq!(store.num_labels(), 0);
        assert!(store.find(0x100).is_none());
        assert!(store.find_intersecting(0, 0x1000).is_none());
        assert!(!store.remove(&label));
        assert_eq!(store.remove_labels_inside(0, 0x1000), 0);
        assert!(store.page_labels(0).is_empty());
        assert!(store.all_labels().is_empty());
        assert_eq!(store.num_page_labels(0), 0);
        assert!(store.add(0, 0, "x".into()).is_err());
    }
}
