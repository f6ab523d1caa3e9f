use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::rc::Rc;

use crate::label::{Label, LabelData, LabelIndex, LabelRef};
use crate::memory::page_of;
use crate::LabelError;

/// Label index keyed by page.
///
/// Every label is listed on each page it touches, and each page list stays
/// sorted by start address. Pages without labels have no entry at all, so
/// lookups only ever visit populated pages.
#[derive(Debug, Clone)]
pub struct LabelStore {
    num_pages: u32,
    pages: BTreeMap<u32, Vec<LabelRef>>,
    total: usize,
    next_id: u64,
}

impl LabelStore {
    /// Creates an empty store covering `num_pages` pages.
    #[must_use]
    pub const fn new(num_pages: u32) -> Self {
        Self {
            num_pages,
            pages: BTreeMap::new(),
            total: 0,
            next_id: 1,
        }
    }

    /// Returns the number of pages covered.
    #[must_use]
    pub const fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Returns the number of pages that currently hold labels.
    #[must_use]
    pub fn num_populated_pages(&self) -> usize {
        self.pages.len()
    }

    fn span(label: &Label) -> RangeInclusive<u32> {
        page_of(label.addr())..=page_of(label.end())
    }
}

impl LabelIndex for LabelStore {
    fn num_labels(&self) -> usize {
        self.total
    }

    fn num_page_labels(&self, page: u32) -> usize {
        self.pages.get(&page).map_or(0, Vec::len)
    }

    fn all_labels(&self) -> Vec<LabelRef> {
        let mut labels = Vec::with_capacity(self.total);
        for (page, list) in &self.pages {
            labels.extend(
                list.iter()
                    .filter(|label| page_of(label.addr()) == *page)
                    .cloned(),
            );
        }
        labels
    }

    fn page_labels(&self, page: u32) -> &[LabelRef] {
        self.pages.get(&page).map_or(&[], Vec::as_slice)
    }

    fn add(&mut self, addr: u32, size: u32, data: LabelData) -> Result<LabelRef, LabelError> {
        let label = Label::new(self.next_id, addr, size, data)?;
        if page_of(label.end()) >= self.num_pages {
            return Err(LabelError::OutOfRange {
                addr,
                size,
                num_pages: self.num_pages,
            });
        }
        self.next_id += 1;

        let label = Rc::new(label);
        for page in Self::span(&label) {
            let list = self.pages.entry(page).or_default();
            let slot = list.partition_point(|other| other.addr() <= addr);
            list.insert(slot, Rc::clone(&label));
        }
        self.total += 1;
        Ok(label)
    }

    fn remove(&mut self, label: &Label) -> bool {
        let mut found = false;
        for page in Self::span(label) {
            let Entry::Occupied(mut entry) = self.pages.entry(page) else {
                continue;
            };
            if let Some(index) = entry.get().iter().position(|l| l.id() == label.id()) {
                entry.get_mut().remove(index);
                found = true;
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
        if found {
            self.total -= 1;
        }
        found
    }

    fn remove_labels_inside(&mut self, addr: u32, size: u32) -> usize {
        let Some(victims) = self.find_intersecting(addr, size) else {
            return 0;
        };
        victims
            .iter()
            .filter(|label| self.remove(label))
            .count()
    }

    fn find(&self, addr: u32) -> Option<LabelRef> {
        self.page_labels(page_of(addr))
            .iter()
            .take_while(|label| label.addr() <= addr)
            .find(|label| label.contains(addr))
            .cloned()
    }

    fn find_intersecting(&self, addr: u32, size: u32) -> Option<Vec<LabelRef>> {
        if size == 0 {
            return None;
        }
        let end = addr.saturating_add(size - 1);
        let first_page = page_of(addr);

        let mut found = Vec::new();
        for (page, list) in self.pages.range(first_page..=page_of(end)) {
            // A label spanning several pages is reported from the first page it
            // shares with the query only.
            found.extend(
                list.iter()
                    .take_while(|label| label.addr() <= end)
                    .filter(|label| page_of(label.addr()).max(first_page) == *page)
                    .filter(|label| label.intersects(addr, end))
                    .cloned(),
            );
        }
        (!found.is_empty()).then_some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::LabelStore;
    use crate::label::{LabelData, LabelIndex};
    use crate::memory::PAGE_BYTES;
    use crate::LabelError;

    fn addrs(labels: Option<Vec<crate::LabelRef>>) -> Vec<u32> {
        labels
            .unwrap_or_default()
            .iter()
            .map(|label| label.addr())
            .collect()
    }

    #[test]
    fn add_find_remove_roundtrip() {
        let mut store = LabelStore::new(4);
        let data = LabelData::from("entry");
        let label = store.add(0x1000, 0x20, data.clone()).expect("fits");

        let found = store.find(0x1010).expect("covered");
        assert_eq!(found.addr(), 0x1000);
        assert_eq!(found.size(), 0x20);
        assert_eq!(found.data(), &data);
        assert_eq!(store.num_labels(), 1);

        assert!(store.remove(&label));
        assert!(store.find(0x1010).is_none());
        assert_eq!(store.num_labels(), 0);
        assert!(!store.remove(&label));
    }

    #[test]
    fn multi_page_labels_are_listed_on_every_page_and_pruned_on_removal() {
        let mut store = LabelStore::new(4);
        let label = store
            .add(PAGE_BYTES - 4, PAGE_BYTES + 8, "wide".into())
            .expect("fits");

        assert_eq!(store.num_page_labels(0), 1);
        assert_eq!(store.num_page_labels(1), 1);
        assert_eq!(store.num_page_labels(2), 1);
        assert_eq!(store.num_page_labels(3), 0);
        assert_eq!(store.all_labels().len(), 1);
        assert_eq!(store.num_populated_pages(), 3);

        assert!(store.remove(&label));
        assert_eq!(store.num_populated_pages(), 0);
        assert!(store.page_labels(1).is_empty());
    }

    #[test]
    fn labels_past_the_last_page_are_rejected() {
        let mut store = LabelStore::new(1);
        assert_eq!(
            store.add(PAGE_BYTES - 2, 4, "x".into()).unwrap_err(),
            LabelError::OutOfRange {
                addr: PAGE_BYTES - 2,
                size: 4,
                num_pages: 1
            }
        );
        assert_eq!(store.num_labels(), 0);
        assert_eq!(store.num_pages(), 1);
    }

    #[test]
    fn find_returns_the_lowest_covering_label() {
        let mut store = LabelStore::new(1);
        store.add(0x100, 0x100, "outer".into()).expect("fits");
        store.add(0x140, 0x10, "inner".into()).expect("fits");

        let hit = store.find(0x144).expect("covered");
        assert_eq!(hit.data(), &LabelData::from("outer"));
        assert!(store.find(0x200).is_none());
    }

    #[test]
    fn intersecting_labels_come_back_sorted_without_duplicates() {
        let mut store = LabelStore::new(4);
        store.add(2 * PAGE_BYTES + 8, 4, "c".into()).expect("fits");
        store.add(PAGE_BYTES - 4, PAGE_BYTES, "b".into()).expect("fits");
        store.add(0x10, 4, "a".into()).expect("fits");

        assert_eq!(
            addrs(store.find_intersecting(0, 3 * PAGE_BYTES)),
            vec![0x10, PAGE_BYTES - 4, 2 * PAGE_BYTES + 8]
        );
        // query starting after the wide label's first page still sees it once
        assert_eq!(
            addrs(store.find_intersecting(PAGE_BYTES + 0x10, PAGE_BYTES)),
            vec![PAGE_BYTES - 4, 2 * PAGE_BYTES + 8]
        );
        assert!(store.find_intersecting(0x20, 0x10).is_none());
        assert!(store.find_intersecting(0x10, 0).is_none());
    }

    #[test]
    fn remove_inside_drops_every_overlapping_label() {
        let mut store = LabelStore::new(2);
        store.add(0x10, 0x10, "a".into()).expect("fits");
        store.add(0x18, 0x10, "b".into()).expect("fits");
        store.add(0x100, 0x10, "c".into()).expect("fits");

        assert_eq!(store.remove_labels_inside(0x1C, 0x10), 2);
        assert_eq!(store.num_labels(), 1);
        assert_eq!(addrs(store.find_intersecting(0, 0x1000)), vec![0x100]);
        assert_eq!(store.remove_labels_inside(0x1000, 0x10), 0);
    }
}
