//! Label store queries checked against a flat reference list.

use env_logger as _;
use log as _;
use machine_runtime::{
    format_label, LabelData, LabelError, LabelIndex, LabelRef, LabelStore, NullLabelStore,
    PAGE_BYTES,
};
use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const PAGES: u32 = 4;

fn label_strategy() -> impl Strategy<Value = (u32, u32)> {
    (0..PAGES * PAGE_BYTES - 1).prop_flat_map(|addr| {
        let room = PAGES * PAGE_BYTES - addr;
        (Just(addr), 1..room.min(3 * PAGE_BYTES / 2))
    })
}

fn ids(labels: &[LabelRef]) -> Vec<u64> {
    labels.iter().map(|l| l.id()).collect()
}

fn model_sorted(model: &[LabelRef]) -> Vec<LabelRef> {
    let mut sorted = model.to_vec();
    sorted.sort_by_key(|l| (l.addr(), l.id()));
    sorted
}

#[test]
fn labels_spanning_pages_are_listed_on_each_page() {
    let mut store = LabelStore::new(PAGES);
    let wide = store
        .add(PAGE_BYTES - 4, PAGE_BYTES + 8, "wide".into())
        .expect("fits");
    let small = store.add(PAGE_BYTES + 16, 4, "small".into()).expect("fits");

    assert_eq!(store.num_labels(), 2);
    assert_eq!(store.num_page_labels(0), 1);
    assert_eq!(store.num_page_labels(1), 2);
    assert_eq!(store.num_page_labels(2), 1);
    assert_eq!(store.num_populated_pages(), 3);

    let hits = store
        .find_intersecting(PAGE_BYTES - 8, 2 * PAGE_BYTES)
        .expect("overlaps both");
    assert_eq!(ids(&hits), vec![wide.id(), small.id()]);

    assert!(store.remove(&wide));
    assert!(!store.remove(&wide));
    assert_eq!(store.num_page_labels(0), 0);
    assert_eq!(store.num_populated_pages(), 1);
}

#[test]
fn out_of_range_and_degenerate_labels_are_rejected() {
    let mut store = LabelStore::new(1);
    assert_eq!(
        store.add(0x10, 0, "x".into()).map(|_| ()),
        Err(LabelError::ZeroSize { addr: 0x10 })
    );
    assert_eq!(
        store.add(u32::MAX, 2, "x".into()).map(|_| ()),
        Err(LabelError::AddressOverflow {
            addr: u32::MAX,
            size: 2
        })
    );
    assert_eq!(
        store.add(PAGE_BYTES - 2, 4, "x".into()).map(|_| ()),
        Err(LabelError::OutOfRange {
            addr: PAGE_BYTES - 2,
            size: 4,
            num_pages: 1
        })
    );
    assert_eq!(store.num_labels(), 0);
}

#[test]
fn computed_labels_render_with_offsets() {
    let mut store = LabelStore::new(1);
    store
        .add(0x100, 0x20, LabelData::computed(|addr| format!("fn_{addr:x}")))
        .expect("fits");
    let label = store.find(0x108).expect("covered");
    assert_eq!(format_label(&label, 0x108), "fn_108+8");
    assert_eq!(format_label(&label, 0x100), "fn_100");
    assert!(store.find(0x120).is_none());
}

#[test]
fn disabled_store_validates_but_keeps_nothing() {
    let mut store = NullLabelStore;
    let label = store.add(0x40, 8, "detached".into()).expect("valid range");
    assert_eq!(label.id(), 0);
    assert!(store.add(0x40, 0, "empty".into()).is_err());
    assert_eq!(store.num_labels(), 0);
    assert!(store.find(0x40).is_none());
    assert!(store.find_intersecting(0, 0x100).is_none());
    assert!(!store.remove(&label));
}

#[test]
fn dense_store_stays_consistent_under_churn() {
    let mut store = LabelStore::new(PAGES);
    let mut kept = Vec::new();
    for i in 0..2_000u32 {
        let addr = (i * 97) % (PAGES * PAGE_BYTES - 64);
        let label = store.add(addr, 1 + i % 48, "l".into()).expect("fits");
        if i % 3 == 0 {
            assert!(store.remove(&label));
        } else {
            kept.push(label);
        }
    }
    assert_eq!(store.num_labels(), kept.len());
    assert_eq!(store.all_labels().len(), kept.len());

    let removed = store.remove_labels_inside(0, PAGES * PAGE_BYTES);
    assert_eq!(removed, kept.len());
    assert_eq!(store.num_labels(), 0);
    assert_eq!(store.num_populated_pages(), 0);
}

proptest! {
    #[test]
    fn queries_match_a_flat_model(
        labels in prop::collection::vec(label_strategy(), 1..32),
        probes in prop::collection::vec((0..PAGES * PAGE_BYTES, 1u32..0x3_0000), 1..16),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let mut store = LabelStore::new(PAGES);
        let mut model: Vec<LabelRef> = Vec::new();
        for (addr, size) in labels {
            model.push(store.add(addr, size, "m".into()).expect("strategy stays in range"));
        }
        for index in removals {
            if model.is_empty() {
                break;
            }
            let victim = model.remove(index.index(model.len()));
            prop_assert!(store.remove(&victim));
        }

        prop_assert_eq!(store.num_labels(), model.len());
        prop_assert_eq!(ids(&store.all_labels()), ids(&model_sorted(&model)));

        for page in 0..PAGES {
            let first = page * PAGE_BYTES;
            let expected: Vec<u64> = model_sorted(&model)
                .into_iter()
                .filter(|l| l.intersects(first, first + PAGE_BYTES - 1))
                .map(|l| l.id())
                .collect();
            prop_assert_eq!(ids(store.page_labels(page)), expected);
        }

        for (addr, size) in probes {
            let found = store.find(addr).map(|l| l.id());
            let expected = model_sorted(&model)
                .into_iter()
                .find(|l| l.contains(addr))
                .map(|l| l.id());
            prop_assert_eq!(found, expected);

            let end = addr.saturating_add(size - 1);
            let hits = store.find_intersecting(addr, size).map(|v| ids(&v));
            let expected: Vec<u64> = model_sorted(&model)
                .into_iter()
                .filter(|l| l.intersects(addr, end))
                .map(|l| l.id())
                .collect();
            prop_assert_eq!(hits, (!expected.is_empty()).then_some(expected));
        }
    }
}
