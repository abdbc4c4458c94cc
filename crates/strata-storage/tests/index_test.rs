//! Index integration tests
//!
//! End-to-end checks for both index variants through the public API:
//! - Point lookups, updates and range queries on fixed key sets
//! - Randomized insert/delete workloads checked against a `BTreeMap` model
//! - Persistence across close and reopen
//! - Leaf chain ordering and cache eviction under a small cache
//!
//! Run with `RUST_LOG=debug` to see splits, merges and root changes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Instant;
use tempfile::tempdir;

use strata_common::{IndexKind, StoreConfig};
use strata_storage::{open_index, BPlusTree, BTree, Index, NodeBehavior, RangeCursor, Tree};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn value_for(key: i64, len: usize) -> Vec<u8> {
    let mut v = format!("value-{}:", key).into_bytes();
    v.resize(len, b'~');
    v
}

/// Drains a cursor into keys, failing the test on a scan error.
fn collect_keys(mut cursor: Box<dyn RangeCursor + '_>) -> Vec<i64> {
    let mut keys = Vec::new();
    while cursor.advance() {
        keys.push(cursor.key().unwrap());
    }
    assert!(cursor.error().is_none(), "scan error: {:?}", cursor.error());
    cursor.close().unwrap();
    keys
}

// =============================================================================
// Fixed Scenarios
// =============================================================================

const SCENARIO_KEYS: [i64; 7] = [100, 50, 150, 25, 75, 125, 175];

fn run_scenario(index: &mut dyn Index) {
    for &k in &SCENARIO_KEYS {
        index.insert(k, format!("v{}", k).as_bytes()).unwrap();
    }
    index.insert(75, b"updated-seventy-five").unwrap();

    assert_eq!(index.get(75).unwrap().unwrap(), &b"updated-seventy-five"[..]);
    assert_eq!(index.get(100).unwrap().unwrap(), &b"v100"[..]);
    assert_eq!(index.get(999).unwrap(), None);

    assert_eq!(collect_keys(index.range(25, 175).unwrap()).len(), 7);
    assert_eq!(
        collect_keys(index.range(60, 130).unwrap()),
        vec![75, 100, 125]
    );
    assert!(collect_keys(index.range(200, 300).unwrap()).is_empty());
    assert!(collect_keys(index.range(0, 10).unwrap()).is_empty());
    assert_eq!(collect_keys(index.range(50, 50).unwrap()), vec![50]);

    let mut cursor = index.range(75, 75).unwrap();
    assert!(cursor.advance());
    assert_eq!(cursor.value().unwrap(), &b"updated-seventy-five"[..]);
    assert!(!cursor.advance());
    cursor.close().unwrap();
}

/// Seven keys, one update, five ranges, for both variants.
#[test]
fn test_scenario_both_variants() {
    init_logging();
    let dir = tempdir().unwrap();
    for kind in [IndexKind::BTree, IndexKind::BPlusTree] {
        let mut index = open_index(kind, dir.path().join("scenario"), StoreConfig::default()).unwrap();
        run_scenario(index.as_mut());
        index.close().unwrap();
        println!("Scenario [{}]: PASSED", kind);
    }
}

/// Sequential keys 1000..1499, then a range running past the last key.
#[test]
fn test_range_past_last_key() {
    init_logging();
    let dir = tempdir().unwrap();
    for kind in [IndexKind::BTree, IndexKind::BPlusTree] {
        let mut index = open_index(kind, dir.path().join("seq"), StoreConfig::default()).unwrap();
        for k in 1000..1500 {
            index.insert(k, &value_for(k, 16)).unwrap();
        }
        let keys = collect_keys(index.range(1490, 1510).unwrap());
        assert_eq!(keys, (1490..1500).collect::<Vec<_>>());
        assert_eq!(keys.last(), Some(&1499));
        index.close().unwrap();
    }
}

// =============================================================================
// Randomized Workloads
// =============================================================================

const WORKLOAD_OPS: usize = 6000;
const KEY_SPACE: i64 = 1500;

fn run_workload<B: NodeBehavior>(tree: &mut Tree<B>, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: BTreeMap<i64, Vec<u8>> = BTreeMap::new();

    for op in 0..WORKLOAD_OPS {
        let key = rng.gen_range(0..KEY_SPACE);
        if rng.gen_bool(0.35) {
            let removed = tree.delete(key).unwrap();
            assert_eq!(removed, model.remove(&key).is_some(), "delete {}", key);
        } else {
            let len = rng.gen_range(0..=240);
            let value = value_for(key, len);
            tree.insert(key, &value).unwrap();
            model.insert(key, value);
        }

        if op % 1000 == 999 {
            let stats = tree.verify().unwrap();
            assert_eq!(stats.keys, model.len(), "key count after op {}", op);
        }
    }

    for key in 0..KEY_SPACE {
        assert_eq!(
            tree.get(key).unwrap().as_deref(),
            model.get(&key).map(|v| v.as_slice()),
            "get {}",
            key
        );
    }

    let scanned: Vec<(i64, Vec<u8>)> = tree
        .range(i64::MIN, i64::MAX)
        .unwrap()
        .map(|r| r.map(|(k, v)| (k, v.to_vec())))
        .collect::<Result<_, _>>()
        .unwrap();
    let expected: Vec<(i64, Vec<u8>)> = model.into_iter().collect();
    assert_eq!(scanned, expected);
}

/// Mixed inserts, updates and deletes against a model, B-tree.
#[test]
fn test_random_workload_btree() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(dir.path().join("rand.bt"), StoreConfig::default()).unwrap();
    run_workload(&mut tree, 0x5eed_0001);
    println!("Random workload [btree]: PASSED, height {}", tree.height().unwrap());
}

/// Mixed inserts, updates and deletes against a model, B+ tree.
#[test]
fn test_random_workload_bplustree() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("rand.bpt"), StoreConfig::default()).unwrap();
    run_workload(&mut tree, 0x5eed_0002);
    println!("Random workload [bplustree]: PASSED, height {}", tree.height().unwrap());
}

/// Random sub-ranges agree with the model.
#[test]
fn test_random_ranges_match_model() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut btree = BTree::open(dir.path().join("r.bt"), StoreConfig::default()).unwrap();
    let mut bplus = BPlusTree::open(dir.path().join("r.bpt"), StoreConfig::default()).unwrap();
    let mut model = BTreeMap::new();

    for _ in 0..3000 {
        let key = rng.gen_range(-5000..5000);
        let value = value_for(key, rng.gen_range(1..64));
        btree.insert(key, &value).unwrap();
        bplus.insert(key, &value).unwrap();
        model.insert(key, value);
    }

    for _ in 0..200 {
        let a = rng.gen_range(-6000..6000);
        let b = rng.gen_range(-6000..6000);
        let expected: Vec<i64> = if a <= b {
            model.range(a..=b).map(|(k, _)| *k).collect()
        } else {
            Vec::new()
        };
        let from_btree: Vec<i64> = btree.range(a, b).unwrap().map(|r| r.unwrap().0).collect();
        let from_bplus: Vec<i64> = bplus.range(a, b).unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(from_btree, expected, "btree [{}, {}]", a, b);
        assert_eq!(from_bplus, expected, "bplustree [{}, {}]", a, b);
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Data and shape survive close and reopen, including after deletes.
#[test]
fn test_reopen_preserves_contents() {
    init_logging();
    let dir = tempdir().unwrap();
    for kind in [IndexKind::BTree, IndexKind::BPlusTree] {
        let base = dir.path().join("persist");
        {
            let mut index = open_index(kind, &base, StoreConfig::default()).unwrap();
            for k in 0..2000 {
                index.insert(k, &value_for(k, 48)).unwrap();
            }
            for k in (0..2000).step_by(3) {
                index.delete(k).unwrap();
            }
            index.close().unwrap();
        }

        let index = open_index(kind, &base, StoreConfig::default()).unwrap();
        for k in 0..2000 {
            let got = index.get(k).unwrap();
            if k % 3 == 0 {
                assert_eq!(got, None, "[{}] key {} should be gone", kind, k);
            } else {
                assert_eq!(got.unwrap(), value_for(k, 48), "[{}] key {}", kind, k);
            }
        }
        let keys = collect_keys(index.range(0, 1999).unwrap());
        assert_eq!(keys.len(), 2000 - 667);
        index.close().unwrap();
    }
}

/// A tree dropped without close is still readable.
#[test]
fn test_drop_without_close() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dropped.bpt");
    {
        let mut tree = BPlusTree::open(&path, StoreConfig::default()).unwrap();
        for k in 0..500 {
            tree.insert(k, &value_for(k, 20)).unwrap();
        }
    }
    let tree = BPlusTree::open(&path, StoreConfig::default()).unwrap();
    assert_eq!(tree.verify().unwrap().keys, 500);
}

// =============================================================================
// Leaf Chain
// =============================================================================

/// Following next pointers visits every leaf once with ascending keys.
#[test]
fn test_leaf_chain_monotonic() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("chain.bpt"), StoreConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..4000 {
        let k = rng.gen_range(0..100_000);
        tree.insert(k, &value_for(k, 12)).unwrap();
    }

    let chain = tree.leaf_chain().unwrap();
    let stats = tree.verify().unwrap();
    assert_eq!(chain.len(), stats.leaf_pages);

    let mut last: Option<i64> = None;
    let mut seen = 0;
    for (k, _) in tree.range(i64::MIN, i64::MAX).unwrap().map(|r| r.unwrap()) {
        assert!(last.map_or(true, |l| l < k));
        last = Some(k);
        seen += 1;
    }
    assert_eq!(seen, stats.keys);
}

// =============================================================================
// Cache
// =============================================================================

/// A tiny cache still serves a large tree, evicting as it goes.
#[test]
fn test_small_cache_evicts() {
    init_logging();
    let dir = tempdir().unwrap();
    let config = StoreConfig::with_cache_blocks(4);
    let mut tree = BTree::open(dir.path().join("small.bt"), config).unwrap();
    for k in 0..3000 {
        tree.insert(k, &value_for(k, 32)).unwrap();
    }
    for k in (0..3000).rev() {
        assert_eq!(tree.get(k).unwrap().unwrap(), value_for(k, 32));
    }

    let stats = tree.store_stats();
    assert!(stats.cache.evictions > 0);
    assert!(stats.cache.misses > 0);
    assert!(stats.disk_reads > 0);
    println!(
        "Small cache: {} hits, {} misses, {} evictions over {} blocks",
        stats.cache.hits, stats.cache.misses, stats.cache.evictions, stats.block_count
    );
}

// =============================================================================
// Throughput (informational)
// =============================================================================

/// Logs insert and lookup rates. Never fails on timing.
#[test]
fn test_throughput_report() {
    const KEYS: i64 = 20_000;

    init_logging();
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("tp.bpt"), StoreConfig::default()).unwrap();

    let start = Instant::now();
    for k in 0..KEYS {
        tree.insert(k, &k.to_le_bytes()).unwrap();
    }
    let insert_secs = start.elapsed().as_secs_f64();

    let start = Instant::now();
    for k in 0..KEYS {
        assert!(tree.get(k).unwrap().is_some());
    }
    let lookup_secs = start.elapsed().as_secs_f64();

    println!(
        "Throughput: {:.0} inserts/sec, {:.0} lookups/sec, height {}",
        KEYS as f64 / insert_secs,
        KEYS as f64 / lookup_secs,
        tree.height().unwrap()
    );
}
