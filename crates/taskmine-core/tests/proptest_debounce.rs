//! Property-based tests for the keyed trailing-edge debouncer.
//!
//! Each case runs on a paused current-thread runtime, so timer arithmetic
//! is exact and cases take no wall-clock time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;

use taskmine_core::debounce::{Debouncer, SourceKey};

const WINDOW_MS: u64 = 300;

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

/// Gap before a call: either well inside the window or well past it.
fn arb_gap() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..WINDOW_MS - 10, WINDOW_MS + 10..WINDOW_MS * 3]
}

fn arb_field() -> impl Strategy<Value = String> {
    "/html\\[1\\]/body\\[1\\]/input\\[[1-4]\\]"
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

type Fired = Arc<Mutex<Vec<(SourceKey, usize)>>>;

fn recorder() -> (Debouncer<SourceKey, (SourceKey, usize)>, Fired) {
    let fired: Fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let debouncer = Debouncer::new(Duration::from_millis(WINDOW_MS), move |v| {
        sink.lock().unwrap().push(v);
    });
    (debouncer, fired)
}

/// Indices that survive: the last call before every long gap, plus the last.
fn expected_survivors(gaps: &[u64]) -> Vec<usize> {
    let mut survivors: Vec<usize> = gaps
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, gap)| **gap > WINDOW_MS)
        .map(|(i, _)| i - 1)
        .collect();
    survivors.push(gaps.len() - 1);
    survivors
}

// ────────────────────────────────────────────────────────────────────
// Single source
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn burst_within_window_fires_once_with_last_value(n in 1usize..20, gap in 0u64..WINDOW_MS - 10) {
        let rt = paused_runtime();
        let fired = rt.block_on(async {
            let (debouncer, fired) = recorder();
            for i in 0..n {
                debouncer.call(SourceKey::Scroll, (SourceKey::Scroll, i));
                tokio::time::sleep(Duration::from_millis(gap)).await;
            }
            tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1)).await;
            let stats = debouncer.stats();
            assert_eq!(stats.pending, 0);
            let fired = fired.lock().unwrap().clone();
            fired
        });
        prop_assert_eq!(fired, vec![(SourceKey::Scroll, n - 1)]);
    }

    #[test]
    fn quiet_gaps_split_bursts(gaps in prop::collection::vec(arb_gap(), 1..24)) {
        let rt = paused_runtime();
        let fired = rt.block_on(async {
            let (debouncer, fired) = recorder();
            for (i, gap) in gaps.iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(*gap)).await;
                debouncer.call(SourceKey::Scroll, (SourceKey::Scroll, i));
            }
            tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1)).await;
            let fired = fired.lock().unwrap().clone();
            fired
        });
        let indices: Vec<usize> = fired.into_iter().map(|(_, i)| i).collect();
        prop_assert_eq!(indices, expected_survivors(&gaps));
    }
}

// ────────────────────────────────────────────────────────────────────
// Independent sources
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn each_source_fires_its_own_last_value(
        calls in prop::collection::vec((arb_field(), any::<bool>()), 1..40),
    ) {
        let rt = paused_runtime();
        let fired = rt.block_on(async {
            let (debouncer, fired) = recorder();
            for (i, (field, scroll)) in calls.iter().enumerate() {
                let key = if *scroll {
                    SourceKey::Scroll
                } else {
                    SourceKey::Field(field.clone())
                };
                debouncer.call(key.clone(), (key, i));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1)).await;
            let fired = fired.lock().unwrap().clone();
            fired
        });

        let mut expected = std::collections::HashMap::new();
        for (i, (field, scroll)) in calls.iter().enumerate() {
            let key = if *scroll {
                SourceKey::Scroll
            } else {
                SourceKey::Field(field.clone())
            };
            expected.insert(key, i);
        }
        prop_assert_eq!(fired.len(), expected.len());
        for (key, i) in fired {
            prop_assert_eq!(expected.get(&key), Some(&i));
        }
    }
}
