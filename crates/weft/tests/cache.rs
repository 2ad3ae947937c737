//! Integration tests for the shared template/fragment cache.
//!
//! The cache is process-wide state, so every test here serializes on one
//! lock, clears the cache, and restores the default watermarks when done.

use std::sync::{Mutex, MutexGuard};

use weft::{
    Processor, cache_highwatermark, cache_lowwatermark, cache_sizes, clear_cache, params,
    set_cache_highwatermark, set_cache_lowwatermark,
};

static LOCK: Mutex<()> = Mutex::new(());

struct CacheTest {
    _guard: MutexGuard<'static, ()>,
}

impl CacheTest {
    fn begin() -> CacheTest {
        let guard = LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_cache();
        CacheTest { _guard: guard }
    }
}

impl Drop for CacheTest {
    fn drop(&mut self) {
        set_cache_highwatermark(10_000);
        set_cache_lowwatermark(5_000);
        clear_cache();
    }
}

/// Build and evaluate a one-fragment template whose source and fragment are
/// both unique to `tag`.
fn evaluate_distinct(tag: &str) -> String {
    let processor = Processor::builder()
        .template(format!(r#"{tag}<:"{tag}"/>"#))
        .build();
    processor.evaluate(params! {}).expect("evaluation succeeds")
}

// =============================================================================
// Sizing and eviction
// =============================================================================

#[test]
fn watermark_trim_after_four_distinct_inserts() {
    let _t = CacheTest::begin();
    set_cache_lowwatermark(1);
    set_cache_highwatermark(3);
    for tag in ["w1", "w2", "w3", "w4"] {
        evaluate_distinct(tag);
    }
    // Reaching the high watermark trims to the low watermark, then one more
    // insert lands on top.
    assert_eq!(cache_sizes(), (2, 2));
}

#[test]
fn lowering_highwatermark_trims_synchronously() {
    let _t = CacheTest::begin();
    for tag in ["s1", "s2", "s3"] {
        evaluate_distinct(tag);
    }
    assert_eq!(cache_sizes().0, 3);
    set_cache_lowwatermark(1);
    set_cache_highwatermark(2);
    assert_eq!(cache_sizes(), (1, 1));
}

#[test]
fn clear_cache_empties_both_tables() {
    let _t = CacheTest::begin();
    evaluate_distinct("c1");
    assert_ne!(cache_sizes(), (0, 0));
    clear_cache();
    assert_eq!(cache_sizes(), (0, 0));
}

#[test]
fn repeated_evaluation_hits_the_cache() {
    let _t = CacheTest::begin();
    evaluate_distinct("r1");
    evaluate_distinct("r1");
    evaluate_distinct("r1");
    assert_eq!(cache_sizes(), (1, 1));
}

#[test]
fn no_cache_processor_leaves_tables_untouched() {
    let _t = CacheTest::begin();
    let processor = Processor::builder()
        .template(r#"n<:"n"/>"#)
        .no_cache(true)
        .build();
    processor.evaluate(params! {}).unwrap();
    assert_eq!(cache_sizes(), (0, 0));
}

#[test]
fn watermark_accessors_roundtrip() {
    let _t = CacheTest::begin();
    set_cache_highwatermark(123);
    set_cache_lowwatermark(45);
    assert_eq!(cache_highwatermark(), 123);
    assert_eq!(cache_lowwatermark(), 45);
}

#[test]
fn sizes_stay_bounded_by_highwatermark() {
    let _t = CacheTest::begin();
    set_cache_lowwatermark(2);
    set_cache_highwatermark(4);
    for i in 0..20 {
        evaluate_distinct(&format!("b{i}"));
        let (templates, fragments) = cache_sizes();
        assert!(templates <= 4, "templates {templates} exceeded high watermark");
        assert!(fragments <= 4, "fragments {fragments} exceeded high watermark");
    }
}

// =============================================================================
// Transparency
// =============================================================================

#[test]
fn cache_on_and_off_agree_on_output_and_errors() {
    let _t = CacheTest::begin();
    // Template with a parse diagnostic and a working substitution: both the
    // output and the replayed diagnostics must match with the cache off.
    let template = "a</=x>b<=v/>";

    let cached = Processor::builder().template(template).build();
    let first = cached.evaluate(params! { "v" => "V" }).unwrap();
    let second = cached.evaluate(params! { "v" => "V" }).unwrap();

    let uncached = Processor::builder()
        .template(template)
        .no_cache(true)
        .build();
    let fresh = uncached.evaluate(params! { "v" => "V" }).unwrap();
    uncached.evaluate(params! { "v" => "V" }).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, fresh);
    assert_eq!(cached.errors(), uncached.errors());
}

#[test]
fn eval_generated_templates_enter_the_cache() {
    let _t = CacheTest::begin();
    let processor = Processor::builder()
        .template("<:eval>generated-body</:eval>")
        .build();
    processor.evaluate(params! {}).unwrap();
    // Both the outer template and the generated one are parsed and cached.
    assert_eq!(cache_sizes().0, 2);
}
