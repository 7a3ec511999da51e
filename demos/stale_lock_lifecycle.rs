//! Cache-cleaning lock with stale-lock recovery.
//!
//! Two "processes" (clones of one in-memory backend) compete for the lock
//! that guards cache cleaning. The owner refreshes it while it works; once
//! it stops, the other one breaks the lock after the timeout. A strict
//! `try_lock` never breaks anything.
//!
//! Run with: `cargo run --example stale_lock_lifecycle`

use artifact_fs::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

fn attempt(who: &str, fs: &MemFileSystem, name: &Path, clock: &ManualClock) -> Tristate {
    let result = fs.try_lock_with_timeout(name, TIMEOUT, clock);
    println!("  t={:>6}ms {who:<8} try_lock_with_timeout -> {result:?}", clock.now_ms());
    result
}

fn main() {
    println!("=== Stale Lock Lifecycle ===\n");

    let clock = Arc::new(ManualClock::new(0));
    let cleaner = MemFileSystem::new().with_clock(clock.clone());
    let other = cleaner.clone();
    let name = Path::new("/cache/clean.lock");
    cleaner.recursively_make_dir(Path::new("/cache")).unwrap();

    println!("--- Owner refreshes while working ---");
    assert!(attempt("cleaner", &cleaner, name, &clock).is_true());
    for _ in 0..3 {
        clock.advance_ms(20_000);
        cleaner.bump_lock_timeout(name).unwrap();
        assert!(attempt("other", &other, name, &clock).is_false());
    }

    println!("--- Owner stops refreshing ---");
    clock.advance_ms(30_000);
    assert!(attempt("other", &other, name, &clock).is_true());

    println!("--- Strict locks never break ---");
    let strict = cleaner.try_lock(name);
    println!("  cleaner try_lock -> {strict:?}");
    assert!(strict.is_false());

    other.unlock(name).unwrap();
    println!("  released; {} locks held", other.held_lock_count());
}
