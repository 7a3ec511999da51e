//! Publishing cache entries atomically.
//!
//! A writer replaces an entry while a reader keeps reading it. Because the
//! payload goes to a temp file that is renamed over the entry, the reader
//! only ever sees a complete old or a complete new body. The second half
//! shows what a failed publish leaves behind: nothing.
//!
//! Run with: `cargo run --example atomic_publish`

use artifact_fs::*;
use std::path::Path;
use std::thread;

// =============================================================================
// Publishing under concurrent reads
// =============================================================================

fn publish_while_reading(fs: &impl FileSystem, entry: &Path) {
    let old = vec![b'o'; 4096];
    let new = vec![b'n'; 64 * 1024];
    fs.write_file_atomic(entry, &old).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..100 {
                let body = if i % 2 == 0 { &new } else { &old };
                fs.write_file_atomic(entry, body).unwrap();
            }
        });
        s.spawn(|| {
            let mut complete = 0;
            for _ in 0..100 {
                let body = fs.read_file(entry, SizeLimit::Bytes(1 << 20)).unwrap();
                assert!(body == old || body == new);
                complete += 1;
            }
            println!("  reader saw {complete} complete bodies");
        });
    });
}

// =============================================================================
// A publish that fails half way
// =============================================================================

fn failed_publish(entry: &Path) {
    let sink = std::sync::Arc::new(RecordingDiagnostics::new());
    let fs = MemFileSystem::new()
        .with_diagnostics(sink.clone())
        .layer(FaultLayer::new());

    fs.write_file_atomic(entry, b"v1").unwrap();
    fs.inject(Fault::Write);
    let err = fs.write_file_atomic(entry, b"v2").unwrap_err();
    fs.clear_all();
    println!("  publish failed: {err}");

    let body = fs.read_file(entry, SizeLimit::Unlimited).unwrap();
    println!("  entry still holds {:?}", String::from_utf8_lossy(&body));

    let parent = entry.parent().unwrap_or(Path::new("/"));
    for child in fs.list_contents(parent).unwrap() {
        println!("  left in {}: {}", parent.display(), child.display());
    }
    for message in sink.messages() {
        println!("  reported: {message}");
    }
}

fn main() {
    println!("=== Atomic Publish ===\n");

    println!("--- In memory ---");
    publish_while_reading(&MemFileSystem::new(), Path::new("/cache/ab/entry"));

    println!("--- On disk ---");
    let dir = tempfile::tempdir().unwrap();
    publish_while_reading(&DiskFileSystem::new(), &dir.path().join("cache/ab/entry"));

    println!("--- Failed publish ---");
    failed_publish(Path::new("/cache/cd/entry"));
}
