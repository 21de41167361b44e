//! End-to-end scenarios S1-S6 from the design notes, exercised against the
//! in-process `DummySegment`/`DummyGraphicsApi` backends. S4/S5 simulate a
//! second attached process by constructing a second `PoolHandle` over the
//! *same* dummy segment/graphics-api pair with a distinct fake PID, rather
//! than forking a real OS process.

use std::sync::Arc;
use std::time::Duration;

use hybridpool::gpu::DummyGraphicsApi;
use hybridpool::segment::dummy::DummySegment;
use hybridpool::{PoolConfig, PoolHandle, Segment, StreamId};

const CPU_BUDGET: u64 = 1 << 20; // 1 MiB
const GPU_BUDGET: u64 = 16 << 20; // 16 MiB

fn handle_over(segment: Arc<DummySegment>, pid: u32) -> PoolHandle {
    let graphics = Arc::new(DummyGraphicsApi::new());
    handle_with_graphics(segment, graphics, pid)
}

fn handle_with_graphics(
    segment: Arc<DummySegment>,
    graphics: Arc<DummyGraphicsApi>,
    pid: u32,
) -> PoolHandle {
    let config = PoolConfig {
        cpu_budget: CPU_BUDGET,
        gpu_budget: GPU_BUDGET,
        enable_auditor_loop: false,
        ..PoolConfig::default()
    };
    PoolHandle::with_graphics_and_pid(segment, graphics, config, pid).expect("attach succeeds")
}

/// S1: two 4096-byte allocations, drop both, allocate 4096 again - expect
/// the third allocation to reuse one of the first two offsets and
/// `allocated` to stay flat.
#[test]
fn s1_single_process_reuse() {
    let segment = Arc::new(DummySegment::new());
    let pool = handle_over(segment, 1);

    let a = pool.get_buffer_from_shared_pool_direct(4096).unwrap();
    let b = pool.get_buffer_from_shared_pool_direct(4096).unwrap();
    assert_eq!(pool.stats().allocated_bytes, 8192);

    let addr_a = a.as_ptr();
    drop(a);
    drop(b);
    assert_eq!(
        pool.stats().allocated_bytes,
        8192,
        "allocated never decrements on reclaim"
    );

    let c = pool.get_buffer_from_shared_pool_direct(4096).unwrap();
    assert_eq!(pool.stats().allocated_bytes, 8192, "reused, not grown");
    assert_eq!(
        c.as_ptr(),
        addr_a,
        "LIFO free-list returns the most recently freed offset first"
    );
}

/// S2: CPU budget 1024, frac 0.9 -> cap 921. Two 512-byte requests: the
/// second exceeds the cap and falls back to the local allocator.
#[test]
fn s2_budget_rejection_falls_back_to_local() {
    let segment = Arc::new(DummySegment::new());
    let graphics = Arc::new(DummyGraphicsApi::new());
    let config = PoolConfig {
        cpu_budget: 1024,
        max_shm_usage_frac: 0.9,
        enable_auditor_loop: false,
        ..PoolConfig::default()
    };
    let pool = PoolHandle::with_graphics_and_pid(segment, graphics, config, 1).unwrap();

    let first = pool.get_buffer_from_pool(StreamId(0), 512);
    assert!(first.is_from_pool());

    let second = pool.get_buffer_from_pool(StreamId(0), 512);
    assert!(!second.is_from_pool(), "512 + 512 = 1024 >= cap of 921");
    assert_eq!(second.len(), 512);
}

/// S3: deactivating a stream routes it to the local allocator; reactivating
/// routes it back to the shared pool.
#[test]
fn s3_stream_gating() {
    let segment = Arc::new(DummySegment::new());
    let pool = handle_over(segment, 1);
    let stream = StreamId(42);

    pool.activate_stream(stream, false);
    let gated = pool.get_buffer_from_pool(stream, 256);
    assert!(!gated.is_from_pool());

    pool.activate_stream(stream, true);
    let active = pool.get_buffer_from_pool(stream, 256);
    assert!(active.is_from_pool());
}

/// S4: P1 allocates a GPU buffer and shares its offset with P2. P2's
/// `get_gpu_buffer_direct` duplicates the handle (a distinct numeric value
/// from P1's) and maps it. P2 detaching frees only its own duplicated
/// handle; P1 remains the only process that ever frees the underlying
/// origin GPU allocation through the graphics API, and only does so once it
/// is the last process to detach.
#[test]
fn s4_two_process_gpu_share() {
    let segment = Arc::new(DummySegment::new());
    let graphics = Arc::new(DummyGraphicsApi::new());

    let p1 = handle_with_graphics(Arc::clone(&segment), Arc::clone(&graphics), 111);
    let p2 = handle_with_graphics(Arc::clone(&segment), Arc::clone(&graphics), 222);

    let buffer1 = p1.get_gpu_buffer_from_pool(1 << 20, false).unwrap();
    assert_eq!(buffer1.origin_pid(), 111);
    let shared_offset = buffer1.shared_offset();

    let buffer2 = p2
        .get_gpu_buffer_direct(false, shared_offset)
        .expect("P2 duplicates P1's handle");
    assert_eq!(buffer2.origin_pid(), 111);
    assert_ne!(
        buffer2.data().handle,
        buffer1.data().handle,
        "duplicated handle is a distinct value from the origin's"
    );
    assert!(buffer2.is_host_visible());
    assert_eq!(graphics.allocation_count(), 2, "origin allocation + P2's duplicate");

    drop(buffer2);
    drop(p2);
    assert_eq!(
        graphics.allocation_count(),
        1,
        "P2 detaching frees only its own duplicated handle, not P1's origin allocation"
    );

    drop(buffer1);
    assert_eq!(p1.gpu_stats().host_visible.allocated_bytes, 1 << 20);

    drop(p1);
    assert_eq!(
        graphics.allocation_count(),
        0,
        "P1 detaching last frees the origin allocation via clean_pool"
    );
}

/// S5: a peer with a PID that doesn't correspond to any running process is
/// attached. P1's liveness loop observes it as dead, nukes the segment, and
/// invalidates. Subsequent CPU requests in P1 fall back to local
/// allocation.
#[test]
fn s5_peer_crash_invalidates_segment() {
    let segment = Arc::new(DummySegment::new());
    let graphics = Arc::new(DummyGraphicsApi::new());

    let config = PoolConfig {
        cpu_budget: CPU_BUDGET,
        gpu_budget: GPU_BUDGET,
        enable_auditor_loop: true,
        liveness_poll_interval: Duration::from_millis(5),
        ..PoolConfig::default()
    };
    let p1 = PoolHandle::with_graphics_and_pid(
        Arc::clone(&segment),
        Arc::clone(&graphics),
        config.clone(),
        111,
    )
    .unwrap();

    let auditor = segment.find_or_construct_auditor(hybridpool::AUDITOR_NAME);
    auditor.attach_fake(u32::MAX); // essentially guaranteed not to be a live PID

    for _ in 0..200 {
        if !p1.is_valid() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(!p1.is_valid(), "liveness loop should detect the dead peer");
    let fallback = p1.get_buffer_from_pool(StreamId(0), 128);
    assert!(!fallback.is_from_pool());
}

/// S6: LIFO locality - allocate `a` of 1024, drop, allocate `b` of 1024;
/// `b`'s raw address equals `a`'s.
#[test]
fn s6_lifo_locality() {
    let segment = Arc::new(DummySegment::new());
    let pool = handle_over(segment, 1);

    let a = pool.get_buffer_from_shared_pool_direct(1024).unwrap();
    let addr_a = a.as_ptr();
    drop(a);

    let b = pool.get_buffer_from_shared_pool_direct(1024).unwrap();
    assert_eq!(addr_a, b.as_ptr());
}

/// Invariant 1: allocated bytes always equal the sum of registered record
/// sizes, across a mix of distinct request sizes.
#[test]
fn invariant_allocated_matches_registry_sum() {
    let segment = Arc::new(DummySegment::new());
    let pool = handle_over(segment, 1);

    let _a = pool.get_buffer_from_shared_pool_direct(256).unwrap();
    let _b = pool.get_buffer_from_shared_pool_direct(512).unwrap();
    let _c = pool.get_buffer_from_shared_pool_direct(256).unwrap();

    assert_eq!(pool.stats().allocated_bytes, 256 + 512 + 256);
    assert_eq!(pool.stats().entry_count, 3);
}

/// First attach of a second process observes existing pool state (the
/// segment - and hence its named pools - is shared, not per-handle).
#[test]
fn second_attach_observes_existing_pool_state() {
    let segment = Arc::new(DummySegment::new());
    let p1 = handle_over(Arc::clone(&segment), 1);
    let _buffer = p1.get_buffer_from_shared_pool_direct(4096).unwrap();
    assert_eq!(p1.stats().allocated_bytes, 4096);

    let p2 = handle_over(segment, 2);
    assert_eq!(p2.stats().allocated_bytes, 4096);
}
