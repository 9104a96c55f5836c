use super::*;

#[test]
fn acquire_before_configure_is_a_resource_error() {
    let mut pool = CpuBufferPool::new(2);
    assert!(matches!(pool.acquire(), Err(OverlayError::Resource(_))));
}

#[test]
fn configure_is_idempotent() {
    let mut pool = CpuBufferPool::new(2);
    pool.configure(PixelFormat::Rgba8, 8, 8).unwrap();
    let generation = pool.generation();
    pool.configure(PixelFormat::Rgba8, 8, 8).unwrap();
    assert_eq!(pool.generation(), generation);
    pool.configure(PixelFormat::Rgba8, 8, 16).unwrap();
    assert_eq!(pool.generation(), generation + 1);
}

#[test]
fn configure_rejects_zero_dimensions() {
    let mut pool = CpuBufferPool::new(2);
    assert!(pool.configure(PixelFormat::Rgba8, 0, 8).is_err());
}

#[test]
fn released_buffers_are_reused() {
    let mut pool = CpuBufferPool::new(2);
    pool.configure(PixelFormat::Rgba8, 4, 4).unwrap();
    let a = pool.acquire().unwrap();
    pool.release(a);
    let _b = pool.acquire().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.allocs, 1);
    assert_eq!(stats.reuses, 1);
    assert_eq!(stats.drops, 0);
}

#[test]
fn reused_buffers_come_back_zeroed() {
    let mut pool = CpuBufferPool::new(2);
    pool.configure(PixelFormat::Rgba8, 4, 4).unwrap();
    let mut a = pool.acquire().unwrap();
    a.buf.planes[0].data.fill(0xAB);
    pool.release(a);
    let b = pool.acquire().unwrap();
    assert!(b.buf.planes[0].data.iter().all(|&x| x == 0));
}

#[test]
fn stale_generation_release_is_dropped() {
    let mut pool = CpuBufferPool::new(2);
    pool.configure(PixelFormat::Rgba8, 4, 4).unwrap();
    let a = pool.acquire().unwrap();
    // Reconfiguration bumps the generation; the outstanding buffer must not be recycled.
    pool.configure(PixelFormat::Rgba8, 8, 8).unwrap();
    pool.release(a);
    assert_eq!(pool.stats().drops, 1);
    let b = pool.acquire().unwrap();
    assert_eq!(b.buf.width, 8);
    assert_eq!(pool.stats().allocs, 2);
}

#[test]
fn invalidate_keeps_config_but_refuses_old_buffers() {
    let mut pool = CpuBufferPool::new(2);
    pool.configure(PixelFormat::Nv12, 4, 4).unwrap();
    let a = pool.acquire().unwrap();
    pool.invalidate();
    pool.release(a);
    assert_eq!(pool.stats().drops, 1);
    assert_eq!(
        pool.config(),
        Some(PoolConfig {
            format: PixelFormat::Nv12,
            width: 4,
            height: 4,
        })
    );
}

#[test]
fn retention_cap_drops_overflow() {
    let mut pool = CpuBufferPool::new(1);
    pool.configure(PixelFormat::Rgba8, 4, 4).unwrap();
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    pool.release(a);
    pool.release(b);
    assert_eq!(pool.stats().drops, 1);
}
