use super::*;

#[test]
fn new_query_is_undecided() {
    let query = AllocationQuery::new(PixelFormat::Rgba8, 1920, 1080);
    assert!(query.decided().is_none());
    assert!(query.pools.is_empty());
}

#[test]
fn first_proposal_wins() {
    let mut query = AllocationQuery::new(PixelFormat::Nv12, 1280, 720);
    query.propose(PoolProposal {
        domain: MemoryDomain::Gpu,
        min_buffers: 2,
        max_buffers: 4,
        need_render_target: true,
    });
    query.propose(PoolProposal {
        domain: MemoryDomain::System,
        min_buffers: 1,
        max_buffers: 0,
        need_render_target: false,
    });
    let winner = query.decided().unwrap();
    assert_eq!(winner.domain, MemoryDomain::Gpu);
    assert_eq!(winner.min_buffers, 2);
    assert_eq!(query.pools.len(), 2);
}

#[test]
fn queries_round_trip_through_serde() {
    let mut query = AllocationQuery::new(PixelFormat::I420, 640, 480);
    query.propose(PoolProposal {
        domain: MemoryDomain::System,
        min_buffers: 1,
        max_buffers: 8,
        need_render_target: false,
    });
    let json = serde_json::to_string(&query).unwrap();
    let back: AllocationQuery = serde_json::from_str(&json).unwrap();
    assert_eq!(back, query);
}
