/// Allocation negotiation with the upstream allocator.
pub mod alloc;
/// The overlay orchestrator.
pub mod engine;
