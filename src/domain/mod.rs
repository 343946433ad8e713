// ============================================================================
// Domain Layer
// ============================================================================
//
// In-memory aggregates, value objects and events. Construction is pure:
// persistence happens in the outbox layer, in one atomic unit.
//
// ============================================================================

pub mod order;
