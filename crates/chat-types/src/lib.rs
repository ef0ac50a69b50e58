// ============================================================================
// Chat Types - Core Data Types
// ============================================================================
//
// Data structures shared by the hub, the durable queue adapters and the
// message store. NO dependencies on business logic, databases or brokers.
//
// Dependencies:
// - serde (serialization only)
// - uuid (identifiers)
// - chrono (timestamps)
//
// ============================================================================

pub mod message;
pub mod user_id;

pub use message::*;
pub use user_id::*;
