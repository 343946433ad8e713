pub mod memory;
pub mod message;
pub mod postgres;
pub mod relay;
pub mod store;

pub use memory::InMemoryStore;
pub use message::{OutboxMessage, OutboxStatus};
pub use postgres::PgStore;
pub use relay::{CycleStats, OutboxRelay, BATCH_SIZE};
pub use store::{OrderStore, OutboxStore, PersistenceError};
