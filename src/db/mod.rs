pub mod entities;
pub mod enums;
pub mod memory_store;
pub mod pg_store;
pub mod store;

pub use memory_store::MemoryEndpointStore;
pub use pg_store::PgEndpointStore;
pub use store::{EndpointSnapshot, EndpointStore, NewProbeResult, ProbeResultRecord, StoreError};
