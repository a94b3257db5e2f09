pub mod postgres;
pub mod store;

pub use postgres::PgPartitionStore;
pub use store::{PartitionStore, RegistryFilter, RegistryUpdate, StoreError};
