pub mod zone_store;
pub use zone_store::ZoneStore;
pub mod zone_repo;
pub use zone_repo::ZoneRepository;
pub mod memory_store;
pub use memory_store::MemoryZoneStore;
