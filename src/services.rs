pub mod zone_manager;
pub use zone_manager::ZoneManagerService;
