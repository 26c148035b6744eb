pub mod store;
pub use store::ContactStore;
pub mod contact_repo;
pub use contact_repo::PgContactStore;
pub mod dashboard_repo;
pub use dashboard_repo::DashboardRepository;

#[cfg(test)]
pub mod memory_store;
