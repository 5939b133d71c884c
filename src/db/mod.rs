pub mod entitlement_repository;
#[cfg(test)]
pub mod mock_db;
pub mod postgres_entitlement_repository;
