pub mod bucket_migrator;
pub mod naming;
pub mod object_store;
pub mod proof_resolver;
pub mod registrations;
pub mod storage_service;
