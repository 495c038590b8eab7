// Library for tests to access modules

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod history_repo;
pub mod maintenance_worker;
pub mod models;
pub mod persister;
pub mod provider;
pub mod routes;
pub mod sampling;
pub mod version;
pub mod worker;
