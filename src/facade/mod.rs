mod data_source;
mod database;

pub use data_source::DataSource;
pub use database::InMemoryDB;
