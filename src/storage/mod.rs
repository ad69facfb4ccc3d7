pub mod catalog;
pub mod memory;
pub mod table;

pub use catalog::Catalog;
pub use memory::InMemoryStorage;
pub use table::{MvccRow, Table, TableSchema};
