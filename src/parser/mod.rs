pub mod adapter;

pub use adapter::SqlParserAdapter;
