pub mod addon;
pub mod marshal;
pub mod schema;
pub mod store;
