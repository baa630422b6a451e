pub mod catalog;
pub mod config;
pub mod crawl;
pub mod enrichment;
pub mod error;
pub mod harvest;
pub mod payload;
pub mod pool;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod test_utils;
