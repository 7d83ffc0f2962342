//! PEG repository: JSONB-expansion query builder + pooled execution (C4).

pub mod peg_repository;
pub mod pool;
pub mod query_builder;

pub use peg_repository::PegRepository;
pub use pool::create_pool;
pub use query_builder::{build_peg_query, BoundParam, QueryBuilderInput};
