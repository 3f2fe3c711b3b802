//! JSON selectors over stored documents. A selector is evaluated in memory by
//! `MemoryStore` and compiled to parameterised SQL by `PgDocumentStore`.

mod error;
mod filter;
mod filter_order;
mod filter_where;
mod types;

pub use error::FilterError;
pub use filter::Filter;
pub use filter_order::FilterOrder;
pub use filter_where::FilterWhere;
pub use types::*;
