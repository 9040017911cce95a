pub mod ast;
pub mod optimizer;
pub mod parser;
pub mod types;

pub use ast::Filter;
pub use optimizer::Optimizer;
pub use parser::parse_filter;
pub use types::{AliasDerefMode, QueryValidator, SearchRequest, SearchScope, ValidationConfig, MAX_SCAN_COUNT};
