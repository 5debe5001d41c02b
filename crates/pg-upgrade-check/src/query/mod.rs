//! Query template parsing and table name validation.

pub mod identifier;
pub mod template;

pub use identifier::{validate_identifier, validate_table_name};
pub use template::{parse_collect, parse_compare, QueryTemplate};
