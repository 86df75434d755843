//! Line-level I/O shared by the readers, the toolkit staging code and the
//! file-level commands.

pub mod output;
pub mod parsing;
pub mod validation;

pub use output::BedWriter;
pub use parsing::{parse_u64_fast, should_skip_line, split_fields};
pub use validation::SortValidator;
