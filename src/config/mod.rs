//! Policy configuration: tokenizing and validating the line-oriented config file, then compiling
//! it into a tracked-file set and a path cache.

mod compiler;
mod token;

pub use compiler::{compile, CompiledPolicy, ExcludePolicy, PolicyError, TrackedFileValue};
pub use token::{read_config, validate_syntax, Command, ConfigError, Token};
