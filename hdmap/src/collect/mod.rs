pub mod dataset;
pub mod global_variables;
