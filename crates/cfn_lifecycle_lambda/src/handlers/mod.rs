pub mod build;
pub mod coordinator;
pub mod nested_stack;
