pub mod build_service;
pub mod callback;
pub mod poll_scheduler;
pub mod stack_service;

#[cfg(test)]
pub(crate) mod testing;
