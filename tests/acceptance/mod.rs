//! Workspace-level acceptance tests.

mod common;
mod concurrency_test;
mod end_to_end_test;
mod wraparound_test;
