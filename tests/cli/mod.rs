//! CLI protocol tests.

mod process_test;
