mod helpers;

mod flush_tests;
mod read_tests;
mod write_tests;
