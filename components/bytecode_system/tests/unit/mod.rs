//! Unit tests for the bytecode image, builder and verifier

mod test_builder;
