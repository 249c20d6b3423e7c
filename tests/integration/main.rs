//! Integration tests across module boundaries

mod capture_test;
mod engine_test;
mod journal_test;
mod trading_test;
