//! Shared pieces for the debug programs.

pub mod synthetic;
