//! Call and ticket handlers.

pub mod calls;
