//! Code generation backends

pub mod c;

pub use c::Emitter;
