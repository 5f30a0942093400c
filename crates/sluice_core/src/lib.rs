pub mod cache;
pub mod compiler;
pub mod config;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod io;
pub mod iterator;
pub mod operators;
pub mod planner;
pub mod relational;
pub mod scalar;
pub mod session;
pub mod statistics;

#[cfg(test)]
mod testutil;
