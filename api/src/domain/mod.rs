//! Postgres queries, one module per table group.
//!
//! Query functions take a generic `Executor` so callers can pass either
//! `&PgPool` or `&mut *tx`. Functions that must be atomic open their own
//! transaction from a `&PgPool`.

pub mod accounts;
pub mod credits;
pub mod feedback;
pub mod pending_states;
pub mod recommendations;
