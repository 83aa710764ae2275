//! Schema mapping between the application's internal record shape and the
//! externally managed (Supabase) schema.
//!
//! The external schema predates this application and is hand-managed:
//! foreign-key columns are stored as strings, some columns carry legacy
//! names, and extra columns exist that the application never declared. This
//! module holds the declarative per-entity rules that bridge the two shapes
//! in both directions.

mod convert;
mod schema;
mod translate;

pub use convert::*;
pub use schema::*;
pub use translate::*;
