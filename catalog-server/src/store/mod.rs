//! Database access for taxonomies, entries, reassignment, and accounts

pub mod entries;
pub mod reassign;
pub mod taxonomy;
pub mod users;
