//! Bulk export/import of entries and taxonomies

pub mod export;
pub mod import;
pub mod resolve;
