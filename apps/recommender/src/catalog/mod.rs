// Offline catalog acquisition: fetch listing pages, parse products, persist the catalog
// file and the resume cursor.

pub mod crawler;
pub mod fetcher;
pub mod parser;
pub mod store;
