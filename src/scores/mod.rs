//! Access to bgzip/tabix indexed genomic score files.

pub mod aggregate;
pub mod buffer;
pub mod conf;
pub mod fetch;
pub mod file;
pub mod index;
pub mod line;
pub mod region;
pub mod tabix;
