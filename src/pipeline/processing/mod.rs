// Pipeline processing: name resolution, enrichment fallback and record assembly

pub mod fallback;
pub mod integration;
pub mod reference;
pub mod resolver;
pub mod similarity;
