pub mod ports;
pub mod enrichment;
pub mod integrate_use_case;
