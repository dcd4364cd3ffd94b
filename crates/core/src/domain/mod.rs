pub mod analysis;
pub mod product;
pub mod rfp;
pub mod workflow;
