pub mod classification;
pub mod extraction;
pub mod processor;
