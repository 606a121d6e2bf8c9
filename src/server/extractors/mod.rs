mod authentication_extractor;

pub use authentication_extractor::*;
