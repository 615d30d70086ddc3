pub mod artifact;
pub mod dataset;
pub mod evaluation;
pub mod fusion;
pub mod metrics;
pub mod normalize;
pub mod optimizer;
pub mod ranking;
