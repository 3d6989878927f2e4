pub mod config;
pub mod error;
pub mod filter;
pub mod kinematics;
pub mod pipeline;
pub mod pose;

pub use error::{KinematicsError, Result};
pub use pipeline::{Analysis, Pipeline, PipelineError, ResultSink, Stage};
