pub mod schema;

pub use schema::{DriverCommand, OutputConfig, PlannerCommand, RunnerConfig};
