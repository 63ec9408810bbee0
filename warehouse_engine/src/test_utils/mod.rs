//! Helpers for tests: throw-away databases and scripted stand-ins for the external collaborators.
pub mod fakes;
pub mod fixtures;
pub mod prepare_env;
