//! Integration-style tests driving the scheduler through its public API
//! with mocked collaborators.

mod execution;
