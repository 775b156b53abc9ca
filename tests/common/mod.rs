/// Common test utilities for integration tests
///
/// This module provides:
/// - A scriptable stand-in for the erasure engine (`/bin/sh` based)
/// - Assertions over clearance reports
pub mod assertions;
pub mod fake_engine;
