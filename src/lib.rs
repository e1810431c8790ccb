//! Workspace root package; exists to host repository-wide dev tooling.
//! The implementation lives in the `postalghost-*` crates.
