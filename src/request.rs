//! Job manifests: JSON files describing one batch job

/// Read and validate manifests against the bundled JSON schema
pub mod manifest;
/// Typed job request deserialised from a valid manifest
pub mod job;
pub mod schema;
