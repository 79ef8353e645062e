//! Warden Store
//!
//! Storage backends for authorization policies. Policies are kept in their
//! stored form ([`warden_policy::PolicyRecord`], conditions as JSON blobs)
//! and decoded on every read, so malformed rows surface exactly as they
//! would from a database.

pub mod memory;

pub use memory::InMemoryPolicyRepository;
