// ABOUTME: Site profiles: the profile record, its sources (embedded, text files, remote) and the resolver.
// ABOUTME: The Config Resolver is the only owner of the per-host profile cache.

pub mod ftr;
pub mod loader;
pub mod profile;
pub mod remote;
pub mod resolver;

pub use loader::{load_builtin_profiles, load_ftr_dir};
pub use profile::{normalize_host, Directive, ExtractionProfile, ProfileTable, Replacement};
pub use remote::{HttpProfileSource, ProfileSource};
pub use resolver::ConfigResolver;
