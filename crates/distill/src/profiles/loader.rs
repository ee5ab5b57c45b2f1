// ABOUTME: Loads profile tables from the embedded JSON data and from directories of site-config text files.
// ABOUTME: Provides load_builtin_profiles() for the default table used by the Config Resolver.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, error, warn};

use super::ftr::parse_profile;
use super::profile::{ExtractionProfile, ProfileTable};

/// Embedded JSON object mapping hostnames to profiles.
const BUILTIN_PROFILES_JSON: &str = include_str!("../../data/site_profiles.json");

/// Loads the builtin profile table from embedded JSON.
pub fn load_builtin_profiles() -> ProfileTable {
    let mut table = ProfileTable::new();
    match serde_json::from_str::<HashMap<String, ExtractionProfile>>(BUILTIN_PROFILES_JSON) {
        Ok(profiles) => {
            for (host, profile) in profiles {
                table.insert(&host, profile);
            }
        }
        Err(e) => error!(error = %e, "embedded site profiles are malformed"),
    }
    table
}

/// Loads every `<host>.txt` site-config file in a directory into `table`.
///
/// Files that do not parse into a profile with body rules are skipped with a
/// warning. Returns the number of profiles loaded.
pub fn load_ftr_dir(table: &mut ProfileTable, dir: &Path) -> anyhow::Result<usize> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading profile directory {}", dir.display()))?;
    let mut loaded = 0;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(host) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        match parse_profile(&text) {
            Some(profile) => {
                debug!(host, "loaded site-config profile");
                table.insert(host, profile);
                loaded += 1;
            }
            None => warn!(path = %path.display(), "site-config has no body rules, skipped"),
        }
    }
    Ok(loaded)
}
