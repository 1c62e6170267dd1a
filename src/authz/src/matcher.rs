//! Wildcard permission matching
//!
//! Decides whether a held permission satisfies a required one. Held
//! permissions may contain `*` segments; required permissions are always
//! literal. Matching rules:
//!
//! - Exact string equality always matches.
//! - `*` and `*.*.*` are the superadmin wildcards and match everything.
//! - Otherwise the held permission matches if it has no more segments than
//!   the required one and every non-`*` segment equals the corresponding
//!   required segment positionally. A trailing wildcard therefore covers any
//!   deeper remainder (`Identity.*` matches `Identity.Users.Read`), but a
//!   wildcard never stands in for a *shorter* literal: `Identity.Users.*`
//!   does not match `Identity.Users`.

use std::collections::HashSet;

/// The bare superadmin wildcard
pub const SUPERADMIN_WILDCARD: &str = "*";

/// The three-segment superadmin wildcard
pub const SUPERADMIN_WILDCARD_FULL: &str = "*.*.*";

/// Does `held` satisfy `required`?
pub fn permission_matches(held: &str, required: &str) -> bool {
    if held == required {
        return true;
    }

    if !held.contains('*') {
        return false;
    }

    if held == SUPERADMIN_WILDCARD || held == SUPERADMIN_WILDCARD_FULL {
        return true;
    }

    let held_segments: Vec<&str> = held.split('.').collect();
    let required_segments: Vec<&str> = required.split('.').collect();

    if held_segments.len() > required_segments.len() {
        return false;
    }

    held_segments
        .iter()
        .zip(required_segments.iter())
        .all(|(h, r)| *h == "*" || h == r)
}

/// Does any permission in `held` satisfy `required`?
pub fn set_satisfies(held: &HashSet<String>, required: &str) -> bool {
    if held.contains(required) {
        return true;
    }
    held.iter().any(|h| permission_matches(h, required))
}

/// Does the set carry a superadmin wildcard?
pub fn holds_superadmin_wildcard(held: &HashSet<String>) -> bool {
    held.contains(SUPERADMIN_WILDCARD) || held.contains(SUPERADMIN_WILDCARD_FULL)
}
