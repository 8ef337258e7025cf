//! Model Selection
//!
//! Picks the first usable model from a preference list, given what the
//! backend currently reports as available.

/// Whether an available model id satisfies a requested one.
///
/// A tag-less request (`llama3.2`) matches any tag of that model
/// (`llama3.2:latest`).
fn matches(requested: &str, available: &str) -> bool {
    if requested == available {
        return true;
    }
    !requested.contains(':')
        && available
            .split_once(':')
            .is_some_and(|(base, _)| base == requested)
}

/// First of `preferred` then `fallbacks` present in `available`, returned as
/// the backend's own id
pub fn resolve_model(preferred: &str, fallbacks: &[String], available: &[String]) -> Option<String> {
    std::iter::once(preferred)
        .chain(fallbacks.iter().map(String::as_str))
        .find_map(|candidate| {
            available
                .iter()
                .find(|a| matches(candidate, a))
                .cloned()
        })
}
