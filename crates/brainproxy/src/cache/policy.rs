//! Cache eligibility.

/// Model id with any `models/` prefix and trailing numeric version removed.
///
/// `gemini-1.5-flash-002` and `models/gemini-1.5-flash-002` both map to
/// `gemini-1.5-flash`.
pub fn model_family(model: &str) -> &str {
    let model = model.strip_prefix("models/").unwrap_or(model);
    match model.rsplit_once('-') {
        Some((family, version))
            if !family.is_empty()
                && !version.is_empty()
                && version.bytes().all(|b| b.is_ascii_digit()) =>
        {
            family
        }
        _ => model,
    }
}

/// Decide whether a cache reference may ride along with one upstream call.
///
/// A cache and any tool declaration never share a call, so search or agentic
/// requests get nothing. Otherwise an explicit reference wins, and the active
/// server cache is attached only to models of the same family that are not
/// image generators.
pub fn decide(
    request_model: &str,
    explicit_override: Option<&str>,
    active_cache: Option<&str>,
    active_cache_model: &str,
    wants_search: bool,
    wants_agentic: bool,
) -> Option<String> {
    if wants_search || wants_agentic {
        return None;
    }
    if let Some(reference) = explicit_override.filter(|r| !r.is_empty()) {
        return Some(reference.to_string());
    }
    let active = active_cache.filter(|r| !r.is_empty())?;
    if request_model.contains("image") {
        return None;
    }
    if !request_model.starts_with(model_family(active_cache_model)) {
        return None;
    }
    Some(active.to_string())
}
