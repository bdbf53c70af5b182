use regex::Regex;
use replikv_core::{ReplikvError, Result};

/// Compiles a `List` filter. `None` and the empty string both mean "no
/// filter". Compilation is a pure function of the pattern, so a pattern
/// rejected here is rejected identically on every replica.
pub fn compile_filter(filter: Option<&str>) -> Result<Option<Regex>> {
    match filter {
        None | Some("") => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|e| ReplikvError::invalid_filter(pattern, e.to_string())),
    }
}
