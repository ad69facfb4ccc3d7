use crate::core::{DbError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const PATTERN_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref PATTERN_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(PATTERN_CACHE_SIZE));
}

/// Translate a LIKE pattern (`%`, `_`, `\` escapes) into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

// Patterns without `_` or escapes and with `%` only at the ends need no regex.
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let leading = pattern.starts_with('%');
    let trailing = pattern.len() > 1 && pattern.ends_with('%');
    let start = usize::from(leading);
    let end = pattern.len() - usize::from(trailing);
    let core = pattern.get(start..end.max(start))?;
    if core.contains('%') {
        return None;
    }

    Some(match (leading, trailing) {
        (false, false) => text == core,
        (false, true) => text.starts_with(core),
        (true, false) => text.ends_with(core),
        (true, true) => text.contains(core),
    })
}

fn compiled(pattern: &str) -> Result<Arc<Regex>> {
    if let Some(regex) = PATTERN_CACHE.lock()?.get(pattern) {
        return Ok(Arc::clone(regex));
    }

    let regex = Regex::new(&like_to_regex(pattern))
        .map(Arc::new)
        .map_err(|e| DbError::ExecutionError(format!("Invalid LIKE pattern: {}", e)))?;

    PATTERN_CACHE.lock()?.put(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

/// Case-sensitive SQL LIKE.
pub fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern) {
        return Ok(result);
    }
    Ok(compiled(pattern)?.is_match(text))
}
