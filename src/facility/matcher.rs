//! Resolves noisy recognized text to a facility.
//!
//! Every `ocrName` entry becomes one compiled pattern. Plain strings must
//! match the whole normalized text; `/body/flags` entries are regexes and are
//! always case-insensitive. Patterns that would match anything are dropped at
//! load time.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::directory::{Facility, FacilityDirectory};

pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// NFKC, lowercase, trimmed.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase().trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternRejection {
    #[error("pattern is empty")]
    Empty,
    #[error("regex matches everything")]
    MatchAll,
    #[error("literal is shorter than 2 characters")]
    TooShort,
    #[error("unknown regex flag '{0}'")]
    UnknownFlag(char),
    #[error("regex does not compile: {0}")]
    Invalid(String),
}

fn is_trivially_match_all(body: &str) -> bool {
    matches!(body.trim(), "" | ".*" | "^.*$" | "^$" | "(?:.*)")
}

/// Splits `/body/flags`. Flags are lowercase letters only.
fn parse_slash_regex(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() || !flags.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }
    Some((body, flags))
}

/// Compiles one `ocrName` entry into the regex tested against normalized text.
pub fn compile_pattern(raw: &str) -> Result<Regex, PatternRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PatternRejection::Empty);
    }

    if let Some((body, flags)) = parse_slash_regex(trimmed) {
        if is_trivially_match_all(body) {
            return Err(PatternRejection::MatchAll);
        }
        let mut builder = RegexBuilder::new(body);
        builder.case_insensitive(true).unicode(true);
        for flag in flags.chars() {
            match flag {
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                // stateless matching makes g/y/d meaningless; i/u/v are implied
                'i' | 'u' | 'v' | 'g' | 'y' | 'd' => {}
                other => return Err(PatternRejection::UnknownFlag(other)),
            }
        }
        return builder
            .build()
            .map_err(|e| PatternRejection::Invalid(e.to_string()));
    }

    if trimmed.chars().count() < 2 {
        return Err(PatternRejection::TooShort);
    }
    RegexBuilder::new(&format!("^(?:{})$", regex::escape(trimmed)))
        .case_insensitive(true)
        .build()
        .map_err(|e| PatternRejection::Invalid(e.to_string()))
}

/// A compiled `ocrName` entry and the facility it resolves to.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: Regex,
    pub facility: Arc<Facility>,
    pub source: String,
}

/// A pattern dropped at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPattern {
    pub facility_id: String,
    pub source: String,
    pub reason: PatternRejection,
}

/// Which pattern produced a match.
#[derive(Debug, Clone)]
pub struct MatchDebug {
    pub facility: Arc<Facility>,
    pub matched_by: String,
    pub regex: String,
}

pub struct FacilityMatcher {
    patterns: Vec<CompiledPattern>,
    rejected: Vec<RejectedPattern>,
    cache: Mutex<LruCache<String, Option<Arc<Facility>>>>,
    scans: AtomicUsize,
}

impl FacilityMatcher {
    pub fn new(directory: &FacilityDirectory, cache_capacity: usize) -> Self {
        let mut patterns = Vec::new();
        let mut rejected = Vec::new();
        for facility in directory.facilities() {
            for raw in &facility.ocr_name {
                match compile_pattern(raw) {
                    Ok(pattern) => patterns.push(CompiledPattern {
                        pattern,
                        facility: Arc::clone(facility),
                        source: raw.clone(),
                    }),
                    Err(reason) => {
                        log::warn!(
                            "Ignoring ocrName {:?} of facility {}: {}",
                            raw,
                            facility.id,
                            reason
                        );
                        rejected.push(RejectedPattern {
                            facility_id: facility.id.clone(),
                            source: raw.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        log::info!(
            "Matcher ready: {} pattern(s), {} rejected",
            patterns.len(),
            rejected.len()
        );

        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            patterns,
            rejected,
            cache: Mutex::new(LruCache::new(capacity)),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn rejected(&self) -> &[RejectedPattern] {
        &self.rejected
    }

    /// Number of pattern scans run so far (cache misses).
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn first_match(&self, key: &str) -> Option<&CompiledPattern> {
        self.patterns.iter().find(|p| p.pattern.is_match(key))
    }

    /// Returns the first facility whose pattern matches, in directory order.
    /// Misses are cached too.
    pub fn find_building(&self, text: &str) -> Option<Arc<Facility>> {
        let key = normalize(text);
        if key.is_empty() {
            return None;
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let found = self.first_match(&key).map(|p| Arc::clone(&p.facility));
        cache.put(key, found.clone());
        found
    }

    /// Uncached lookup that also reports the matching pattern.
    pub fn find_building_with_debug(&self, text: &str) -> Option<MatchDebug> {
        let key = normalize(text);
        if key.is_empty() {
            return None;
        }
        self.first_match(&key).map(|p| MatchDebug {
            facility: Arc::clone(&p.facility),
            matched_by: p.source.clone(),
            regex: p.pattern.as_str().to_string(),
        })
    }
}
