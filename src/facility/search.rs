//! Loose AND search over facility names, descriptions, tags and derived aliases.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::directory::Facility;

fn is_stripped(c: char) -> bool {
    c.is_whitespace()
        || matches!(c,
            '\u{30fc}' | '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{ff0d}'
            | '-' | '_' | '.' | ',' | '/' | '\\' | '|' | '(' | ')'
            | '［' | '[' | ']' | '{' | '}' | '<' | '>' | '〈' | '〉'
            | '「' | '」' | '『' | '』' | '【' | '】' | '：' | ':' | ';'
            | '、' | '。' | '・')
}

/// Lowercases, folds full-width ASCII to half-width, drops punctuation and
/// spaces, and maps katakana to hiragana.
pub fn normalize_for_search(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            '！'..='～' => char::from_u32(c as u32 - 0xfee0).unwrap_or(c),
            _ => c,
        })
        .filter(|c| !is_stripped(*c))
        .map(|c| match c {
            'ァ'..='ヶ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Normalized text, each digit run, and (for 4+ chars) every prefix down to 2 chars.
pub fn generate_aliases(s: &str) -> Vec<String> {
    let n = normalize_for_search(s);
    let mut out = vec![n.clone()];
    let mut push = |alias: String| {
        if !out.contains(&alias) {
            out.push(alias);
        }
    };

    let mut digits = String::new();
    for c in n.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            push(std::mem::take(&mut digits));
        }
    }

    let chars: Vec<char> = n.chars().collect();
    if chars.len() >= 4 {
        for cut in (2..chars.len()).rev() {
            push(chars[..cut].iter().collect());
        }
    }
    out
}

struct SearchIndex {
    name: String,
    desc: String,
    tags: Vec<String>,
    aliases: HashSet<String>,
}

impl SearchIndex {
    fn build(f: &Facility) -> Self {
        let aliases = std::iter::once(f.name.as_str())
            .chain(f.tags.iter().map(String::as_str))
            .flat_map(generate_aliases)
            .collect();
        Self {
            name: normalize_for_search(&f.name),
            desc: normalize_for_search(f.description.as_deref().unwrap_or("")),
            tags: f.tags.iter().map(|t| normalize_for_search(t)).collect(),
            aliases,
        }
    }

    fn hits(&self, token: &str) -> bool {
        self.name.contains(token)
            || self.desc.contains(token)
            || self.tags.iter().any(|t| t.starts_with(token))
            || self.aliases.iter().any(|a| a.starts_with(token))
    }
}

/// Facilities matching every whitespace-separated token. An empty query
/// matches nothing.
#[derive(Default)]
pub struct FacilitySearch {
    indexes: HashMap<String, SearchIndex>,
}

impl FacilitySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, facilities: &[Arc<Facility>], query: &str) -> Vec<Arc<Facility>> {
        let tokens: Vec<String> = query
            .split(|c: char| c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(normalize_for_search)
            .collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        facilities
            .iter()
            .filter(|f| {
                let idx = self
                    .indexes
                    .entry(f.id.clone())
                    .or_insert_with(|| SearchIndex::build(f));
                tokens.iter().all(|tk| idx.hits(tk))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::directory::FacilityType;

    fn facility(id: &str, name: &str, tags: &[&str], desc: Option<&str>) -> Arc<Facility> {
        Arc::new(Facility {
            id: id.to_string(),
            name: name.to_string(),
            ocr_name: Vec::new(),
            kind: FacilityType::Building,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            lat: 0.0,
            lng: 0.0,
            contents_id: None,
            description: desc.map(str::to_string),
            image: None,
        })
    }

    fn ids(v: &[Arc<Facility>]) -> Vec<&str> {
        v.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_normalize_for_search() {
        assert_eq!(normalize_for_search("ＡＢＣ１２３"), "abc123");
        assert_eq!(normalize_for_search("カフェ・テリア"), "かふぇてりあ");
        assert_eq!(normalize_for_search("14 号館（北）"), "14号館北");
        assert_eq!(normalize_for_search("コーヒー"), "こひ");
    }

    #[test]
    fn test_generate_aliases() {
        let aliases = generate_aliases("情報理工学部");
        assert_eq!(
            aliases,
            vec!["情報理工学部", "情報理工学", "情報理工", "情報理", "情報"]
        );
        let aliases = generate_aliases("14号館");
        assert_eq!(aliases, vec!["14号館", "14", "14号"]);
    }

    #[test]
    fn test_and_search() {
        let facilities = vec![
            facility("14", "14号館", &["情報理工学部"], None),
            facility("lib", "図書館", &["情報センター"], Some("本が読める")),
            facility("cafe", "カフェテリア", &[], None),
        ];
        let mut search = FacilitySearch::new();
        assert_eq!(ids(&search.filter(&facilities, "14 情報")), vec!["14"]);
        assert_eq!(ids(&search.filter(&facilities, "情報")), vec!["14", "lib"]);
        assert_eq!(ids(&search.filter(&facilities, "本")), vec!["lib"]);
        assert_eq!(ids(&search.filter(&facilities, "かふぇ")), vec!["cafe"]);
        assert_eq!(ids(&search.filter(&facilities, "１４　情報理工")), vec!["14"]);
        assert!(search.filter(&facilities, "14 図書").is_empty());
        // One index per facility, built on first use and kept across queries.
        assert_eq!(search.indexes.len(), 3);
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let facilities = vec![facility("a", "A館", &[], None)];
        let mut search = FacilitySearch::new();
        assert!(search.filter(&facilities, "").is_empty());
        assert!(search.filter(&facilities, "  　 ").is_empty());
        assert!(search.indexes.is_empty());
    }
}
