//! Facility directory loaded from `facilities.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityType {
    #[default]
    Building,
    Tips,
    Shop,
    Food,
}

impl FacilityType {
    /// Japanese label shown in the result dialog.
    pub fn label(&self) -> &'static str {
        match self {
            FacilityType::Building => "建物",
            FacilityType::Tips => "豆知識",
            FacilityType::Shop => "ショップ",
            FacilityType::Food => "食堂",
        }
    }
}

/// One entry in the directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: String,
    pub name: String,
    /// Patterns recognized text is matched against. Facilities without any
    /// are never found by the matcher.
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ocr_name: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: FacilityType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// `ocrName` may be a single string or a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid facility directory: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate facility id: {0}")]
    DuplicateId(String),
}

#[derive(Deserialize)]
struct DirectoryFile {
    data: Vec<Facility>,
}

/// Facilities in declaration order. Order matters: the matcher's first
/// matching pattern wins.
#[derive(Clone, Debug, Default)]
pub struct FacilityDirectory {
    facilities: Vec<Arc<Facility>>,
}

impl FacilityDirectory {
    pub fn new(facilities: Vec<Facility>) -> Result<Self, DirectoryError> {
        let mut seen = HashSet::new();
        for f in &facilities {
            if !seen.insert(f.id.as_str()) {
                return Err(DirectoryError::DuplicateId(f.id.clone()));
            }
        }
        Ok(Self {
            facilities: facilities.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_json::from_str(json)?;
        Self::new(file.data)
    }

    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::from_json(&content)?;
        log::info!(
            "Loaded {} facilities from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn facilities(&self) -> &[Arc<Facility>] {
        &self.facilities
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Facility>> {
        self.facilities.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directory() {
        let json = r#"{"data":[
            {"id":"Shinri","name":"真理館","ocrName":["真理館","/^SR\\d{3}$/"],"type":"building",
             "tags":["文化学部"],"lat":35.07,"lng":135.75,"contentsId":"c1"},
            {"id":"shop1","name":"購買","ocrName":"購買部","type":"shop","lat":35.0,"lng":135.0},
            {"id":"tips1","name":"豆知識","type":"tips","lat":35.0,"lng":135.0}
        ]}"#;
        let dir = FacilityDirectory::from_json(json).unwrap();
        assert_eq!(dir.len(), 3);

        let shinri = dir.get("Shinri").unwrap();
        assert_eq!(shinri.ocr_name, vec!["真理館", "/^SR\\d{3}$/"]);
        assert_eq!(shinri.contents_id.as_deref(), Some("c1"));
        assert_eq!(shinri.kind, FacilityType::Building);

        assert_eq!(dir.get("shop1").unwrap().ocr_name, vec!["購買部"]);
        assert!(dir.get("tips1").unwrap().ocr_name.is_empty());
        assert!(dir.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let json = r#"{"data":[
            {"id":"a","name":"A","type":"building","lat":0,"lng":0},
            {"id":"a","name":"B","type":"building","lat":0,"lng":0}
        ]}"#;
        assert!(matches!(
            FacilityDirectory::from_json(json),
            Err(DirectoryError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FacilityDirectory::load(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, DirectoryError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facilities.json");
        std::fs::write(
            &path,
            r#"{"data":[{"id":"a","name":"A","type":"food","lat":1.5,"lng":2.5}]}"#,
        )
        .unwrap();
        let loaded = FacilityDirectory::load(&path).unwrap();
        assert_eq!(loaded.facilities()[0].kind, FacilityType::Food);
    }

    #[test]
    fn test_bundled_directory_is_usable() {
        let dir = FacilityDirectory::from_json(include_str!("../../resources/facilities.json")).unwrap();
        assert!(!dir.is_empty());
        let matcher = crate::facility::FacilityMatcher::new(&dir, 16);
        assert!(matcher.rejected().is_empty());
        assert_eq!(matcher.find_building("SR101").unwrap().id, "Shinri");
        assert_eq!(matcher.find_building("購買部前").unwrap().id, "coop-shop");
    }
}
