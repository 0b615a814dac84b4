pub mod directory;
pub mod geo;
pub mod matcher;
pub mod search;

pub use directory::{DirectoryError, Facility, FacilityDirectory, FacilityType};
pub use geo::{facility_map_link, Platform};
pub use matcher::FacilityMatcher;

#[cfg(test)]
pub(crate) const SAMPLE_DIRECTORY: &str = r#"{"data":[
    {"id":"Shinri","name":"真理館","ocrName":["/^真理.{1}$/","真理館","/^SR\\d{3}$/"],"type":"building","lat":35.0716,"lng":135.7556},
    {"id":"karintou","name":"かりんとう","ocrName":["-14号館","かりんとう"],"type":"food","lat":35.0710,"lng":135.7560},
    {"id":"Sagittarius","name":"サギタリウス館","ocrName":["/^S\\d{3}$/"],"type":"building","lat":35.0720,"lng":135.7540},
    {"id":"Tenchi","name":"天地館","ocrName":["/^T\\d{3}$/","天地館"],"type":"building","lat":35.0700,"lng":135.7570},
    {"id":"14","name":"14号館","ocrName":["/^14\\d{3}$/","/^14B\\d{2}$/","14号館"],"type":"building","lat":35.0705,"lng":135.7550}
]}"#;
