//! Distances, map links and GeoJSON export for facilities.

use serde_json::{json, Value};

use super::directory::Facility;

/// WGS84 equatorial radius in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl Facility {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Planar approximation, accurate for short (campus scale) distances.
/// Floors to whole metres.
pub fn distance_meters_floor(a: LatLng, b: LatLng) -> u64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let dy = (lat2 - lat1) * EARTH_RADIUS_M;
    let dx = d_lng * EARTH_RADIUS_M * ((lat1 + lat2) / 2.0).cos();
    dx.hypot(dy).floor() as u64
}

/// Viewport bounds. `west > east` means the box crosses the antimeridian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn contains(&self, p: LatLng) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.west <= self.east {
            self.west <= p.lng && p.lng <= self.east
        } else {
            p.lng >= self.west || p.lng <= self.east
        }
    }
}

/// `(id, metres)` ordered by distance from `center`, ties broken by id.
pub fn sorted_by_distance<'a>(
    facilities: impl IntoIterator<Item = &'a Facility>,
    center: LatLng,
) -> Vec<(String, u64)> {
    let mut with_dist: Vec<(String, u64)> = facilities
        .into_iter()
        .map(|f| (f.id.clone(), distance_meters_floor(f.position(), center)))
        .collect();
    with_dist.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    with_dist
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Apple,
    Android,
    Web,
}

impl Platform {
    /// Apple Maps on iOS, the geo: intent on Android, Google Maps elsewhere.
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Apple
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Web
        }
    }
}

/// Link that opens a map app at the given point.
pub fn map_link(lat: f64, lng: f64, label: Option<&str>, platform: Platform) -> String {
    let coords = format!("{},{}", lat, lng);
    match platform {
        Platform::Apple => format!("maps://?q={}", coords),
        Platform::Android => {
            let name = urlencoding::encode(label.unwrap_or("目的地"));
            format!("geo:{}?q={}({})", coords, coords, name)
        }
        Platform::Web => format!("https://www.google.com/maps?q={}", coords),
    }
}

pub fn facility_map_link(facility: &Facility, platform: Platform) -> String {
    map_link(facility.lat, facility.lng, Some(&facility.name), platform)
}

/// GeoJSON FeatureCollection of points (`[lng, lat]`) with id and name.
pub fn to_geojson<'a>(facilities: impl IntoIterator<Item = &'a Facility>) -> Value {
    let features: Vec<Value> = facilities
        .into_iter()
        .map(|f| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [f.lng, f.lat],
                },
                "properties": {
                    "id": f.id,
                    "name": f.name,
                },
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::{FacilityDirectory, SAMPLE_DIRECTORY};

    #[test]
    fn test_distance_planar() {
        let a = LatLng::new(35.0, 135.0);
        assert_eq!(distance_meters_floor(a, a), 0);
        // 0.001 degrees of latitude is about 111 m
        let b = LatLng::new(35.001, 135.0);
        assert_eq!(distance_meters_floor(a, b), 111);
        assert_eq!(distance_meters_floor(b, a), 111);
    }

    #[test]
    fn test_sorted_by_distance_tie_breaks_on_id() {
        let dir = FacilityDirectory::from_json(
            r#"{"data":[
                {"id":"b","name":"B","type":"building","lat":35.001,"lng":135.0},
                {"id":"a","name":"A","type":"building","lat":34.999,"lng":135.0},
                {"id":"c","name":"C","type":"building","lat":35.0,"lng":135.0}
            ]}"#,
        )
        .unwrap();
        let sorted = sorted_by_distance(
            dir.facilities().iter().map(|f| f.as_ref()),
            LatLng::new(35.0, 135.0),
        );
        let ids: Vec<&str> = sorted.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(sorted[0].1, 0);
    }

    #[test]
    fn test_map_links() {
        assert_eq!(
            map_link(35.07, 135.75, Some("真理館"), Platform::Apple),
            "maps://?q=35.07,135.75"
        );
        assert_eq!(
            map_link(35.07, 135.75, None, Platform::Android),
            "geo:35.07,135.75?q=35.07,135.75(%E7%9B%AE%E7%9A%84%E5%9C%B0)"
        );
        assert_eq!(
            map_link(35.07, 135.75, Some("A B"), Platform::Web),
            "https://www.google.com/maps?q=35.07,135.75"
        );
    }

    #[test]
    fn test_bounds_across_antimeridian() {
        let b = GeoBounds {
            south: -10.0,
            west: 170.0,
            north: 10.0,
            east: -170.0,
        };
        assert!(b.contains(LatLng::new(0.0, 175.0)));
        assert!(b.contains(LatLng::new(0.0, -175.0)));
        assert!(!b.contains(LatLng::new(0.0, 0.0)));
        assert!(!b.contains(LatLng::new(20.0, 175.0)));
    }

    #[test]
    fn test_geojson_shape() {
        let dir = FacilityDirectory::from_json(SAMPLE_DIRECTORY).unwrap();
        let gj = to_geojson(dir.facilities().iter().map(|f| f.as_ref()));
        assert_eq!(gj["type"], "FeatureCollection");
        let first = &gj["features"][0];
        assert_eq!(first["geometry"]["coordinates"][0], 135.7556);
        assert_eq!(first["geometry"]["coordinates"][1], 35.0716);
        assert_eq!(first["properties"]["id"], "Shinri");
        assert_eq!(gj["features"].as_array().unwrap().len(), 5);
    }
}
