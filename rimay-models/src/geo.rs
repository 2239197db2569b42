//! Geographic helpers: points, great-circle distance, and GeoJSON polygons.
//!
//! Coordinates are WGS84 degrees. GeoJSON stores positions as
//! `[longitude, latitude]`; everything in this module takes latitude first.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rimay_core::error::{RimayError, RimayResult};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a point only when both coordinates are present and in range.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => {
                let p = Self::new(lat, lng);
                p.is_valid().then_some(p)
            }
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    /// Box guaranteed to contain every point within `radius_km`.
    pub fn bounding_box(&self, radius_km: f64) -> BoundingBox {
        let dlat = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let cos_lat = self.latitude.to_radians().cos().abs();
        // Near the poles any longitude can be within range.
        let dlng = if cos_lat < 1e-6 {
            180.0
        } else {
            (dlat / cos_lat).min(180.0)
        };
        BoundingBox {
            min_lat: self.latitude - dlat,
            max_lat: self.latitude + dlat,
            min_lng: self.longitude - dlng,
            max_lng: self.longitude + dlng,
        }
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Longitude intervals covered by the box, folded into [-180, 180].
    ///
    /// A box spilling past the antimeridian becomes two intervals, one on
    /// each side. Otherwise both intervals are the same.
    pub fn lng_ranges(&self) -> [(f64, f64); 2] {
        if self.max_lng - self.min_lng >= 360.0 {
            [(-180.0, 180.0); 2]
        } else if self.min_lng < -180.0 {
            [(self.min_lng + 360.0, 180.0), (-180.0, self.max_lng)]
        } else if self.max_lng > 180.0 {
            [(self.min_lng, 180.0), (-180.0, self.max_lng - 360.0)]
        } else {
            [(self.min_lng, self.max_lng); 2]
        }
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && self
                .lng_ranges()
                .iter()
                .any(|(lo, hi)| p.longitude >= *lo && p.longitude <= *hi)
    }
}

/// Polygon with an exterior ring and optional holes, in GeoJSON order.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Rings of `[lng, lat]` positions. The first ring is the exterior.
    rings: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    /// Parse a GeoJSON `Polygon` geometry.
    pub fn from_geojson(value: &Value) -> RimayResult<Self> {
        let kind = value.get("type").and_then(|v| v.as_str());
        if kind != Some("Polygon") {
            return Err(RimayError::field("boundary_area", "El área debe ser un polígono GeoJSON."));
        }

        let coords = value
            .get("coordinates")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RimayError::field("boundary_area", "El polígono no tiene coordenadas."))?;

        let mut rings = Vec::with_capacity(coords.len());
        for ring in coords {
            let positions = ring
                .as_array()
                .ok_or_else(|| RimayError::field("boundary_area", "Anillo de coordenadas inválido."))?;
            let mut parsed = Vec::with_capacity(positions.len());
            for pos in positions {
                let lng = pos.get(0).and_then(|v| v.as_f64());
                let lat = pos.get(1).and_then(|v| v.as_f64());
                match (lng, lat) {
                    (Some(lng), Some(lat)) => parsed.push([lng, lat]),
                    _ => {
                        return Err(RimayError::field("boundary_area", "Posición inválida en el polígono."))
                    }
                }
            }
            // A closed linear ring needs at least four positions.
            if parsed.len() < 4 || parsed.first() != parsed.last() {
                return Err(RimayError::field(
                    "boundary_area",
                    "Cada anillo debe estar cerrado y tener al menos 4 posiciones.",
                ));
            }
            rings.push(parsed);
        }

        if rings.is_empty() {
            return Err(RimayError::field("boundary_area", "El polígono no tiene coordenadas."));
        }

        Ok(Self { rings })
    }

    /// Parse from stored GeoJSON text.
    pub fn from_geojson_str(s: &str) -> RimayResult<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|_| RimayError::field("boundary_area", "El área no es JSON válido."))?;
        Self::from_geojson(&value)
    }

    /// Square of the given half-side (degrees) centred on a point.
    pub fn square_around(center: &GeoPoint, half_side_deg: f64) -> Self {
        let (lat, lng) = (center.latitude, center.longitude);
        let d = half_side_deg;
        Self {
            rings: vec![vec![
                [lng - d, lat - d],
                [lng + d, lat - d],
                [lng + d, lat + d],
                [lng - d, lat + d],
                [lng - d, lat - d],
            ]],
        }
    }

    pub fn to_geojson(&self) -> Value {
        json!({ "type": "Polygon", "coordinates": self.rings })
    }

    pub fn to_geojson_string(&self) -> String {
        self.to_geojson().to_string()
    }

    /// Bounding box of the exterior ring.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for [lng, lat] in &self.rings[0] {
            bb.min_lat = bb.min_lat.min(*lat);
            bb.max_lat = bb.max_lat.max(*lat);
            bb.min_lng = bb.min_lng.min(*lng);
            bb.max_lng = bb.max_lng.max(*lng);
        }
        bb
    }

    /// Whether the point lies inside the exterior ring and outside every hole.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        let (exterior, holes) = match self.rings.split_first() {
            Some(split) => split,
            None => return false,
        };
        ring_contains(exterior, p) && !holes.iter().any(|h| ring_contains(h, p))
    }
}

/// Even-odd ray casting.
fn ring_contains(ring: &[[f64; 2]], p: &GeoPoint) -> bool {
    let (x, y) = (p.longitude, p.latitude);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Round to two decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quito() -> GeoPoint {
        GeoPoint::new(-0.1807, -78.4678)
    }

    #[test]
    fn test_distance_known_value() {
        // Quito to Guayaquil is roughly 270 km.
        let gye = GeoPoint::new(-2.1710, -79.9224);
        let d = quito().distance_km(&gye);
        assert!((d - 270.0).abs() < 10.0, "got {d}");
        assert_eq!(quito().distance_km(&quito()), 0.0);
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let c = quito();
        let bb = c.bounding_box(2.0);
        // ~1.9 km due east
        let east = GeoPoint::new(c.latitude, c.longitude + 0.017);
        assert!(c.distance_km(&east) < 2.0);
        assert!(bb.contains(&east));
    }

    #[test]
    fn test_bounding_box_across_antimeridian() {
        let west_edge = GeoPoint::new(-17.0, 179.999);
        let east_edge = GeoPoint::new(-17.0, -179.999);
        assert!(west_edge.distance_km(&east_edge) < 0.5);

        let bb = west_edge.bounding_box(2.0);
        assert!(bb.max_lng > 180.0);
        assert!(bb.contains(&east_edge));
        assert!(east_edge.bounding_box(2.0).contains(&west_edge));
        assert!(!bb.contains(&GeoPoint::new(-17.0, -179.0)));

        let [(lo1, hi1), (lo2, hi2)] = bb.lng_ranges();
        assert_eq!(hi1, 180.0);
        assert_eq!(lo2, -180.0);
        assert!(lo1 < 179.999 && hi2 > -179.999);
    }

    #[test]
    fn test_from_parts() {
        assert!(GeoPoint::from_parts(Some(0.0), Some(0.0)).is_some());
        assert!(GeoPoint::from_parts(Some(1.0), None).is_none());
        assert!(GeoPoint::from_parts(Some(95.0), Some(0.0)).is_none());
        assert!(GeoPoint::from_parts(Some(f64::NAN), Some(0.0)).is_none());
    }

    #[test]
    fn test_square_contains_center() {
        let c = quito();
        let poly = Polygon::square_around(&c, 0.0001);
        assert!(poly.contains(&c));
        assert!(!poly.contains(&GeoPoint::new(c.latitude + 0.001, c.longitude)));
    }

    #[test]
    fn test_geojson_roundtrip_and_holes() {
        let v = json!({
            "type": "Polygon",
            "coordinates": [
                [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                [[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]]
            ]
        });
        let poly = Polygon::from_geojson(&v).unwrap();
        assert!(poly.contains(&GeoPoint::new(2.0, 2.0)));
        assert!(!poly.contains(&GeoPoint::new(5.0, 5.0)));
        assert!(!poly.contains(&GeoPoint::new(11.0, 2.0)));

        let again = Polygon::from_geojson_str(&poly.to_geojson_string()).unwrap();
        assert_eq!(again, poly);
        assert_eq!(poly.bounding_box().max_lat, 10.0);
    }

    #[test]
    fn test_rejects_non_polygon() {
        assert!(Polygon::from_geojson(&json!({"type": "Point", "coordinates": [0, 0]})).is_err());
        assert!(Polygon::from_geojson(&json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 1]]]})).is_err());
        assert!(Polygon::from_geojson_str("not json").is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(0.005), 0.01);
    }
}
