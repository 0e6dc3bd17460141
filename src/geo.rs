use diesel::prelude::*;

use crate::error::AppResult;
use crate::models::Prospect;
use crate::schema::prospects;

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Miles of latitude per degree; used for the bounding-box prefilter.
const MILES_PER_DEGREE_LAT: f64 = 69.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance in miles between two points (haversine).
pub fn haversine_miles(a: Point, b: Point) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

/// Rectangle guaranteed to contain every point within `radius_miles` of the
/// origin. Over-approximates near the poles; the haversine pass discards the
/// excess.
pub fn bounding_box(origin: Point, radius_miles: f64) -> BoundingBox {
    let lat_delta = radius_miles / MILES_PER_DEGREE_LAT;
    let cos_lat = origin.latitude.to_radians().cos().abs();
    let lng_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_miles / (MILES_PER_DEGREE_LAT * cos_lat)).min(180.0)
    };

    BoundingBox {
        min_latitude: (origin.latitude - lat_delta).max(-90.0),
        max_latitude: (origin.latitude + lat_delta).min(90.0),
        min_longitude: (origin.longitude - lng_delta).max(-180.0),
        max_longitude: (origin.longitude + lng_delta).min(180.0),
    }
}

/// Geo index lookup: all geocoded prospects within `radius_miles` of the
/// origin, closest first. A coarse bounding box narrows the database scan;
/// exact distances are computed here.
pub fn prospects_within_radius(
    conn: &mut PgConnection,
    origin: Point,
    radius_miles: f64,
) -> AppResult<Vec<(Prospect, f64)>> {
    let bounds = bounding_box(origin, radius_miles);

    let candidates: Vec<Prospect> = prospects::table
        .filter(prospects::latitude.is_not_null())
        .filter(prospects::longitude.is_not_null())
        .filter(prospects::latitude.ge(Some(bounds.min_latitude)))
        .filter(prospects::latitude.le(Some(bounds.max_latitude)))
        .filter(prospects::longitude.ge(Some(bounds.min_longitude)))
        .filter(prospects::longitude.le(Some(bounds.max_longitude)))
        .load(conn)?;

    let mut in_range: Vec<(Prospect, f64)> = candidates
        .into_iter()
        .filter_map(|prospect| {
            let coordinates = match (prospect.latitude, prospect.longitude) {
                (Some(latitude), Some(longitude)) => Point::new(latitude, longitude),
                _ => return None,
            };
            let distance = haversine_miles(origin, coordinates);
            (distance <= radius_miles).then_some((prospect, distance))
        })
        .collect();

    in_range.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(in_range)
}
