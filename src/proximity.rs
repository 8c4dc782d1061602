//! Proximity filter: the single distance rule shared by the map, the case
//! list and the notification matcher.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

use crate::model::{AlertCase, CaseStatus};
use crate::{haversine_distance, ValidatedCoordinate, PROXIMITY_RADIUS_M};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub included: bool,
    pub distance_m: f64,
}

/// Inclusion verdict for one case. The boundary is inclusive: a case at
/// exactly the radius is in.
#[must_use]
pub fn verdict(user: ValidatedCoordinate, case: ValidatedCoordinate) -> Verdict {
    let distance_m = haversine_distance(user, case);
    Verdict {
        included: distance_m <= PROXIMITY_RADIUS_M,
        distance_m,
    }
}

/// One open case that passed the filter, paired with its distance when the
/// user position was known.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyAlert {
    pub alert: AlertCase,
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOutcome {
    pub nearby: Vec<NearbyAlert>,
    /// True when no user position was available and the filter was bypassed.
    pub unfiltered: bool,
}

/// Selects the open cases within radius of `user`, sorted nearest first.
/// With no position every open case passes, flagged as unfiltered.
#[must_use]
pub fn nearby_open_alerts(user: Option<ValidatedCoordinate>, alerts: &[AlertCase]) -> FilterOutcome {
    let open = alerts.iter().filter(|a| a.status == CaseStatus::Open);

    match user {
        None => FilterOutcome {
            nearby: open
                .map(|a| NearbyAlert {
                    alert: a.clone(),
                    distance_m: None,
                })
                .collect(),
            unfiltered: true,
        },
        Some(position) => {
            let mut nearby: Vec<NearbyAlert> = open
                .filter_map(|a| {
                    let v = verdict(position, a.position);
                    v.included.then(|| NearbyAlert {
                        alert: a.clone(),
                        distance_m: Some(v.distance_m),
                    })
                })
                .collect();
            nearby.sort_by(|a, b| {
                a.distance_m
                    .partial_cmp(&b.distance_m)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            FilterOutcome {
                nearby,
                unfiltered: false,
            }
        }
    }
}

/// Map pins as a GeoJSON FeatureCollection for the shell's map view.
#[must_use]
pub fn pins_as_geojson(nearby: &[NearbyAlert]) -> FeatureCollection {
    let features = nearby
        .iter()
        .map(|n| {
            let mut properties = JsonObject::new();
            properties.insert("id".into(), n.alert.id.as_str().into());
            properties.insert("species".into(), n.alert.species_label().into());
            properties.insert("condition".into(), n.alert.condition_label().into());
            if let Some(d) = n.distance_m {
                properties.insert("distance_m".into(), d.into());
            }

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    n.alert.position.lon(),
                    n.alert.position.lat(),
                ]))),
                id: Some(geojson::feature::Id::String(n.alert.id.as_str().into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertId, UnixTimeMs, UserId};
    use crate::EARTH_RADIUS_M;
    use proptest::prelude::*;

    fn open_case(id: &str, lat: f64, lon: f64) -> AlertCase {
        AlertCase {
            id: AlertId(id.into()),
            position: ValidatedCoordinate::new(lat, lon).unwrap(),
            species_tag: "dog".into(),
            condition_tag: "lost".into(),
            description: "test".into(),
            address: None,
            photo: None,
            status: CaseStatus::Open,
            reporter: UserId("reporter@example.com".into()),
            created_at: UnixTimeMs(0),
            resolution: None,
        }
    }

    #[test]
    fn nearby_case_is_included() {
        let user = ValidatedCoordinate::new(-12.0500, -77.0300).unwrap();
        let case = ValidatedCoordinate::new(-12.0520, -77.0310).unwrap();
        let v = verdict(user, case);
        assert!(v.included);
        assert!(v.distance_m < 300.0);
    }

    #[test]
    fn distant_case_is_excluded() {
        let user = ValidatedCoordinate::new(-12.0500, -77.0300).unwrap();
        let case = ValidatedCoordinate::new(-12.1000, -77.1000).unwrap();
        let v = verdict(user, case);
        assert!(!v.included);
        assert!(v.distance_m > 7_000.0);
    }

    #[test]
    fn boundary_is_inclusive() {
        // Walk due north so the haversine reduces to radius times delta-lat;
        // a case a hair inside the radius is in, a hair outside is out.
        let meters_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let user = ValidatedCoordinate::new(0.0, 0.0).unwrap();

        let just_inside = ValidatedCoordinate::new(2_999.99 / meters_per_degree, 0.0).unwrap();
        let v = verdict(user, just_inside);
        assert!((v.distance_m - PROXIMITY_RADIUS_M).abs() < 0.1);
        assert!(v.included, "boundary case must be included, d={}", v.distance_m);

        let just_outside = ValidatedCoordinate::new(3_000.05 / meters_per_degree, 0.0).unwrap();
        assert!(!verdict(user, just_outside).included);
    }

    #[test]
    fn resolved_cases_never_appear() {
        let user = ValidatedCoordinate::new(-12.0500, -77.0300).unwrap();
        let mut resolved = open_case("resolved", -12.0501, -77.0301);
        resolved.status = CaseStatus::Resolved;
        let cases = vec![resolved, open_case("open", -12.0502, -77.0302)];

        let outcome = nearby_open_alerts(Some(user), &cases);
        assert_eq!(outcome.nearby.len(), 1);
        assert_eq!(outcome.nearby[0].alert.id.as_str(), "open");
    }

    #[test]
    fn no_position_bypasses_filter() {
        let cases = vec![
            open_case("near", -12.0501, -77.0301),
            open_case("far", -12.9, -77.9),
        ];
        let outcome = nearby_open_alerts(None, &cases);
        assert!(outcome.unfiltered);
        assert_eq!(outcome.nearby.len(), 2);
        assert!(outcome.nearby.iter().all(|n| n.distance_m.is_none()));
    }

    #[test]
    fn results_are_sorted_nearest_first() {
        let user = ValidatedCoordinate::new(-12.0500, -77.0300).unwrap();
        let cases = vec![
            open_case("further", -12.0600, -77.0350),
            open_case("closest", -12.0501, -77.0301),
        ];
        let outcome = nearby_open_alerts(Some(user), &cases);
        assert_eq!(outcome.nearby[0].alert.id.as_str(), "closest");
    }

    #[test]
    fn geojson_export_carries_positions_and_ids() {
        let user = ValidatedCoordinate::new(-12.0500, -77.0300).unwrap();
        let cases = vec![open_case("pin-1", -12.0520, -77.0310)];
        let outcome = nearby_open_alerts(Some(user), &cases);

        let fc = pins_as_geojson(&outcome.nearby);
        assert_eq!(fc.features.len(), 1);
        let feature = &fc.features[0];
        let Some(Geometry {
            value: Value::Point(coords),
            ..
        }) = &feature.geometry
        else {
            panic!("expected point geometry");
        };
        assert!((coords[0] - -77.0310).abs() < 1e-9);
        assert!((coords[1] - -12.0520).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn verdict_distance_is_symmetric(
            lat1 in -89.0..89.0f64, lon1 in -179.0..179.0f64,
            lat2 in -89.0..89.0f64, lon2 in -179.0..179.0f64,
        ) {
            let a = ValidatedCoordinate::new(lat1, lon1).unwrap();
            let b = ValidatedCoordinate::new(lat2, lon2).unwrap();
            let d1 = verdict(a, b).distance_m;
            let d2 = verdict(b, a).distance_m;
            prop_assert!((d1 - d2).abs() < 1e-6);
        }

        #[test]
        fn self_distance_is_zero(lat in -89.0..89.0f64, lon in -179.0..179.0f64) {
            let p = ValidatedCoordinate::new(lat, lon).unwrap();
            let v = verdict(p, p);
            prop_assert_eq!(v.distance_m, 0.0);
            prop_assert!(v.included);
        }
    }
}
