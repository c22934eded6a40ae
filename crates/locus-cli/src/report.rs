use std::fmt::Write as _;

use serde_json::json;

use locus_geocoder::{Coordinate, Error, Event, Placemark, PlacemarkField};

use crate::config::Output;

/// Render the outcome of a forward lookup for `query`.
pub fn forward(output: Output, query: &str, result: &Result<Vec<Placemark>, Error>) -> String {
    match output {
        Output::Json => match result {
            Ok(placemarks) => json!({ "query": query, "results": placemarks }).to_string(),
            Err(error) => json!({ "query": query, "error": error }).to_string(),
        },
        Output::Text => match result {
            Ok(placemarks) => {
                let mut out = String::new();
                let _ = writeln!(out, "Geocoding results for \"{query}\":");
                for (i, p) in placemarks.iter().enumerate() {
                    let c = p.location.coordinate;
                    let label = p.name.clone().unwrap_or_else(|| p.to_string());
                    let _ = writeln!(
                        out,
                        "{}. {label} (lat: {}, lon: {})",
                        i + 1,
                        c.latitude,
                        c.longitude
                    );
                }
                out
            }
            Err(error) => format!("Geocoding \"{query}\" failed: {error}\n"),
        },
    }
}

/// Render the outcome of a reverse lookup, with the compared fields that
/// changed since the previous result.
pub fn reverse(
    output: Output,
    coordinate: Coordinate,
    result: &Result<Vec<Placemark>, Error>,
    changed: &[PlacemarkField],
) -> String {
    match output {
        Output::Json => match result {
            Ok(placemarks) => json!({
                "coordinate": coordinate,
                "placemark": placemarks.first(),
                "changed": changed,
            })
            .to_string(),
            Err(error) => json!({ "coordinate": coordinate, "error": error }).to_string(),
        },
        Output::Text => match result {
            Ok(placemarks) => {
                let mut out = String::new();
                match placemarks.first() {
                    Some(p) => {
                        let _ = writeln!(out, "({coordinate}) {p}");
                    }
                    None => {
                        let _ = writeln!(out, "({coordinate}) no placemark");
                    }
                }
                write_changes(&mut out, changed);
                out
            }
            Err(error) => format!("({coordinate}) reverse geocoding failed: {error}\n"),
        },
    }
}

/// Render an event received from the controller's broadcast channel, with
/// the compared fields that changed when it reports a reverse lookup.
pub fn event(output: Output, event: &Event, changed: &[PlacemarkField]) -> String {
    let placemark = matches!(event, Event::PlacemarkUpdated { .. });
    match output {
        Output::Json => {
            let mut value = serde_json::to_value(event).unwrap_or_else(
                |e| json!({ "event": "unserializable", "error": e.to_string() }),
            );
            if placemark {
                if let Some(map) = value.as_object_mut() {
                    map.insert("changed".into(), json!(changed));
                }
            }
            value.to_string()
        }
        Output::Text => {
            let mut out = format!("{event}\n");
            write_changes(&mut out, changed);
            out
        }
    }
}

fn write_changes(out: &mut String, changed: &[PlacemarkField]) {
    if !changed.is_empty() {
        let names: Vec<&str> = changed.iter().map(|f| f.as_str()).collect();
        let _ = writeln!(out, "  changed: {}", names.join(", "));
    }
}

/// Render whether the final locality matched the expected name.
pub fn locality_check(output: Output, expected: &str, matched: bool) -> String {
    match output {
        Output::Json => json!({ "expect_locality": expected, "matched": matched }).to_string(),
        Output::Text if matched => format!("locality is {expected}\n"),
        Output::Text => format!("locality is not {expected}\n"),
    }
}

#[cfg(test)]
mod tests {
    use locus_geocoder::Location;

    use super::*;

    fn austin() -> Placemark {
        Placemark::new(Location::new(Coordinate::new(30.27, -97.74)))
            .with_locality("Austin")
            .with_administrative_area("Texas")
    }

    #[test]
    fn forward_text() {
        let text = forward(Output::Text, "Austin", &Ok(vec![austin()]));
        assert_eq!(
            text,
            "Geocoding results for \"Austin\":\n1. Austin, Texas (lat: 30.27, lon: -97.74)\n"
        );
    }

    #[test]
    fn forward_json_error() {
        let line = forward(
            Output::Json,
            "1 Infinite Loop",
            &Err(Error::backend("not-found")),
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["query"], "1 Infinite Loop");
        assert_eq!(value["error"]["message"], "not-found");
    }

    #[test]
    fn reverse_text_lists_changes() {
        let text = reverse(
            Output::Text,
            Coordinate::new(30.27, -97.74),
            &Ok(vec![austin()]),
            &[PlacemarkField::Locality, PlacemarkField::PostalCode],
        );
        assert_eq!(
            text,
            "(30.27,-97.74) Austin, Texas\n  changed: locality, postal code\n"
        );
    }

    #[test]
    fn reverse_json() {
        let line = reverse(
            Output::Json,
            Coordinate::new(30.27, -97.74),
            &Ok(vec![austin()]),
            &[PlacemarkField::Locality],
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["placemark"]["locality"], "Austin");
        assert_eq!(value["changed"], json!(["locality"]));
    }

    #[test]
    fn event_json() {
        let line = event(
            Output::Json,
            &Event::Failed {
                error: Error::Cancelled,
            },
            &[],
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "geocode-failed");
        assert_eq!(value["error"]["kind"], "cancelled");
        assert!(value.get("changed").is_none());
    }

    #[test]
    fn placemark_event_lists_changes() {
        let updated = Event::PlacemarkUpdated {
            current: Some(austin()),
            previous: None,
        };
        let text = event(Output::Text, &updated, &[PlacemarkField::Locality]);
        assert_eq!(
            text,
            "placemark updated: Austin, Texas\n  changed: locality\n"
        );

        let line = event(Output::Json, &updated, &[PlacemarkField::PostalCode]);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["changed"], json!(["postal_code"]));
    }

    #[test]
    fn locality_check_text() {
        assert_eq!(
            locality_check(Output::Text, "Austin", false),
            "locality is not Austin\n"
        );
    }
}
