use std::fmt;

use crate::placemark::{Location, Placemark};
use crate::Error;

/// Outcome published on a controller's broadcast channel.
///
/// Only requests issued with [`Delivery::Broadcast`](crate::Delivery::Broadcast)
/// produce events.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// A reverse geocode succeeded.
    PlacemarkUpdated {
        #[serde(rename = "current-placemark")]
        current: Option<Placemark>,
        #[serde(rename = "previous-placemark")]
        previous: Option<Placemark>,
    },
    /// A forward geocode succeeded.
    LocationUpdated {
        #[serde(rename = "current-location")]
        current: Option<Location>,
    },
    /// A request of either kind failed.
    #[serde(rename = "geocode-failed")]
    Failed { error: Error },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlacemarkUpdated { current, .. } => match current {
                Some(placemark) => write!(f, "placemark updated: {placemark}"),
                None => f.write_str("placemark updated"),
            },
            Self::LocationUpdated { current } => match current {
                Some(location) => write!(f, "location updated: {}", location.coordinate),
                None => f.write_str("location updated"),
            },
            Self::Failed { error } => write!(f, "geocode failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placemark::Coordinate;

    #[test]
    fn payload_keys() {
        let austin =
            Placemark::new(Location::new(Coordinate::new(30.27, -97.74))).with_locality("Austin");
        let event = Event::PlacemarkUpdated {
            current: Some(austin),
            previous: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "placemark-updated");
        assert_eq!(json["current-placemark"]["locality"], "Austin");
        assert!(json["previous-placemark"].is_null());
    }

    #[test]
    fn failure_payload() {
        let event = Event::Failed {
            error: Error::backend("not-found"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "geocode-failed");
        assert_eq!(json["error"]["kind"], "backend");
        assert_eq!(json["error"]["message"], "not-found");
        assert_eq!(event.to_string(), "geocode failed: geocoder backend error: not-found");
    }
}
