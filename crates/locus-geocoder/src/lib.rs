pub mod backend;
pub mod controller;
pub mod event;
pub mod placemark;

use std::fmt;

pub use backend::{Geocoder, Lookup};
pub use controller::{Completion, Controller, Delivery, EventReceiver, Snapshot};
pub use event::Event;
pub use placemark::{
    AddressComponents, AddressField, Coordinate, GeocodeRequest, Location, Placemark,
    PlacemarkField, RequestKind,
};

/// Errors reported for a geocode request.
///
/// Backend failures are passed through unchanged; the controller itself
/// only produces [`Error::NoResult`] and [`Error::Cancelled`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum Error {
    /// The backend failed or rejected the lookup.
    Backend(String),
    /// The lookup finished without any placemarks.
    NoResult,
    /// The request was cancelled or superseded before it completed.
    Cancelled,
}

impl Error {
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "geocoder backend error: {msg}"),
            Self::NoResult => f.write_str("no geocoding results"),
            Self::Cancelled => f.write_str("geocode request cancelled"),
        }
    }
}

impl std::error::Error for Error {}
