use std::future::Future;
use std::pin::Pin;

use crate::placemark::{AddressComponents, Location, Placemark};
use crate::Error;

/// A pending lookup returned by a [`Geocoder`].
pub type Lookup<'a> = Pin<Box<dyn Future<Output = Result<Vec<Placemark>, Error>> + Send + 'a>>;

/// A geocoding service that resolves addresses to placemarks and back.
///
/// Dropping a [`Lookup`] before it resolves abandons the request.
pub trait Geocoder: Send + Sync + 'static {
    /// Forward geocode a structured address.
    fn geocode_address_components(&self, address: AddressComponents) -> Lookup<'_>;

    /// Forward geocode a free-text address.
    fn geocode_address_string(&self, address: String) -> Lookup<'_>;

    /// Reverse geocode a location into placemarks.
    fn reverse_geocode_location(&self, location: Location) -> Lookup<'_>;

    /// Abort whatever the backend still has in flight.
    ///
    /// Backends whose work stops when the [`Lookup`] is dropped can rely on
    /// the default.
    fn cancel(&self) {}
}
