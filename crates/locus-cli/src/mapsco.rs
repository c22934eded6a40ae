use std::fmt::Write as _;
use std::time::Duration;

use isahc::prelude::*;
use isahc::Request;

use locus_geocoder::{
    AddressComponents, AddressField, Coordinate, Error, Geocoder, Location, Lookup, Placemark,
};

use crate::config::Config;

const USER_AGENT: &str = concat!("locus/", env!("CARGO_PKG_VERSION"));

/// Message maps.co returns when a reverse lookup finds nothing.
const UNABLE_TO_GEOCODE: &str = "Unable to geocode";

/// [`Geocoder`] backed by the geocode.maps.co HTTP API.
pub struct Backend {
    endpoint: Endpoint,
    timeout: Duration,
    client: isahc::HttpClient,
}

impl Backend {
    pub fn new(config: &Config) -> Result<Self, isahc::Error> {
        Ok(Self {
            endpoint: Endpoint {
                base: config.endpoint.clone(),
                api_key: config.api_key.clone(),
                max_results: config.max_results,
            },
            timeout: config.timeout,
            client: isahc::HttpClient::new()?,
        })
    }

    async fn fetch(&self, url: String) -> Result<String, Error> {
        let request = Request::get(&url)
            .timeout(self.timeout)
            .header("User-Agent", USER_AGENT)
            .body(())
            .map_err(|e| Error::backend(e.to_string()))?;

        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::backend(format!(
                "geocode.maps.co returned status {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::backend(e.to_string()))
    }

    async fn search(&self, url: String) -> Result<Vec<Placemark>, Error> {
        let body = self.fetch(url).await?;
        parse_search(&body, self.endpoint.max_results)
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<Vec<Placemark>, Error> {
        let body = self.fetch(self.endpoint.reverse(coordinate)).await?;
        parse_reverse(&body)
    }
}

impl Geocoder for Backend {
    fn geocode_address_components(&self, address: AddressComponents) -> Lookup<'_> {
        tracing::debug!(%address, "maps.co structured search");
        Box::pin(self.search(self.endpoint.structured_search(&address)))
    }

    fn geocode_address_string(&self, address: String) -> Lookup<'_> {
        tracing::debug!(%address, "maps.co search");
        Box::pin(self.search(self.endpoint.search(&address)))
    }

    fn reverse_geocode_location(&self, location: Location) -> Lookup<'_> {
        tracing::debug!(coordinate = %location.coordinate, "maps.co reverse");
        Box::pin(self.reverse(location.coordinate))
    }
}

/// Builds request URLs for one API base and key.
struct Endpoint {
    base: String,
    api_key: String,
    max_results: usize,
}

impl Endpoint {
    fn search(&self, query: &str) -> String {
        let mut url = format!("{}/search?q={}", self.base, percent_encode(query));
        self.finish(&mut url, true);
        url
    }

    fn structured_search(&self, address: &AddressComponents) -> String {
        let mut url = format!("{}/search?", self.base);
        for (i, (field, value)) in address.iter().enumerate() {
            if i > 0 {
                url.push('&');
            }
            let _ = write!(url, "{}={}", query_key(field), percent_encode(value));
        }
        self.finish(&mut url, true);
        url
    }

    fn reverse(&self, coordinate: Coordinate) -> String {
        let mut url = format!(
            "{}/reverse?lat={}&lon={}",
            self.base, coordinate.latitude, coordinate.longitude
        );
        self.finish(&mut url, false);
        url
    }

    fn finish(&self, url: &mut String, limit: bool) {
        if !url.ends_with('?') {
            url.push('&');
        }
        url.push_str("format=json&addressdetails=1");
        if limit {
            let _ = write!(url, "&limit={}", self.max_results);
        }
        let _ = write!(url, "&api_key={}", percent_encode(&self.api_key));
    }
}

const fn query_key(field: AddressField) -> &'static str {
    match field {
        AddressField::Street => "street",
        AddressField::City => "city",
        AddressField::County => "county",
        AddressField::State => "state",
        AddressField::PostalCode => "postalcode",
        AddressField::Country => "country",
    }
}

#[derive(serde::Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: Option<String>,
    #[serde(default)]
    address: Address,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ReverseResponse {
    Place(Place),
    Error { error: String },
}

#[derive(Default, serde::Deserialize)]
struct Address {
    house_number: Option<String>,
    road: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

impl Place {
    fn into_placemark(self) -> Result<Placemark, Error> {
        let latitude = self
            .lat
            .parse::<f64>()
            .map_err(|e| Error::backend(format!("invalid lat: {e}")))?;
        let longitude = self
            .lon
            .parse::<f64>()
            .map_err(|e| Error::backend(format!("invalid lon: {e}")))?;
        let address = self.address;

        let mut placemark = Placemark::new(Location::new(Coordinate::new(latitude, longitude)));
        placemark.name = self.display_name;
        placemark.sub_thoroughfare = address.house_number;
        placemark.thoroughfare = address.road;
        placemark.sub_locality = address.suburb;
        placemark.locality = address.city.or(address.town).or(address.village);
        placemark.sub_administrative_area = address.county;
        placemark.administrative_area = address.state;
        placemark.postal_code = address.postcode;
        placemark.country = address.country;
        placemark.iso_country_code = address.country_code.map(|c| c.to_uppercase());
        Ok(placemark)
    }
}

fn parse_search(body: &str, max_results: usize) -> Result<Vec<Placemark>, Error> {
    let places: Vec<Place> = serde_json::from_str(body)
        .map_err(|e| Error::backend(format!("failed to parse geocoding response: {e}")))?;
    if places.is_empty() {
        return Err(Error::NoResult);
    }
    places
        .into_iter()
        .take(max_results)
        .map(Place::into_placemark)
        .collect()
}

fn parse_reverse(body: &str) -> Result<Vec<Placemark>, Error> {
    let response: ReverseResponse = serde_json::from_str(body)
        .map_err(|e| Error::backend(format!("failed to parse reverse geocoding response: {e}")))?;
    match response {
        ReverseResponse::Place(place) => Ok(vec![place.into_placemark()?]),
        ReverseResponse::Error { error } if error == UNABLE_TO_GEOCODE => Err(Error::NoResult),
        ReverseResponse::Error { error } => Err(Error::Backend(error)),
    }
}

/// Percent-encode a string for use in a URL query parameter.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
