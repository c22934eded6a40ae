use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components fall inside their valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Parses `"lat,lon"`, e.g. `"30.27,-97.74"`.
impl FromStr for Coordinate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected \"lat,lon\", got \"{s}\""))?;
        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid latitude \"{lat}\": {e}"))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid longitude \"{lon}\": {e}"))?;
        let coordinate = Self::new(latitude, longitude);
        if !coordinate.is_valid() {
            return Err(format!("coordinate {coordinate} out of range"));
        }
        Ok(coordinate)
    }
}

/// A coordinate plus the metadata that came with it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Radius of uncertainty in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// A location at `coordinate`, stamped with the current time.
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude: None,
            horizontal_accuracy: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn with_altitude(mut self, meters: f64) -> Self {
        self.altitude = Some(meters);
        self
    }

    #[must_use]
    pub const fn with_horizontal_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = Some(meters);
        self
    }
}

/// A structured geocoding result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Placemark {
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Street name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoroughfare: Option<String>,
    /// House number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_thoroughfare: Option<String>,
    /// City or town.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_locality: Option<String>,
    /// State or province.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative_area: Option<String>,
    /// County.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_administrative_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_country_code: Option<String>,
}

impl Placemark {
    /// A placemark at `location` with every address field empty.
    #[must_use]
    pub const fn new(location: Location) -> Self {
        Self {
            location,
            name: None,
            thoroughfare: None,
            sub_thoroughfare: None,
            locality: None,
            sub_locality: None,
            administrative_area: None,
            sub_administrative_area: None,
            postal_code: None,
            country: None,
            iso_country_code: None,
        }
    }

    #[must_use]
    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = Some(locality.into());
        self
    }

    #[must_use]
    pub fn with_administrative_area(mut self, area: impl Into<String>) -> Self {
        self.administrative_area = Some(area.into());
        self
    }

    #[must_use]
    pub fn with_sub_administrative_area(mut self, area: impl Into<String>) -> Self {
        self.sub_administrative_area = Some(area.into());
        self
    }

    #[must_use]
    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }

    /// Value of one of the compared fields.
    #[must_use]
    pub fn field(&self, field: PlacemarkField) -> Option<&str> {
        match field {
            PlacemarkField::AdministrativeArea => self.administrative_area.as_deref(),
            PlacemarkField::SubAdministrativeArea => self.sub_administrative_area.as_deref(),
            PlacemarkField::Locality => self.locality.as_deref(),
            PlacemarkField::PostalCode => self.postal_code.as_deref(),
        }
    }
}

impl fmt::Display for Placemark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            self.sub_thoroughfare.as_deref(),
            self.thoroughfare.as_deref(),
            self.locality.as_deref(),
            self.administrative_area.as_deref(),
            self.postal_code.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            match &self.name {
                Some(name) => f.write_str(name),
                None => write!(f, "({})", self.location.coordinate),
            }
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Address fields compared between the current and previous placemark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacemarkField {
    AdministrativeArea,
    SubAdministrativeArea,
    Locality,
    PostalCode,
}

impl PlacemarkField {
    pub const ALL: [Self; 4] = [
        Self::AdministrativeArea,
        Self::SubAdministrativeArea,
        Self::Locality,
        Self::PostalCode,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdministrativeArea => "administrative area",
            Self::SubAdministrativeArea => "sub-administrative area",
            Self::Locality => "locality",
            Self::PostalCode => "postal code",
        }
    }
}

impl fmt::Display for PlacemarkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component of a structured street address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    Street,
    City,
    County,
    State,
    PostalCode,
    Country,
}

impl AddressField {
    pub const ALL: [Self; 6] = [
        Self::Street,
        Self::City,
        Self::County,
        Self::State,
        Self::PostalCode,
        Self::Country,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Street => "street",
            Self::City => "city",
            Self::County => "county",
            Self::State => "state",
            Self::PostalCode => "postal_code",
            Self::Country => "country",
        }
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A street address split into components.
///
/// Contents are not validated here; a backend rejects what it cannot use.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AddressComponents(BTreeMap<AddressField, String>);

impl AddressComponents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, field: AddressField, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: AddressField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    #[must_use]
    pub fn get(&self, field: AddressField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AddressField, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl fmt::Display for AddressComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.values().map(String::as_str).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Which kind of lookup a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    ForwardAddressComponents,
    ForwardAddressString,
    ReverseLocation,
}

impl RequestKind {
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::ReverseLocation)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ForwardAddressComponents => "forward-address-components",
            Self::ForwardAddressString => "forward-address-string",
            Self::ReverseLocation => "reverse-location",
        })
    }
}

/// Input for a single lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeRequest {
    AddressComponents(AddressComponents),
    AddressString(String),
    Location(Location),
}

impl GeocodeRequest {
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::AddressComponents(_) => RequestKind::ForwardAddressComponents,
            Self::AddressString(_) => RequestKind::ForwardAddressString,
            Self::Location(_) => RequestKind::ReverseLocation,
        }
    }
}

impl fmt::Display for GeocodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressComponents(address) => write!(f, "{address}"),
            Self::AddressString(address) => f.write_str(address),
            Self::Location(location) => write!(f, "{}", location.coordinate),
        }
    }
}
