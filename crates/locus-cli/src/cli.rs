use clap::{Args, Parser, Subcommand};

use locus_geocoder::{AddressComponents, AddressField, Coordinate};

pub const DEFAULT_ENDPOINT: &str = "https://geocode.maps.co";

/// Forward and reverse geocoding from the command line.
#[derive(Parser, Debug)]
#[command(name = "locus", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// geocode.maps.co API key. Get a free one at geocode.maps.co.
    #[arg(long, env = "LOCUS_MAPSCO_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Base URL of the geocoding service.
    #[arg(long, env = "LOCUS_MAPSCO_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "LOCUS_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub timeout_secs: u64,

    /// Maximum number of forward geocoding results to keep.
    #[arg(long, default_value_t = 5, global = true)]
    pub max_results: usize,

    /// Print JSON lines instead of text. Implied when stdout is not a terminal.
    #[arg(long, global = true)]
    pub json: bool,

    /// Report outcomes from the controller's event stream instead of
    /// per-request callbacks.
    #[arg(long, global = true)]
    pub broadcast: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find coordinates for a free-text address.
    Geocode {
        /// Address words, e.g. 1 Infinite Loop, Cupertino.
        #[arg(required = true, num_args = 1..)]
        address: Vec<String>,
    },

    /// Find coordinates for an address given field by field.
    Address(AddressArgs),

    /// Find addresses for one or more coordinates, in order.
    ///
    /// After each result, reports which of administrative area,
    /// sub-administrative area, locality and postal code changed since the
    /// previous one.
    #[command(
        verbatim_doc_comment,
        after_long_help = r#"Examples:
  locus reverse 30.27,-97.74
  locus reverse --expect-locality Houston 30.27,-97.74 29.76,-95.37
  locus reverse --json -- -33.86,151.21"#
    )]
    Reverse {
        /// Coordinates to look up. Flags go before them, since values may
        /// start with a hyphen.
        #[arg(required = true, value_name = "LAT,LON", allow_hyphen_values = true)]
        coordinates: Vec<Coordinate>,

        /// Fail unless the last result's locality equals this name.
        #[arg(long, value_name = "NAME")]
        expect_locality: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct AddressArgs {
    #[arg(long)]
    pub street: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub county: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub postal_code: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
}

impl AddressArgs {
    #[must_use]
    pub fn components(&self) -> AddressComponents {
        let fields = [
            (AddressField::Street, &self.street),
            (AddressField::City, &self.city),
            (AddressField::County, &self.county),
            (AddressField::State, &self.state),
            (AddressField::PostalCode, &self.postal_code),
            (AddressField::Country, &self.country),
        ];
        let mut components = AddressComponents::new();
        for (field, value) in fields {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                components.insert(field, value);
            }
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocode_collects_address_words() {
        let cli = Cli::try_parse_from(["locus", "geocode", "1", "Infinite", "Loop"]).unwrap();
        let Command::Geocode { address } = cli.command else {
            panic!("expected geocode");
        };
        assert_eq!(address, ["1", "Infinite", "Loop"]);
    }

    #[test]
    fn reverse_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "locus",
            "reverse",
            "--expect-locality",
            "Austin",
            "-33.86,151.21",
            "30.27,-97.74",
        ])
        .unwrap();
        let Command::Reverse {
            coordinates,
            expect_locality,
        } = cli.command
        else {
            panic!("expected reverse");
        };
        assert_eq!(
            coordinates,
            [Coordinate::new(-33.86, 151.21), Coordinate::new(30.27, -97.74)]
        );
        assert_eq!(expect_locality.as_deref(), Some("Austin"));
    }

    #[test]
    fn reverse_rejects_bad_coordinate() {
        assert!(Cli::try_parse_from(["locus", "reverse", "95,10"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "locus",
            "geocode",
            "Austin",
            "--json",
            "--broadcast",
            "--timeout-secs",
            "3",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.broadcast);
        assert_eq!(cli.timeout_secs, 3);
    }

    #[test]
    fn address_components_skip_blank_fields() {
        let args = AddressArgs {
            street: Some("1 Infinite Loop".into()),
            city: Some("  ".into()),
            country: Some(" USA ".into()),
            ..AddressArgs::default()
        };
        let components = args.components();
        assert_eq!(components.get(AddressField::Street), Some("1 Infinite Loop"));
        assert_eq!(components.get(AddressField::City), None);
        assert_eq!(components.get(AddressField::Country), Some("USA"));
    }
}
