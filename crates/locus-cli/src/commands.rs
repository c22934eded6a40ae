use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use exn::ResultExt;

use locus_geocoder::{
    Controller, Coordinate, Delivery, Event, EventReceiver, GeocodeRequest, Location, Placemark,
    PlacemarkField,
};

use crate::cli::{Cli, Command};
use crate::config::{Config, Output};
use crate::{mapsco, report};

/// Errors that stop a command before all lookups ran.
#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

/// Where request outcomes are read from.
enum Source {
    Callback,
    Events(EventReceiver),
}

/// Run the parsed command. Returns whether every lookup succeeded.
pub async fn run(cli: Cli) -> exn::Result<bool, Error> {
    let config = Config::from_cli(&cli).or_raise(|| Error("load configuration".into()))?;
    let backend =
        mapsco::Backend::new(&config).or_raise(|| Error("create HTTP client".into()))?;
    let controller = Controller::new(backend);
    let mut source = if config.broadcast {
        Source::Events(controller.events())
    } else {
        Source::Callback
    };
    tracing::debug!(endpoint = %config.endpoint, broadcast = config.broadcast, "controller ready");
    let mut out = std::io::stdout();

    match cli.command {
        Command::Geocode { address } => {
            let address = address.join(" ");
            let request = GeocodeRequest::AddressString(address.clone());
            forward(&controller, &mut source, config.output, &address, request, &mut out).await
        }
        Command::Address(args) => {
            let components = args.components();
            if components.is_empty() {
                exn::bail!(Error("address needs at least one field".into()));
            }
            let query = components.to_string();
            let request = GeocodeRequest::AddressComponents(components);
            forward(&controller, &mut source, config.output, &query, request, &mut out).await
        }
        Command::Reverse {
            coordinates,
            expect_locality,
        } => {
            let mut ok =
                reverse(&controller, &mut source, config.output, &coordinates, &mut out).await?;
            if let Some(expected) = expect_locality {
                let matched = controller.is_locality_equal_to(&expected);
                emit(&mut out, report::locality_check(config.output, &expected, matched))?;
                ok &= matched;
            }
            Ok(ok)
        }
    }
}

async fn forward(
    controller: &Controller,
    source: &mut Source,
    output: Output,
    query: &str,
    request: GeocodeRequest,
    out: &mut impl Write,
) -> exn::Result<bool, Error> {
    match source {
        Source::Callback => {
            let result = with_callback(controller, request).await;
            emit(out, report::forward(output, query, &result))?;
            Ok(result.is_ok())
        }
        Source::Events(events) => {
            let event = with_broadcast(controller, events, request).await?;
            emit(out, report::event(output, &event, &[]))?;
            Ok(!matches!(event, Event::Failed { .. }))
        }
    }
}

async fn reverse(
    controller: &Controller,
    source: &mut Source,
    output: Output,
    coordinates: &[Coordinate],
    out: &mut impl Write,
) -> exn::Result<bool, Error> {
    let mut ok = true;
    for &coordinate in coordinates {
        let request = GeocodeRequest::Location(Location::new(coordinate));
        match source {
            Source::Callback => {
                let result = with_callback(controller, request).await;
                let changed = if result.is_ok() {
                    changed_fields(controller)
                } else {
                    Vec::new()
                };
                emit(out, report::reverse(output, coordinate, &result, &changed))?;
                ok &= result.is_ok();
            }
            Source::Events(events) => {
                let event = with_broadcast(controller, events, request).await?;
                let changed = if matches!(event, Event::PlacemarkUpdated { .. }) {
                    changed_fields(controller)
                } else {
                    Vec::new()
                };
                emit(out, report::event(output, &event, &changed))?;
                ok &= !matches!(event, Event::Failed { .. });
            }
        }
    }
    Ok(ok)
}

/// Compared fields that differ between the current and previous placemark.
///
/// Empty until there is a previous placemark to compare against.
fn changed_fields(controller: &Controller) -> Vec<PlacemarkField> {
    if controller.previous_placemark().is_none() {
        return Vec::new();
    }
    PlacemarkField::ALL
        .into_iter()
        .filter(|&field| controller.did_change(field))
        .collect()
}

async fn with_callback(
    controller: &Controller,
    request: GeocodeRequest,
) -> Result<Vec<Placemark>, locus_geocoder::Error> {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    let delivery = Delivery::callback(move |result| {
        *sink.lock().expect("poisoned") = Some(result);
    });
    controller.request(request, delivery).await;
    let result = slot.lock().expect("poisoned").take();
    result.unwrap_or(Err(locus_geocoder::Error::Cancelled))
}

async fn with_broadcast(
    controller: &Controller,
    events: &mut EventReceiver,
    request: GeocodeRequest,
) -> exn::Result<Event, Error> {
    controller.request(request, Delivery::Broadcast).await;
    events
        .recv()
        .await
        .or_raise(|| Error("read controller event".into()))
}

fn emit(out: &mut impl Write, text: String) -> exn::Result<(), Error> {
    out.write_all(line(text).as_bytes())
        .or_raise(|| Error("write report".into()))
}

/// Terminate a report with a newline unless it already has one.
fn line(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use futures_lite::future::block_on;
    use locus_geocoder::{AddressComponents, Geocoder, Lookup};

    use super::*;

    type Outcome = Result<Vec<Placemark>, locus_geocoder::Error>;

    /// Backend that answers every lookup from a queue, in order.
    struct Replies(Mutex<VecDeque<Outcome>>);

    impl Replies {
        fn new(replies: impl IntoIterator<Item = Outcome>) -> Self {
            Self(Mutex::new(replies.into_iter().collect()))
        }

        fn next(&self) -> Lookup<'_> {
            let reply = self.0.lock().unwrap().pop_front();
            Box::pin(async move {
                reply.unwrap_or_else(|| Err(locus_geocoder::Error::backend("no reply")))
            })
        }
    }

    impl Geocoder for Replies {
        fn geocode_address_components(&self, _: AddressComponents) -> Lookup<'_> {
            self.next()
        }

        fn geocode_address_string(&self, _: String) -> Lookup<'_> {
            self.next()
        }

        fn reverse_geocode_location(&self, _: Location) -> Lookup<'_> {
            self.next()
        }
    }

    fn austin() -> Placemark {
        Placemark::new(Location::new(Coordinate::new(30.27, -97.74)))
            .with_locality("Austin")
            .with_sub_administrative_area("Travis County")
            .with_administrative_area("Texas")
            .with_postal_code("78701")
    }

    fn houston() -> Placemark {
        Placemark::new(Location::new(Coordinate::new(29.76, -95.37)))
            .with_locality("Houston")
            .with_sub_administrative_area("Harris County")
            .with_administrative_area("Texas")
            .with_postal_code("77002")
    }

    const COORDINATES: [Coordinate; 2] = [
        Coordinate {
            latitude: 30.27,
            longitude: -97.74,
        },
        Coordinate {
            latitude: 29.76,
            longitude: -95.37,
        },
    ];

    fn json_lines(out: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn reverse_reports_changes_from_callbacks() {
        let controller = Controller::new(Replies::new([Ok(vec![austin()]), Ok(vec![houston()])]));
        let mut out = Vec::new();
        let ok = block_on(reverse(
            &controller,
            &mut Source::Callback,
            Output::Text,
            &COORDINATES,
            &mut out,
        ))
        .unwrap();

        assert!(ok);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "(30.27,-97.74) Austin, Texas, 78701\n\
             (29.76,-95.37) Houston, Texas, 77002\n  \
             changed: sub-administrative area, locality, postal code\n"
        );
    }

    #[test]
    fn reverse_reports_changes_from_events() {
        let controller = Controller::new(Replies::new([Ok(vec![austin()]), Ok(vec![houston()])]));
        let mut source = Source::Events(controller.events());
        let mut out = Vec::new();
        let ok = block_on(reverse(
            &controller,
            &mut source,
            Output::Json,
            &COORDINATES,
            &mut out,
        ))
        .unwrap();

        assert!(ok);
        let lines = json_lines(&out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "placemark-updated");
        assert_eq!(lines[0]["changed"], serde_json::json!([]));
        assert_eq!(lines[1]["current-placemark"]["locality"], "Houston");
        assert_eq!(lines[1]["previous-placemark"]["locality"], "Austin");
        assert_eq!(
            lines[1]["changed"],
            serde_json::json!(["sub_administrative_area", "locality", "postal_code"])
        );
    }

    #[test]
    fn reverse_failure_is_reported_and_not_ok() {
        let controller = Controller::new(Replies::new([
            Ok(vec![austin()]),
            Err(locus_geocoder::Error::NoResult),
        ]));
        let mut source = Source::Events(controller.events());
        let mut out = Vec::new();
        let ok = block_on(reverse(
            &controller,
            &mut source,
            Output::Text,
            &COORDINATES,
            &mut out,
        ))
        .unwrap();

        assert!(!ok);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "placemark updated: Austin, Texas, 78701\n\
             geocode failed: no geocoding results\n"
        );
        assert!(controller.is_locality_equal_to("Austin"));
    }

    #[test]
    fn forward_with_callback() {
        let controller = Controller::new(Replies::new([Ok(vec![austin()])]));
        let mut out = Vec::new();
        let ok = block_on(forward(
            &controller,
            &mut Source::Callback,
            Output::Json,
            "Austin",
            GeocodeRequest::AddressString("Austin".into()),
            &mut out,
        ))
        .unwrap();

        assert!(ok);
        let lines = json_lines(&out);
        assert_eq!(lines[0]["query"], "Austin");
        assert_eq!(lines[0]["results"][0]["locality"], "Austin");
        assert_eq!(
            controller.current_location().unwrap().coordinate,
            COORDINATES[0]
        );
    }

    #[test]
    fn forward_failure_from_events() {
        let controller = Controller::new(Replies::new([Err(locus_geocoder::Error::backend(
            "not-found",
        ))]));
        let mut source = Source::Events(controller.events());
        let mut out = Vec::new();
        let ok = block_on(forward(
            &controller,
            &mut source,
            Output::Json,
            "1 Infinite Loop",
            GeocodeRequest::AddressString("1 Infinite Loop".into()),
            &mut out,
        ))
        .unwrap();

        assert!(!ok);
        let lines = json_lines(&out);
        assert_eq!(lines[0]["event"], "geocode-failed");
        assert_eq!(lines[0]["error"]["message"], "not-found");
        assert!(lines[0].get("changed").is_none());
        assert!(controller.current_location().is_none());
    }

    #[test]
    fn reports_end_in_one_newline() {
        assert_eq!(line("{}".into()), "{}\n");
        assert_eq!(line("done\n".into()), "done\n");
    }
}
