//! Diagnostic: authenticate against ODIS and run one search, printing the
//! raw outcome. Upstream failures are printed with their status and body.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use safar_core::search::{CabinClass, HotelSearchCriteria, RoomOccupancy, SearchCriteria, SearchSegment, Travellers};
use safar_core::supplier::SearchGateway;
use safar_core::GatewayError;
use safar_gateway::OdisClient;
use safar_store::app_config::Config;

#[derive(Parser, Debug)]
#[command(about = "Probe the ODIS supplier API")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Only fetch a token
    Auth,
    /// One-way flight search
    Flights {
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value_t = 1)]
        adults: u32,
        #[arg(long, default_value = "OMR")]
        currency: String,
    },
    /// Hotel search for one room
    Hotels {
        #[arg(long)]
        country: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        check_in: NaiveDate,
        #[arg(long)]
        check_out: NaiveDate,
        #[arg(long, default_value_t = 2)]
        adults: u32,
        #[arg(long, default_value = "OMR")]
        currency: String,
    },
}

fn report(err: GatewayError) -> anyhow::Error {
    match &err {
        GatewayError::Upstream { status, body } => {
            eprintln!("upstream status: {}", status);
            eprintln!("upstream body:   {}", body);
        }
        GatewayError::RateLimited { attempts, body } => {
            eprintln!("still rate limited after {} attempts", attempts);
            eprintln!("last body: {}", body);
        }
        _ => {}
    }
    err.into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("safar_gateway=debug").init();

    let args = Args::parse();
    let config = Config::load().context("Failed to load config")?;
    let client = OdisClient::new(
        &config.odis.base_url,
        &config.odis.username,
        &config.odis.password,
        config.odis.retry_policy(),
        config.odis.timeout(),
    )?;

    match args.command {
        Command::Auth => {
            let token = client.authenticate().await.map_err(report)?;
            println!("token acquired ({} chars)", token.len());
        }
        Command::Flights {
            origin,
            destination,
            date,
            adults,
            currency,
        } => {
            let criteria = SearchCriteria {
                segments: vec![SearchSegment {
                    origin: origin.to_ascii_uppercase(),
                    destination: destination.to_ascii_uppercase(),
                    departure_date: date,
                }],
                travellers: Travellers {
                    adult: adults,
                    child: 0,
                    infant: 0,
                },
                cabin_class: CabinClass::Economy,
                currency,
            };
            criteria.validate()?;
            let result = client.search_flights(&criteria).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Hotels {
            country,
            city,
            check_in,
            check_out,
            adults,
            currency,
        } => {
            let criteria = HotelSearchCriteria {
                country_code: country.to_ascii_uppercase(),
                city_code: city.to_ascii_uppercase(),
                check_in,
                check_out,
                rooms: vec![RoomOccupancy {
                    adults,
                    child_ages: vec![],
                }],
                currency,
            };
            criteria.validate()?;
            let result = client.search_hotels(&criteria).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
