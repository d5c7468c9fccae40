// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! ParkEasy command-line client
//!
//! Signs in against the identity provider, reconciles the backend session
//! and reads parking data through the cache. Results go to stdout as JSON;
//! logs go to stderr.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use parkeasy_client::{
    config::Config,
    models::{Coordinates, ParkingListing, PhoneChallenge, RegistrationProfile},
    services::AuthResult,
    AppState,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parkeasy", version, about = "ParkEasy client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with an email and secret, or start a phone challenge
    SignIn {
        identifier: String,
        #[arg(long, env = "PARKEASY_SECRET", default_value = "", hide_env_values = true)]
        secret: String,
    },
    /// Confirm a phone challenge with the received code
    Confirm {
        #[arg(long)]
        verification_id: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        code: String,
    },
    /// Create an account
    SignUp(SignUpArgs),
    SignOut,
    /// Show the current session
    Status,
    /// Force a new identity token
    Refresh,
    /// List parkings
    Parkings(ParkingArgs),
    /// List the signed-in user's vehicles
    Vehicles,
    /// List the signed-in user's bookings
    Bookings {
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Search cached listings by name, description or address
    Search {
        query: Option<String>,
    },
    /// Toggle a favorite parking, or list favorites without an id
    Favorite {
        id: Option<String>,
    },
    /// Warm the listing cache and report its approximate size
    CacheSize,
}

#[derive(Args)]
struct SignUpArgs {
    identifier: String,
    #[arg(long, env = "PARKEASY_SECRET", default_value = "", hide_env_values = true)]
    secret: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: Option<String>,
}

#[derive(Args)]
struct ParkingArgs {
    #[arg(long, conflicts_with_all = ["city", "near"])]
    id: Option<String>,
    #[arg(long, conflicts_with = "near")]
    city: Option<String>,
    /// "lat,lng"
    #[arg(long, value_parser = parse_lat_lng)]
    near: Option<Coordinates>,
    /// Search radius in meters for --near
    #[arg(long, requires = "near")]
    radius: Option<f64>,
}

fn parse_lat_lng(s: &str) -> Result<Coordinates, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| "expected \"lat,lng\"".to_string())?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude {lat:?}"))?;
    let lng: f64 = lng.trim().parse().map_err(|_| format!("invalid longitude {lng:?}"))?;
    Coordinates::new(lat, lng).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let missing = config.missing_keys();
    if !missing.is_empty() {
        bail!("Missing configuration: {}", missing.join(", "));
    }

    let state = AppState::new(config)?;
    run(&state, cli.command).await
}

async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    let session = &state.session;

    match command {
        Command::SignIn { identifier, secret } => {
            report(session.sign_in(&identifier, &secret).await)
        }
        Command::Confirm {
            verification_id,
            phone,
            code,
        } => {
            let challenge = PhoneChallenge {
                verification_id,
                phone_number: phone,
            };
            report(session.confirm_challenge(&challenge, &code).await)
        }
        Command::SignUp(args) => {
            let profile = RegistrationProfile {
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                phone_number: None,
            };
            report(session.sign_up(&args.identifier, &args.secret, profile).await)
        }
        Command::SignOut => report(session.sign_out().await),
        Command::Status => {
            let restored = session.restore().await;
            let snapshot = session.snapshot();
            print_json(&json!({
                "state": snapshot.state,
                "authenticated": session.is_authenticated().await,
                "user": snapshot.user,
                "error": restored.error,
            }))
        }
        Command::Refresh => {
            session.restore().await;
            report(session.refresh_token().await)
        }
        Command::Parkings(args) => {
            session.restore().await;
            let parking = &state.parking;
            let listings = if let Some(id) = args.id {
                vec![parking.parking_by_id(&id).await?]
            } else if let Some(city) = args.city {
                parking.parkings_by_city(&city).await?
            } else if let Some(origin) = args.near {
                parking
                    .nearby_parkings(origin.latitude, origin.longitude, args.radius)
                    .await?
            } else {
                parking.parkings().await?
            };
            print_json(&listings.iter().map(listing_json).collect::<Vec<_>>())
        }
        Command::Vehicles => {
            require_session(state).await?;
            print_json(&state.account.vehicles().await?)
        }
        Command::Bookings { offset, limit } => {
            require_session(state).await?;
            print_json(&state.account.my_bookings(offset, limit).await?)
        }
        Command::Search { query } => {
            session.restore().await;
            let parking = &state.parking;
            match query {
                Some(query) => {
                    let listings = parking.search(&query).await?;
                    print_json(&listings.iter().map(listing_json).collect::<Vec<_>>())
                }
                None => print_json(&parking.recent_searches().await?),
            }
        }
        Command::Favorite { id } => {
            session.restore().await;
            let parking = &state.parking;
            match id {
                Some(id) => {
                    let favorite = parking.toggle_favorite(&id).await?;
                    print_json(&json!({ "id": id, "favorite": favorite }))
                }
                None => {
                    let listings = parking.favorites().await?;
                    print_json(&listings.iter().map(listing_json).collect::<Vec<_>>())
                }
            }
        }
        Command::CacheSize => {
            session.restore().await;
            let listings = state.parking.parkings().await?;
            print_json(&json!({
                "listings": listings.len(),
                "entries": state.parking.cache().len(),
                "bytes": state.parking.size_estimate(),
            }))
        }
    }
}

async fn require_session(state: &AppState) -> anyhow::Result<()> {
    let result = state.session.restore().await;
    if state.session.is_authenticated().await {
        return Ok(());
    }
    let message = result
        .error
        .map(|e| e.display_message().to_string())
        .unwrap_or_else(|| "Not signed in".to_string());
    Err(anyhow!(message))
}

fn listing_json(listing: &ParkingListing) -> serde_json::Value {
    let capacity = listing.capacity();
    let shape = match listing {
        ParkingListing::Current(_) => "current",
        ParkingListing::Legacy(_) => "legacy",
    };
    json!({
        "id": listing.id(),
        "name": listing.name(),
        "shape": shape,
        "address": listing.address_line(),
        "location": listing.location(),
        "availableSpaces": capacity.available,
        "totalSpaces": capacity.total,
    })
}

fn report(result: AuthResult) -> anyhow::Result<()> {
    print_json(&result)?;
    match result.error {
        Some(failure) if !result.success => Err(anyhow!(failure.display_message().to_string())),
        _ => Ok(()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize structured JSON logging on stderr.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parkeasy_client=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
