use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use delivery::{DeliveryOrchestrator, InventoryLedger};
use shared::domain::{DeliveryAction, FacilityId, RouteId, RouteStatus};
use storage::{NewRoute, Storage};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://deliveries.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateFacility {
        name: String,
        #[arg(long, default_value_t = 0.0)]
        level_kg: f64,
    },
    CreateRoute {
        load_kg: f64,
        #[arg(long)]
        destination: Option<i64>,
        /// Defaults to the full load when a destination is given.
        #[arg(long)]
        pending_kg: Option<f64>,
        #[arg(long, default_value = "scheduled")]
        status: String,
    },
    Start {
        route_id: i64,
    },
    Complete {
        route_id: i64,
    },
    ShowRoute {
        route_id: i64,
    },
    ShowFacility {
        facility_id: i64,
    },
    /// Applies a signed delta to a facility level; negative values record departures.
    AdjustFacility {
        facility_id: i64,
        #[arg(allow_negative_numbers = true)]
        delta_kg: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateFacility { name, level_kg } => {
            let facility_id = storage.create_facility(&name, level_kg).await?;
            println!("created facility_id={facility_id}");
        }
        Command::CreateRoute {
            load_kg,
            destination,
            pending_kg,
            status,
        } => {
            let status = status.parse::<RouteStatus>()?;
            let mut route = NewRoute::scheduled(load_kg, destination.map(FacilityId))
                .with_status(status);
            if let Some(pending_kg) = pending_kg {
                route.pending_delivery_kg = pending_kg;
            }
            let route_id = storage.create_route(&route).await?;
            println!("created route_id={route_id}");
        }
        Command::Start { route_id } => {
            run_action(&storage, DeliveryAction::Start, RouteId(route_id)).await?;
        }
        Command::Complete { route_id } => {
            run_action(&storage, DeliveryAction::Complete, RouteId(route_id)).await?;
        }
        Command::ShowRoute { route_id } => {
            let route = storage
                .load_route(RouteId(route_id))
                .await?
                .ok_or_else(|| anyhow!("route {route_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&route)?);
        }
        Command::ShowFacility { facility_id } => {
            let facility = storage
                .load_facility(FacilityId(facility_id))
                .await?
                .ok_or_else(|| anyhow!("facility {facility_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&facility)?);
        }
        Command::AdjustFacility {
            facility_id,
            delta_kg,
        } => {
            let level_kg = InventoryLedger
                .apply_delta_standalone(&storage, FacilityId(facility_id), delta_kg)
                .await?;
            println!("facility_id={facility_id} level_kg={level_kg}");
        }
    }

    Ok(())
}

async fn run_action(storage: &Storage, action: DeliveryAction, route_id: RouteId) -> Result<()> {
    let outcome = DeliveryOrchestrator::new(storage.clone())
        .execute(action, route_id)
        .await?;
    println!("{}", outcome.message());
    Ok(())
}
