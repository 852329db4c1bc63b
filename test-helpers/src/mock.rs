//! Seed data for the in-memory record store.
//!
//! Shared by the data-access integration tests and the dev console:
//! - `widgets`: five rows named A to E, A created most recently, so the
//!   default `created_at desc` ordering lists them alphabetically
//! - `condominiums`: three buildings
//! - `units`: 45 apartments spread over the condominiums, enough for three
//!   pages of 20

use crate::TestApp;
use jiff::SignedDuration;
use serde_json::{Value, json};

pub const WIDGETS: &str = "widgets";
pub const CONDOMINIUMS: &str = "condominiums";
pub const UNITS: &str = "units";

pub const UNIT_COUNT: usize = 45;

pub struct DevDataset {
    pub widgets: Vec<Value>,
    pub condominiums: Vec<Value>,
    pub units: Vec<Value>,
}

impl DevDataset {
    pub fn create(app: &TestApp) -> Self {
        let now = app.time_source.now();
        let created_at =
            |minutes_ago: i64| now - SignedDuration::from_mins(minutes_ago);

        tracing::info!("📦 Seeding widgets");
        let widgets: Vec<Value> = ["A", "B", "C", "D", "E"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                json!({
                    "id": format!("w-{}", i + 1),
                    "name": name,
                    "created_at": created_at(i as i64).to_string(),
                })
            })
            .collect();
        app.store.insert_many(WIDGETS, widgets.clone());

        tracing::info!("🏢 Seeding condominiums and units");
        let condominiums: Vec<Value> =
            ["Residencial Jardins", "Edifício Aurora", "Condomínio Solar"]
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    json!({
                        "id": format!("c-{}", i + 1),
                        "name": name,
                        "active": true,
                        "created_at": created_at(60 * 24 + i as i64).to_string(),
                    })
                })
                .collect();
        app.store.insert_many(CONDOMINIUMS, condominiums.clone());

        let units: Vec<Value> = (0..UNIT_COUNT)
            .map(|i| {
                let floor = i / 4 + 1;
                json!({
                    "id": format!("u-{}", i + 1),
                    "condo_id": format!("c-{}", i % 3 + 1),
                    "number": format!("{floor}{:02}", i % 4 + 1),
                    "floor": floor,
                    "created_at": created_at(i as i64).to_string(),
                })
            })
            .collect();
        app.store.insert_many(UNITS, units.clone());

        DevDataset {
            widgets,
            condominiums,
            units,
        }
    }

    /// Print a summary of the seeded collections
    pub fn print_summary(&self) {
        tracing::info!("📋 Available test data:");
        tracing::info!("   🧩 {} ({} rows): A to E", WIDGETS, self.widgets.len());
        tracing::info!(
            "   🏢 {} ({} rows)",
            CONDOMINIUMS,
            self.condominiums.len()
        );
        for condo in &self.condominiums {
            tracing::info!("      ├─ {} ({})", condo["name"], condo["id"]);
        }
        tracing::info!(
            "   🚪 {} ({} rows): filter by condo_id",
            UNITS,
            self.units.len()
        );
    }
}
