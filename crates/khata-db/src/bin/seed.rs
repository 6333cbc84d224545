//! # Seed Data Generator
//!
//! Populates the database with demo clients, products, and stock for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed into ./khata.db (default)
//! cargo run -p khata-db --bin seed
//!
//! # Specify database path and client count
//! cargo run -p khata-db --bin seed -- --db ./data/khata.db --clients 50
//! ```
//!
//! ## Generated Data
//! - Clients with shop-style names and phone numbers
//! - A small staple-goods product catalogue
//! - Random opening stock per product (0 - 200 units)

use std::env;

use khata_core::{Money, NewClient, NewProduct};
use khata_db::{Database, DbConfig};

/// Shop-style name fragments for demo clients.
const SHOP_NAMES: &[&str] = &[
    "Madina", "Bismillah", "Al-Karam", "Rehman", "Data", "Makkah", "Punjab", "Chenab", "Noor",
    "Sadiq",
];

const SHOP_KINDS: &[&str] = &["Store", "Traders", "Karyana", "Mart", "Brothers", "& Sons"];

/// Staple-goods catalogue: (name, weight_kg, price in paisa).
const PRODUCTS: &[(&str, f64, i64)] = &[
    ("Sugar 1kg", 1.0, 18_500),
    ("Flour 10kg", 10.0, 128_000),
    ("Rice 5kg", 5.0, 165_000),
    ("Cooking Oil 1L", 0.9, 58_000),
    ("Milk 1L", 1.0, 22_000),
    ("Yogurt 500g", 0.5, 14_000),
    ("Tea 950g", 0.95, 130_000),
    ("Salt 800g", 0.8, 6_000),
    ("Lentils 1kg", 1.0, 42_000),
    ("Ghee 1kg", 1.0, 95_000),
];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let db_path = flag_value(&args, "--db").unwrap_or_else(|| "./khata.db".to_string());
    let client_count: usize = flag_value(&args, "--clients")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    tracing::info!(db_path, client_count, "Seeding demo data");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .expect("failed to open database");

    let mut clients = 0usize;
    for (i, name) in shop_names().take(client_count).enumerate() {
        let result = db
            .clients()
            .insert(NewClient {
                name,
                phone: Some(format!("0300-{:07}", 1_000_000 + i as u32)),
                address: Some(format!("Shop {}, Main Bazaar", i + 1)),
            })
            .await;
        if result.is_ok() {
            clients += 1;
        }
    }

    let mut products = 0usize;
    for (i, (name, weight_kg, price)) in PRODUCTS.iter().enumerate() {
        let inserted = db
            .products()
            .insert(NewProduct {
                name: name.to_string(),
                weight_kg: *weight_kg,
                price: Money::from_paisa(*price),
            })
            .await;

        if let Ok(product) = inserted {
            // Deterministic pseudo-random opening stock.
            let stock = ((i * 37 + 11) % 200) as i64;
            db.stock()
                .set(&product.id, stock)
                .await
                .expect("failed to set opening stock");
            products += 1;
        }
    }

    tracing::info!(clients, products, "Seed complete");
    db.close().await;
}

/// Unique shop names from the fragment tables.
fn shop_names() -> impl Iterator<Item = String> {
    SHOP_KINDS.iter().flat_map(|kind| {
        SHOP_NAMES
            .iter()
            .map(move |name| format!("{} {}", name, kind))
    })
}

/// Naive `--flag value` lookup; clap would be overkill for a dev seeder.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
