//! # Seed Data Generator
//!
//! Populates a fresh till database with an admin, a clerk and a sneaker
//! catalog for development.
//!
//! ## Usage
//! ```bash
//! # Default catalog into ./kicks_dev.db
//! cargo run -p kicks-db --bin seed
//!
//! # Only the first 20 products
//! cargo run -p kicks-db --bin seed -- --count 20
//!
//! # Specify database path
//! cargo run -p kicks-db --bin seed -- --db ./data/kicks.db
//! ```
//!
//! Every product is created through the kardex, so each one with opening
//! stock gets its `initial` movement. PINs are `1234` (admin) and `0000`
//! (clerk).

use std::env;

use kicks_core::{Actor, NewProduct, UserRole};
use kicks_db::{Database, DbConfig};

/// (brand, models, base price in cents)
const BRANDS: &[(&str, &[&str], i64)] = &[
    ("Nike", &["Air Max 90", "Air Force 1", "Dunk Low", "Cortez", "Blazer Mid"], 11999),
    ("Adidas", &["Samba OG", "Gazelle", "Superstar", "Stan Smith", "Forum Low"], 9999),
    ("New Balance", &["550", "574", "990v6", "2002R"], 10999),
    ("Vans", &["Old Skool", "Sk8-Hi", "Authentic", "Era"], 6999),
    ("Converse", &["Chuck 70 Hi", "Chuck Taylor Ox", "Run Star Hike"], 7499),
];

const SIZES: &[&str] = &["38", "39", "40", "41", "42", "43", "44"];

const CATEGORIES: &[&str] = &["lifestyle", "running", "skate", "basketball"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = usize::MAX;
    let mut db_path = String::from("./kicks_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kicks POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Maximum products to generate (default: all)");
                println!("  -d, --db <PATH>    Database file path (default: ./kicks_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kicks POS Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let admin = db.users().insert("Admin", "1234", UserRole::Admin).await?;
    db.users().insert("Clerk", "0000", UserRole::Sales).await?;
    println!("✓ Created users (admin PIN 1234, clerk PIN 0000)");

    let actor: Actor = admin.actor();
    let mut generated = 0;
    let mut movements = 0;
    let start = std::time::Instant::now();

    'outer: for (brand_idx, (brand, models, base_price)) in BRANDS.iter().enumerate() {
        for (model_idx, model) in models.iter().enumerate() {
            for (size_idx, size) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = brand_idx * 100 + model_idx * 10 + size_idx;
                let product = generate_product(brand, model, size, *base_price, seed);

                match db.stock().create_product(&product, &actor).await {
                    Ok((_, movement)) => {
                        generated += 1;
                        movements += usize::from(movement.is_some());
                    }
                    Err(e) => eprintln!("Failed to insert {}: {}", product.name, e),
                }
            }
        }
    }

    println!();
    println!(
        "✓ Generated {} products ({} opening movements) in {:?}",
        generated,
        movements,
        start.elapsed()
    );
    println!("✓ Seed complete!");

    Ok(())
}

fn generate_product(brand: &str, model: &str, size: &str, base_price: i64, seed: usize) -> NewProduct {
    // stock 0..=8
    let stock = (seed * 7 % 9) as i64;
    // Small spread so variants are not all priced alike
    let price_cents = base_price + ((seed * 13) % 5) as i64 * 500;

    NewProduct {
        name: format!("{} {} {}", brand, model, size),
        price_cents,
        category: Some(CATEGORIES[seed % CATEGORIES.len()].to_string()),
        brand: Some(brand.to_string()),
        size: Some(size.to_string()),
        image: None,
        stock,
    }
}
