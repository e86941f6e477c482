//! # Database Access
//!
//! Connection pooling and the embedded schema migrations.
//!
//! ## Key Components
//!
//! - [`connection`] - Pool construction from the `database` configuration section
//! - [`migrations`] - Optional schema setup for self-contained deployments and tests
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gatewatch_core::config::DatabaseConfig;
//! use gatewatch_core::database::{DatabaseConnection, DatabaseMigrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! DatabaseMigrations::run_all(db.pool()).await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use migrations::{DatabaseMigrations, MIGRATOR};
