//! # Object Recognition DB
//!
//! CouchDB tooling for an object-recognition pipeline: creating and
//! initializing the database, turning CLI flags into connection parameters,
//! uploading meshes (with point clouds, materials and textures) as
//! attachments, and resolving which objects a command should work on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ CLI / params │──▶│  db accessor │──▶│ DocumentServer   │
//! │  (--db_*)    │   │ create/init  │   │ CouchDB | memory │
//! └──────────────┘   └──────┬───────┘   └────────▲─────────┘
//!                           │                    │
//!              ┌────────────┴──────┐             │
//!              ▼                   ▼             │
//!        ┌──────────┐        ┌────────────┐      │
//!        │   mesh   │        │ object_ids │──────┘
//!        │  upload  │        │  resolve   │  (via models)
//!        └──────────┘        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ordb init                                   # create database, sync models
//! ordb object add cup --description "a cup" --commit
//! ordb mesh upload <object_id> cup.obj --materials --commit
//! ordb ids --ids missing
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`params`] | Connection parameters and CLI translation |
//! | [`db`] | Database lookup-or-create and initialization |
//! | [`store`] | Document server abstraction (CouchDB, in-memory) |
//! | [`models`] | Object and model documents |
//! | [`mesh`] | Mesh, material and texture uploads |
//! | [`object_ids`] | `all` / `missing` / explicit id resolution |
//! | [`error`] | Error types |

pub mod config;
pub mod db;
pub mod error;
pub mod mesh;
pub mod models;
pub mod object_ids;
pub mod params;
pub mod store;
