//! # Object Recognition DB CLI (`ordb`)
//!
//! Command-line access to the object-recognition CouchDB database.
//!
//! ## Usage
//!
//! ```bash
//! ordb [--config ordb.toml] [--db_type CouchDB] [--db_root URL] [--db_collection NAME] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ordb init` | Create the database if needed and install model indexes |
//! | `ordb params` | Print the resolved connection parameters as JSON |
//! | `ordb object add <name>` | Add an object document |
//! | `ordb mesh upload <object_id> <file>` | Attach a mesh (and companions) to the object's mesh model |
//! | `ordb ids --ids <sel> --names <sel>` | Resolve a selection to object ids |
//!
//! Write commands only print what they would do unless `--commit` is given.
//!
//! ## Examples
//!
//! ```bash
//! # Use a remote server and a custom database
//! ordb --db_root http://couch:5984 --db_collection objects init
//!
//! # Upload a textured mesh
//! ordb mesh upload 9a1f... models/cup.obj --cloud cup.ply --materials --commit
//!
//! # Every object that has no model yet
//! ordb ids --ids missing
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use object_recognition_db::config;
use object_recognition_db::db;
use object_recognition_db::mesh::{self, MeshUpload};
use object_recognition_db::models::ObjectDoc;
use object_recognition_db::object_ids::{self, Selector};
use object_recognition_db::params::{args_to_db_params, DbArgs};

/// Object Recognition DB CLI: CouchDB tooling for the object-recognition
/// pipeline.
///
/// Connection settings come from the `--db_*` flags, then `--db_param`
/// overrides, with defaults from the optional `--config` file.
#[derive(Parser)]
#[command(
    name = "ordb",
    about = "Object Recognition DB: create databases, upload meshes, and resolve object ids",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional. Supplies `[db]` defaults and `[couchdb]` client settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database.
    ///
    /// Creates the collection if it does not exist and installs the model
    /// indexes. Running it again is safe.
    Init,

    /// Print the connection parameters the other commands would use.
    Params,

    /// Manage object documents.
    Object {
        #[command(subcommand)]
        action: ObjectAction,
    },

    /// Manage mesh models.
    Mesh {
        #[command(subcommand)]
        action: MeshAction,
    },

    /// Resolve an object selection to object ids, one per line.
    Ids {
        /// `all`, `missing`, or a list such as `["id1", "id2"]`.
        #[arg(long, default_value = "")]
        ids: String,

        /// `all`, `missing`, or a list of object names.
        #[arg(long, default_value = "")]
        names: String,
    },
}

/// Object subcommands.
#[derive(Subcommand)]
enum ObjectAction {
    /// Add a new object document.
    Add {
        /// Object name (e.g. `coke_can`).
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Tag for the object; repeat for several.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value = "")]
        author_name: String,

        #[arg(long, default_value = "")]
        author_email: String,

        /// Commit the data to the database.
        #[arg(long)]
        commit: bool,
    },
}

/// Mesh subcommands.
#[derive(Subcommand)]
enum MeshAction {
    /// Upload a mesh to the object's `mesh` model.
    ///
    /// The original file is stored as `original.<ext>`; `--cloud` and
    /// `--mesh` become `cloud.ply` and `mesh.stl`. With `--materials`, an
    /// `.obj` file's `mtllib` material and its `map_Kd` textures are
    /// uploaded too, resolved against the current directory.
    Upload {
        /// Id of the object document.
        object_id: String,

        /// Original mesh file.
        original: PathBuf,

        /// Point cloud file, stored as `cloud.ply`.
        #[arg(long)]
        cloud: Option<PathBuf>,

        /// Converted mesh file, stored as `mesh.stl`.
        #[arg(long)]
        mesh: Option<PathBuf>,

        /// Also upload the material and textures of an `.obj` file.
        #[arg(long)]
        materials: bool,

        /// Commit the data to the database.
        #[arg(long)]
        commit: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "object_recognition_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = config::load_or_default(cli.config.as_deref())?;
    let args = cli.db.with_defaults(&cfg.db);
    let params = args_to_db_params(&args, &args.overrides());

    match cli.command {
        Commands::Init => {
            let db = db::db_params_to_db(&params, &cfg.couchdb)
                .with_context(|| format!("Failed to initialize {}", params.root_or_default()))?;
            println!("Database '{}' initialized successfully.", db.name());
        }
        Commands::Params => {
            println!("{}", params.to_json()?);
        }
        Commands::Object {
            action:
                ObjectAction::Add {
                    name,
                    description,
                    tags,
                    author_name,
                    author_email,
                    commit,
                },
        } => {
            let mut object = ObjectDoc::new(&name, &description, &tags, &author_name, &author_email);
            if commit {
                let db = db::db_params_to_db(&params, &cfg.couchdb)?;
                object.store(db.as_ref())?;
                println!("{}", object.id());
            } else {
                println!("{}", object.to_json()?);
                println!("dry run: nothing stored (pass --commit to store)");
            }
        }
        Commands::Mesh {
            action:
                MeshAction::Upload {
                    object_id,
                    original,
                    cloud,
                    mesh: converted,
                    materials,
                    commit,
                },
        } => {
            let base_dir = std::env::current_dir().context("Failed to read current directory")?;
            let mut upload = MeshUpload::new(original, base_dir).with_materials(materials);
            if let Some(cloud) = cloud {
                upload = upload.with_cloud(cloud);
            }
            if let Some(converted) = converted {
                upload = upload.with_mesh(converted);
            }

            if commit {
                let db = db::db_params_to_db(&params, &cfg.couchdb)?;
                let report = mesh::upload_mesh(db.as_ref(), &object_id, &upload)
                    .with_context(|| format!("Failed to upload mesh for {}", object_id))?;
                let verb = if report.created { "created" } else { "updated" };
                println!("{} model {}", verb, report.model_id);
                for name in &report.attachments {
                    println!("  attached {}", name);
                }
            } else {
                for item in mesh::plan_mesh_upload(&upload)? {
                    println!("{:<20} {}", item.name, item.path.display());
                }
                println!("dry run: nothing uploaded (pass --commit to upload)");
            }
        }
        Commands::Ids { ids, names } => {
            if !object_ids::backend_supported(&params)? {
                return Ok(());
            }
            let ids = Selector::parse(&ids)?;
            let names = Selector::parse(&names)?;
            for id in object_ids::resolve_with_params(&params, &ids, &names, &cfg.couchdb)? {
                println!("{}", id);
            }
        }
    }

    Ok(())
}
