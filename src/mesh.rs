//! Mesh uploads.
//!
//! Attaches a mesh and its companion files to the `"mesh"` model of an
//! object. Attachment names:
//!
//! | File | Attachment name | Content type |
//! |------|-----------------|--------------|
//! | original mesh | `original.<ext>` | guessed from the extension |
//! | point cloud | `cloud.ply` | `application/octet-stream` |
//! | converted mesh | `mesh.stl` | `application/octet-stream` |
//! | material (`.obj` only) | its basename | `application/octet-stream` |
//! | textures (`map_Kd`) | their basenames | `application/octet-stream` |
//!
//! Material and texture references found inside `.obj`/`.mtl` files are
//! resolved against an explicit base directory, not the process's current
//! directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DbError, Result};
use crate::models::{self, ModelDoc};
use crate::store::Database;

pub const MESH_METHOD: &str = "mesh";
pub const MATERIAL_DIRECTIVE: &str = "mtllib";
pub const TEXTURE_DIRECTIVE: &str = "map_Kd";

const OCTET_STREAM: &str = "application/octet-stream";

/// Files to upload for one object.
#[derive(Debug, Clone)]
pub struct MeshUpload {
    pub original: PathBuf,
    pub cloud: Option<PathBuf>,
    pub mesh: Option<PathBuf>,
    /// Also upload the `.obj` file's material and its textures.
    pub use_material: bool,
    /// Directory that relative `mtllib`/`map_Kd` references resolve against.
    pub base_dir: PathBuf,
}

impl MeshUpload {
    pub fn new(original: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            original: original.into(),
            cloud: None,
            mesh: None,
            use_material: false,
            base_dir: base_dir.into(),
        }
    }

    pub fn with_cloud(mut self, cloud: impl Into<PathBuf>) -> Self {
        self.cloud = Some(cloud.into());
        self
    }

    pub fn with_mesh(mut self, mesh: impl Into<PathBuf>) -> Self {
        self.mesh = Some(mesh.into());
        self
    }

    pub fn with_materials(mut self, use_material: bool) -> Self {
        self.use_material = use_material;
        self
    }

    fn wants_materials(&self) -> bool {
        self.use_material
            && self
                .original
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"))
    }
}

/// One local file and the name it gets on the model document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// Outcome of [`upload_mesh`].
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub model_id: String,
    /// False when an existing model was updated.
    pub created: bool,
    /// Attachment names in upload order.
    pub attachments: Vec<String>,
}

/// Attachment name for the original file: `original` plus its extension.
pub fn original_attachment_name(original: &Path) -> String {
    match original.extension() {
        Some(ext) => format!("original.{}", ext.to_string_lossy()),
        None => "original".to_string(),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolve a path referenced from inside a mesh or material file.
///
/// Absolute paths are returned unchanged. A leading `./` is dropped and the
/// rest joined onto `base_dir`.
pub fn resolve_reference(reference: &str, base_dir: &Path) -> PathBuf {
    if reference.starts_with('/') || Path::new(reference).is_absolute() {
        return PathBuf::from(reference);
    }
    let relative = reference.strip_prefix("./").unwrap_or(reference);
    base_dir.join(relative)
}

/// Arguments of every `directive` line in `path`, in file order.
///
/// A line matches when its first token is exactly `directive`; its value is
/// the line's last token. Lines without an argument are skipped.
fn directive_values(path: &Path, directive: &str) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| DbError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if tokens.next()? != directive {
                return None;
            }
            tokens.last().map(String::from)
        })
        .collect())
}

/// Material file referenced by an `.obj` mesh.
///
/// When the mesh has several `mtllib` lines the last one wins.
pub fn material_path(mesh_path: &Path, base_dir: &Path) -> Result<PathBuf> {
    directive_values(mesh_path, MATERIAL_DIRECTIVE)?
        .last()
        .map(|reference| resolve_reference(reference, base_dir))
        .ok_or_else(|| DbError::MissingReference {
            directive: MATERIAL_DIRECTIVE,
            path: mesh_path.to_path_buf(),
        })
}

/// Diffuse textures (`map_Kd`) referenced by a material file, in file order.
pub fn texture_paths(material_path: &Path, base_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(directive_values(material_path, TEXTURE_DIRECTIVE)?
        .iter()
        .map(|reference| resolve_reference(reference, base_dir))
        .collect())
}

fn base_attachments(upload: &MeshUpload) -> Vec<PlannedAttachment> {
    let mut planned = vec![PlannedAttachment {
        name: original_attachment_name(&upload.original),
        path: upload.original.clone(),
        content_type: mime_guess::from_path(&upload.original)
            .first_or_octet_stream()
            .to_string(),
    }];
    if let Some(cloud) = &upload.cloud {
        planned.push(PlannedAttachment {
            name: "cloud.ply".to_string(),
            path: cloud.clone(),
            content_type: OCTET_STREAM.to_string(),
        });
    }
    if let Some(mesh) = &upload.mesh {
        planned.push(PlannedAttachment {
            name: "mesh.stl".to_string(),
            path: mesh.clone(),
            content_type: OCTET_STREAM.to_string(),
        });
    }
    planned
}

fn material_attachments(upload: &MeshUpload) -> Result<Vec<PlannedAttachment>> {
    if !upload.wants_materials() {
        return Ok(Vec::new());
    }
    let material = material_path(&upload.original, &upload.base_dir)?;
    let textures = texture_paths(&material, &upload.base_dir)?;
    Ok(std::iter::once(material)
        .chain(textures)
        .map(|path| PlannedAttachment {
            name: basename(&path),
            path,
            content_type: OCTET_STREAM.to_string(),
        })
        .collect())
}

/// Every attachment [`upload_mesh`] would write, without touching the store.
///
/// Still reads the `.obj` and `.mtl` files when materials are requested.
pub fn plan_mesh_upload(upload: &MeshUpload) -> Result<Vec<PlannedAttachment>> {
    let mut planned = base_attachments(upload);
    planned.extend(material_attachments(upload)?);
    Ok(planned)
}

fn attach(db: &dyn Database, model: &mut ModelDoc, item: &PlannedAttachment) -> Result<()> {
    let content = std::fs::read(&item.path).map_err(|e| DbError::io(&item.path, e))?;
    model.put_attachment(db, &item.name, &item.content_type, content)?;
    info!(
        model = model.id(),
        attachment = %item.name,
        path = %item.path.display(),
        "attached file"
    );
    Ok(())
}

/// Upload a mesh and its companion files to the `"mesh"` model of `object_id`.
///
/// The first existing model for the object is reused; otherwise a new one
/// is created. The model is saved before any attachment is written. A
/// failure midway leaves the attachments written so far in place.
pub fn upload_mesh(db: &dyn Database, object_id: &str, upload: &MeshUpload) -> Result<UploadReport> {
    let existing = models::find_model_for_object(db, object_id, MESH_METHOD)?;
    let (mut model, created) = match existing.first() {
        Some(id) => {
            info!(model = %id, "updating model");
            (ModelDoc::load(db, id)?, false)
        }
        None => {
            info!(object_id, "creating new model");
            (ModelDoc::new(object_id, MESH_METHOD), true)
        }
    };
    model.store(db)?;

    let mut attachments = Vec::new();
    for item in base_attachments(upload) {
        attach(db, &mut model, &item)?;
        attachments.push(item.name);
    }
    for item in material_attachments(upload)? {
        attach(db, &mut model, &item)?;
        attachments.push(item.name);
    }

    Ok(UploadReport {
        model_id: model.id().to_string(),
        created,
        attachments,
    })
}
