use std::path::PathBuf;

use anyhow::Result;
use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::fs;
use tracing::{error, info};
use uuid::Uuid;

use snipbox_types::api::AvatarResponse;

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::Claims;
use crate::{AppState, blocking};

/// Largest avatar accepted.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Request body cap for the upload route. Larger than [`MAX_AVATAR_BYTES`]
/// so slightly oversized files get the JSON error instead of a bare 413.
pub const AVATAR_BODY_LIMIT: usize = 4 * 1024 * 1024;

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Avatar files on disk, one per user: `{dir}/{user_id}.{ext}`.
pub struct AvatarStore {
    dir: PathBuf,
}

impl AvatarStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Avatar storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write the user's avatar, replacing any previous one. Returns the
    /// stored file name.
    pub async fn save(&self, user_id: Uuid, ext: &str, data: &[u8]) -> Result<String> {
        let file_name = format!("{user_id}.{ext}");
        for other in EXTENSIONS.iter().filter(|e| **e != ext) {
            remove_if_present(self.dir.join(format!("{user_id}.{other}"))).await?;
        }
        fs::write(self.dir.join(&file_name), data).await?;
        Ok(file_name)
    }

    /// Bytes and content type of a stored file, `None` if absent.
    pub async fn read(&self, file_name: &str) -> Result<Option<(Vec<u8>, &'static str)>> {
        let Some((_, ext)) = parse_file_name(file_name) else {
            return Ok(None);
        };
        match fs::read(self.dir.join(file_name)).await {
            Ok(bytes) => Ok(Some((bytes, content_type(ext)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_all(&self, user_id: Uuid) -> Result<()> {
        for ext in EXTENSIONS {
            remove_if_present(self.dir.join(format!("{user_id}.{ext}"))).await?;
        }
        Ok(())
    }
}

async fn remove_if_present(path: PathBuf) -> Result<()> {
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// `{uuid}.{ext}` with a known extension; anything else (including path
/// separators) is refused.
fn parse_file_name(name: &str) -> Option<(Uuid, &'static str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let id = stem.parse::<Uuid>().ok()?;
    let ext = normalize_extension(ext)?;
    // Only the canonical form maps to a file on disk.
    (format!("{id}.{ext}") == name).then_some((id, ext))
}

fn normalize_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    EXTENSIONS.into_iter().find(|e| *e == ext)
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.split(';').next()?.trim() {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Extension from the uploaded file's name, else from its content type.
pub(crate) fn upload_extension(filename: Option<&str>, content_type: Option<&str>) -> Option<&'static str> {
    match filename.and_then(|f| f.rsplit_once('.')) {
        Some((_, ext)) => normalize_extension(ext),
        None => content_type.and_then(extension_for_mime),
    }
}

/// PUT /me/avatar?filename=: raw image bytes in the body.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AvatarResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::MalformedPayload);
    }
    if body.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::FileTooLarge);
    }

    let mime = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let ext = upload_extension(query.filename.as_deref(), mime).ok_or(ApiError::UnsupportedMedia)?;

    let file_name = state.avatars.save(claims.sub, ext, &body).await.map_err(|e| {
        error!("Failed to store avatar for {}: {}", claims.sub, e);
        ApiError::Internal
    })?;

    // The file name is stable per user, so a version keeps caches honest.
    let avatar_url = format!(
        "{}/avatars/{}?v={}",
        state.public_url,
        file_name,
        Utc::now().timestamp_millis()
    );
    let (uid, url) = (claims.sub.to_string(), avatar_url.clone());
    blocking(&state, move |db| Ok(db.set_avatar_url(&uid, &url)?)).await?;

    info!("User {} uploaded avatar ({} bytes)", claims.sub, body.len());
    Ok(Json(AvatarResponse { avatar_url }))
}

/// GET /avatars/{file}
pub async fn serve(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (bytes, mime) = state.avatars.read(&file_name).await?.ok_or(ApiError::NotFound)?;
    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    ))
}
