use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    EMOTION_MODEL_NAME, EMOTION_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL,
};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model {name} not found in {dir}")]
    NotInDir { name: String, dir: PathBuf },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Locations of the two resolved model files.
#[derive(Clone, Debug)]
pub struct ModelPaths {
    pub face: PathBuf,
    pub emotion: PathBuf,
}

/// Progress callback: `(model_name, bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(&str, u64, u64) + Send>;

/// Resolve both model files.
///
/// With an explicit `model_dir` the directory is authoritative: both files
/// must already be present there and nothing is downloaded. Without one,
/// each file is looked up in the user cache directory and downloaded into
/// it on a miss.
pub fn resolve_all(
    model_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<ModelPaths, ModelResolveError> {
    if let Some(dir) = model_dir {
        return Ok(ModelPaths {
            face: require_in_dir(dir, FACE_MODEL_NAME)?,
            emotion: require_in_dir(dir, EMOTION_MODEL_NAME)?,
        });
    }

    let cache_dir = model_cache_dir()?;
    fs::create_dir_all(&cache_dir).map_err(ModelResolveError::CacheDir)?;

    Ok(ModelPaths {
        face: resolve_cached(&cache_dir, FACE_MODEL_NAME, FACE_MODEL_URL, progress.as_ref())?,
        emotion: resolve_cached(
            &cache_dir,
            EMOTION_MODEL_NAME,
            EMOTION_MODEL_URL,
            progress.as_ref(),
        )?,
    })
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Facemood/models/`
/// - Linux: `$XDG_CACHE_HOME/Facemood/models/` or `~/.cache/Facemood/models/`
/// - Windows: `%LOCALAPPDATA%/Facemood/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Facemood").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Facemood").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn require_in_dir(dir: &Path, name: &str) -> Result<PathBuf, ModelResolveError> {
    let path = dir.join(name);
    if path.exists() {
        Ok(path)
    } else {
        Err(ModelResolveError::NotInDir {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        })
    }
}

fn resolve_cached(
    cache_dir: &Path,
    name: &str,
    url: &str,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let path = cache_dir.join(name);
    if !path.exists() {
        download(name, url, &path, progress)?;
    }
    Ok(path)
}

fn download(
    name: &str,
    url: &str,
    dest: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let map_download = |e: reqwest::Error| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    };
    let response = reqwest::blocking::get(url).map_err(map_download)?;
    let total = response.content_length().unwrap_or(0);
    let bytes = response.bytes().map_err(map_download)?;

    // Write to a temp file first, then rename, so an interrupted download
    // never leaves a half-written file at the final path.
    let temp_path = dest.with_extension("download");
    let map_write = |e: std::io::Error| ModelResolveError::Write {
        path: temp_path.clone(),
        source: e,
    };
    let mut file = fs::File::create(&temp_path).map_err(map_write)?;

    let mut written: u64 = 0;
    for chunk in bytes.chunks(512 * 1024) {
        file.write_all(chunk).map_err(map_write)?;
        written += chunk.len() as u64;
        if let Some(cb) = progress {
            cb(name, written, total);
        }
    }
    file.flush().map_err(map_write)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
