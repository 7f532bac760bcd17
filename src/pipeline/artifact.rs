//! Reading and writing the serialized pipeline artifact.
//!
//! The artifact is the JSON form of [`Pipeline`], gzip-compressed on write.
//! Plain JSON is accepted on read as well.

use anyhow::{Context, Result, anyhow};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::Pipeline;

/// Candidate locations tried in order when no explicit path is configured.
pub const DEFAULT_MODEL_PATHS: [&str; 3] = [
    "./car_price.model",
    "./model/car_price.model",
    "../model/car_price.model",
];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encodes a pipeline as gzip-compressed JSON.
pub fn to_bytes(pipeline: &Pipeline) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(pipeline)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decodes an artifact (gzip or plain JSON) and validates it.
pub fn from_bytes(bytes: &[u8]) -> Result<Pipeline> {
    let pipeline: Pipeline = if bytes.starts_with(&GZIP_MAGIC) {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .context("artifact is not valid gzip")?;
        serde_json::from_slice(&json)?
    } else {
        serde_json::from_slice(bytes)?
    };
    pipeline.validate()?;
    Ok(pipeline)
}

/// Writes the artifact to `path`, creating parent directories.
pub fn save_pipeline(pipeline: &Pipeline, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let bytes = to_bytes(pipeline)?;
    std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Pipeline artifact written");
    Ok(())
}

pub fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    from_bytes(&bytes).with_context(|| format!("failed to decode {}", path.display()))
}

/// Loads the first candidate that exists and decodes successfully.
///
/// Candidates that exist but fail to decode are logged and skipped. Returns an
/// error when no candidate could be loaded.
pub fn load_first<P: AsRef<Path>>(candidates: &[P]) -> Result<(Pipeline, PathBuf)> {
    for candidate in candidates {
        let path = candidate.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "Model candidate not found");
            continue;
        }
        match load_pipeline(path) {
            Ok(pipeline) => {
                info!(
                    path = %path.display(),
                    trees = pipeline.forest().n_trees(),
                    trained_at = %pipeline.metadata.trained_at,
                    "Model loaded"
                );
                return Ok((pipeline, path.to_path_buf()));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "Failed to load model candidate");
            }
        }
    }

    Err(anyhow!(
        "no valid model found in any of the expected paths: {}",
        candidates
            .iter()
            .map(|c| c.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ForestParams;
    use crate::pipeline::tests::synthetic_rows;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn small_pipeline() -> Pipeline {
        let (rows, targets) = synthetic_rows();
        let params = ForestParams {
            n_trees: 3,
            ..Default::default()
        };
        Pipeline::fit(&rows, &targets, &params).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("car_price_predictor_test_save/nested/car_price.model");
        let _ = fs::remove_file(&path);

        let pipeline = small_pipeline();
        save_pipeline(&pipeline, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));
        assert_eq!(load_pipeline(&path).unwrap(), pipeline);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_plain_json_is_accepted() {
        let pipeline = small_pipeline();
        let json = serde_json::to_vec(&pipeline).unwrap();
        assert_eq!(from_bytes(&json).unwrap(), pipeline);
    }

    #[test]
    fn test_tree_pointing_back_at_an_ancestor_is_rejected() {
        let pipeline = small_pipeline();
        let mut value = serde_json::to_value(&pipeline).unwrap();
        let root = &mut value["forest"]["trees"][0]["nodes"][0];
        assert_eq!(root["kind"], "split");
        root["left"] = 0.into();
        root["right"] = 0.into();

        let json = serde_json::to_vec(&value).unwrap();
        let err = from_bytes(&json).unwrap_err();
        assert!(err.to_string().contains("tree 0 is malformed"));
    }

    #[test]
    fn test_load_first_skips_missing_and_corrupt() {
        let corrupt = temp_path("car_price_predictor_test_corrupt.model");
        let good = temp_path("car_price_predictor_test_good.model");
        let absent = temp_path("car_price_predictor_test_absent.model");
        let _ = fs::remove_file(&absent);
        fs::write(&corrupt, b"not a model").unwrap();
        save_pipeline(&small_pipeline(), &good).unwrap();

        let (_, used) = load_first(&[&absent, &corrupt, &good]).unwrap();
        assert_eq!(used, good);

        fs::remove_file(&corrupt).unwrap();
        fs::remove_file(&good).unwrap();
    }

    #[test]
    fn test_load_first_fails_without_valid_candidate() {
        let corrupt = temp_path("car_price_predictor_test_only_corrupt.model");
        fs::write(&corrupt, GZIP_MAGIC).unwrap();

        let err = load_first(&[&corrupt]).unwrap_err();
        assert!(err.to_string().contains("no valid model found"));

        fs::remove_file(&corrupt).unwrap();
    }
}
