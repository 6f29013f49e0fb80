//! Weight checkpoints.
//!
//! Weights go to a safetensors file written by [`VarMap::save`]. Next to
//! it sits a small JSON manifest (`<stem>.manifest.json`) recording the
//! loss identifier and the network config the weights were trained with.
//! Loading checks both against the caller's before touching any weights.

use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use lhv_core::{LhvError, NetworkConfig};
use serde::{Deserialize, Serialize};

/// Metadata stored alongside a weights file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub loss_id: String,
    pub network: NetworkConfig,
}

/// Manifest location for a weights file: `model.safetensors` becomes
/// `model.manifest.json`.
pub fn manifest_path(weights: &Path) -> PathBuf {
    weights.with_extension("manifest.json")
}

/// Saves every variable in `var_map` plus the manifest.
///
/// # Errors
///
/// Returns [`LhvError::Checkpoint`] if the weights cannot be written and
/// [`LhvError::Io`] if the manifest cannot.
pub fn save(
    var_map: &VarMap,
    network: &NetworkConfig,
    loss_id: &str,
    weights: &Path,
) -> Result<(), LhvError> {
    var_map.save(weights).map_err(|e| LhvError::Checkpoint {
        message: format!("saving weights to {}: {e}", weights.display()),
    })?;

    let manifest = CheckpointManifest {
        loss_id: loss_id.to_string(),
        network: network.clone(),
    };
    let text = serde_json::to_string_pretty(&manifest).map_err(|e| LhvError::Internal {
        message: format!("serializing checkpoint manifest: {e}"),
    })?;
    let path = manifest_path(weights);
    std::fs::write(&path, text).map_err(|source| LhvError::Io {
        context: format!("writing {}", path.display()),
        source,
    })?;

    tracing::info!(
        weights = %weights.display(),
        vars = var_map.all_vars().len(),
        "saved checkpoint"
    );
    Ok(())
}

/// Reads the manifest belonging to `weights`.
///
/// # Errors
///
/// Returns [`LhvError::Checkpoint`] if it is missing or malformed.
pub fn read_manifest(weights: &Path) -> Result<CheckpointManifest, LhvError> {
    let path = manifest_path(weights);
    let text = std::fs::read_to_string(&path).map_err(|e| LhvError::Checkpoint {
        message: format!("reading manifest {}: {e}", path.display()),
    })?;
    serde_json::from_str(&text).map_err(|e| LhvError::Checkpoint {
        message: format!("parsing manifest {}: {e}", path.display()),
    })
}

/// Overwrites the variables of `var_map` with the saved weights.
///
/// `var_map` must already hold every variable of a network built from
/// `network`; the saved loss identifier must equal `loss_id`. Only the
/// architecture has to match the manifest, so a checkpoint can resume
/// under a different regularizer or init scaling.
///
/// # Errors
///
/// Returns [`LhvError::Checkpoint`] on a loss or architecture mismatch,
/// a missing manifest, or unreadable weights.
pub fn load(
    var_map: &mut VarMap,
    network: &NetworkConfig,
    loss_id: &str,
    weights: &Path,
) -> Result<(), LhvError> {
    let manifest = read_manifest(weights)?;
    if manifest.loss_id != loss_id {
        return Err(LhvError::Checkpoint {
            message: format!(
                "{} was trained with loss '{}', expected '{loss_id}'",
                weights.display(),
                manifest.loss_id
            ),
        });
    }
    if !manifest.network.same_architecture(network) {
        return Err(LhvError::Checkpoint {
            message: format!(
                "{} was saved from a different network architecture",
                weights.display()
            ),
        });
    }

    var_map.load(weights).map_err(|e| LhvError::Checkpoint {
        message: format!("loading weights from {}: {e}", weights.display()),
    })?;
    tracing::info!(weights = %weights.display(), loss = loss_id, "loaded checkpoint");
    Ok(())
}
