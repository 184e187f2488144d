// checkpoint.rs
// Description: JSON checkpoints for epoch models.
//              A checkpoint stores the model kind, its configuration and every learned
//              parameter flattened in component order. Files are written atomically
//              (temp file then rename) and validated on load.
// History:
// - 2026-10-17: Add ModelCheckpoint with save, load and rebuild.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::models::{build_model, EpochModel, ModelKind};

pub const CHECKPOINT_MAGIC: &str = "SLEEPFORMER_CHECKPOINT";
pub const CHECKPOINT_VERSION: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub s_magic: String,
    pub s_version: String,
    pub kind: ModelKind,
    pub s_model_type: String,
    pub config: ModelConfig,
    pub v_params: Vec<f32>,
}

impl ModelCheckpoint {
    pub fn from_model(kind: ModelKind, cfg: &ModelConfig, model: &dyn EpochModel) -> Self {
        Self {
            s_magic: CHECKPOINT_MAGIC.to_string(),
            s_version: CHECKPOINT_VERSION.to_string(),
            kind,
            s_model_type: model.model_type().to_string(),
            config: cfg.clone(),
            v_params: flatten_params(model),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.s_magic != CHECKPOINT_MAGIC {
            return Err(ModelError::Checkpoint("magic_mismatch".to_string()));
        }
        if self.s_version != CHECKPOINT_VERSION {
            return Err(ModelError::Checkpoint(format!("version_unsupported {}", self.s_version)));
        }
        if self.v_params.is_empty() {
            return Err(ModelError::Checkpoint("empty_params".to_string()));
        }
        self.config.validate()
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s_json: &str) -> Result<Self, ModelError> {
        if s_json.trim().is_empty() {
            return Err(ModelError::Checkpoint("json_empty".to_string()));
        }
        Ok(serde_json::from_str(s_json)?)
    }

    /// Copies the stored parameters into a model built for the same kind and config.
    pub fn apply_to(&self, model: &mut dyn EpochModel, cfg: &ModelConfig) -> Result<(), ModelError> {
        self.validate()?;
        if self.s_model_type != model.model_type() {
            return Err(ModelError::Checkpoint(format!(
                "model_type_mismatch: checkpoint {} vs model {}",
                self.s_model_type,
                model.model_type()
            )));
        }
        if &self.config != cfg {
            return Err(ModelError::Checkpoint("config_mismatch".to_string()));
        }
        assign_params(model, &self.v_params)
    }
}

pub fn flatten_params(model: &dyn EpochModel) -> Vec<f32> {
    let mut v_out: Vec<f32> = Vec::with_capacity(model.parameters());
    for a_p in model.params() {
        v_out.extend(a_p.iter().copied());
    }
    v_out
}

pub fn assign_params(model: &mut dyn EpochModel, v_params: &[f32]) -> Result<(), ModelError> {
    let i_expected = model.parameters();
    if i_expected != v_params.len() {
        return Err(ModelError::Checkpoint(format!(
            "param_count_mismatch: expected {}, got {}",
            i_expected,
            v_params.len()
        )));
    }

    let mut i_offset = 0usize;
    for a_p in model.params_mut() {
        let i_len = a_p.len();
        for (d_dst, &d_src) in a_p.iter_mut().zip(v_params[i_offset..i_offset + i_len].iter()) {
            *d_dst = d_src;
        }
        i_offset += i_len;
    }
    Ok(())
}

pub fn save_checkpoint(
    p_path: &Path,
    kind: ModelKind,
    cfg: &ModelConfig,
    model: &dyn EpochModel,
) -> Result<(), ModelError> {
    let cp = ModelCheckpoint::from_model(kind, cfg, model);
    write_file_atomic(p_path, &cp.to_json()?)?;
    tracing::info!(path = %p_path.display(), params = cp.v_params.len(), "checkpoint saved");
    Ok(())
}

pub fn read_checkpoint(p_path: &Path) -> Result<ModelCheckpoint, ModelError> {
    let s_json = fs::read_to_string(p_path)?;
    let cp = ModelCheckpoint::from_json(&s_json)?;
    cp.validate()?;
    Ok(cp)
}

/// Loads parameters into an existing model.
pub fn load_checkpoint_into(
    p_path: &Path,
    model: &mut dyn EpochModel,
    cfg: &ModelConfig,
) -> Result<(), ModelError> {
    let cp = read_checkpoint(p_path)?;
    cp.apply_to(model, cfg)?;
    tracing::info!(path = %p_path.display(), model = model.model_type(), "checkpoint loaded");
    Ok(())
}

/// Rebuilds the model described by the checkpoint and restores its parameters.
pub fn load_checkpoint(p_path: &Path) -> Result<(ModelCheckpoint, Box<dyn EpochModel>), ModelError> {
    let cp = read_checkpoint(p_path)?;
    let mut model = build_model(cp.kind, &cp.config)?;
    cp.apply_to(model.as_mut(), &cp.config)?;
    tracing::info!(path = %p_path.display(), model = model.model_type(), "checkpoint rebuilt");
    Ok((cp, model))
}

pub fn write_file_atomic(p_path: &Path, s_content: &str) -> Result<(), ModelError> {
    if p_path.as_os_str().is_empty() {
        return Err(ModelError::Checkpoint("file_path_empty".to_string()));
    }

    if let Some(p_parent) = p_path.parent() {
        if !p_parent.as_os_str().is_empty() {
            fs::create_dir_all(p_parent)?;
        }
    }

    let mut s_tmp = p_path.as_os_str().to_os_string();
    s_tmp.push(".tmp");
    fs::write(&s_tmp, s_content)?;

    if let Err(e) = fs::rename(&s_tmp, p_path) {
        let _ = fs::remove_file(&s_tmp);
        return Err(ModelError::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{random_batch, small_config};

    #[test]
    fn test_round_trip_restores_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let p_path = dir.path().join("ckpt").join("tfcm.json");
        let cfg = small_config();

        let mut model = build_model(ModelKind::Tfcm, &cfg).unwrap();
        for a_p in model.params_mut() {
            a_p.mapv_inplace(|d| d + 0.25);
        }
        model.set_training(false);
        let a_x = random_batch(2, &cfg);
        let a_expected = model.forward(&a_x, &[0, 1]).unwrap().a_logits;

        save_checkpoint(&p_path, ModelKind::Tfcm, &cfg, model.as_ref()).unwrap();
        assert!(p_path.exists());
        assert!(!dir.path().join("ckpt").join("tfcm.json.tmp").exists());

        let (cp, mut restored) = load_checkpoint(&p_path).unwrap();
        assert_eq!(cp.kind, ModelKind::Tfcm);
        assert_eq!(cp.s_model_type, "TFCMTransformer");
        restored.set_training(false);
        assert_eq!(restored.forward(&a_x, &[0, 1]).unwrap().a_logits, a_expected);
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p_path = dir.path().join("mix.json");
        let cfg = small_config();
        let model = build_model(ModelKind::Mix, &cfg).unwrap();
        save_checkpoint(&p_path, ModelKind::Mix, &cfg, model.as_ref()).unwrap();

        let mut other = build_model(ModelKind::SwBaseline, &cfg).unwrap();
        assert!(matches!(
            load_checkpoint_into(&p_path, other.as_mut(), &cfg),
            Err(ModelError::Checkpoint(_))
        ));

        let cfg_wide = ModelConfig { d_model: 16, d_ff: 32, ..cfg.clone() };
        let mut wide = build_model(ModelKind::Mix, &cfg_wide).unwrap();
        assert!(load_checkpoint_into(&p_path, wide.as_mut(), &cfg_wide).is_err());

        let mut same = build_model(ModelKind::Mix, &cfg).unwrap();
        assert!(load_checkpoint_into(&p_path, same.as_mut(), &cfg).is_ok());
    }

    #[test]
    fn test_bad_magic_and_param_count() {
        let cfg = small_config();
        let mut model = build_model(ModelKind::Mix, &cfg).unwrap();
        let mut cp = ModelCheckpoint::from_model(ModelKind::Mix, &cfg, model.as_ref());
        assert!(cp.validate().is_ok());

        cp.v_params.pop();
        assert!(cp.apply_to(model.as_mut(), &cfg).is_err());

        cp.s_magic = "OTHER".to_string();
        assert!(cp.validate().is_err());
        assert!(ModelCheckpoint::from_json("  ").is_err());
        assert!(matches!(ModelCheckpoint::from_json("{"), Err(ModelError::Json(_))));
    }
}
