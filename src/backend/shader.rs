//! WGSL validation through naga.
//!
//! Every pipeline source is parsed and validated before it reaches a backend,
//! so a malformed shader surfaces as [`BackendError::ShaderCreationFailed`]
//! with a readable message instead of a device-level validation panic.

use crate::backend::traits::{BackendError, BackendResult};

/// Shader stage of an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
            ShaderStage::Compute => naga::ShaderStage::Compute,
        }
    }
}

/// Parse and validate a WGSL module and check that the entry points exist.
pub fn validate_wgsl(
    label: &str,
    source: &str,
    entry_points: &[(&str, ShaderStage)],
) -> BackendResult<()> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        BackendError::ShaderCreationFailed(format!(
            "{label}: WGSL parse error: {}",
            e.emit_to_string(source)
        ))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator.validate(&module).map_err(|e| {
        BackendError::ShaderCreationFailed(format!(
            "{label}: validation error: {}",
            e.emit_to_string(source)
        ))
    })?;

    for (name, stage) in entry_points {
        let naga_stage = stage.to_naga();
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == *name && ep.stage == naga_stage)
        {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{label}: entry point '{name}' not found for stage {stage:?}"
            )));
        }
    }

    log::trace!("Validated shader '{label}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIVIAL: &str = r#"
@compute @workgroup_size(1)
fn cs_main() {}
"#;

    #[test]
    fn accepts_valid_module() {
        assert!(validate_wgsl("trivial", TRIVIAL, &[("cs_main", ShaderStage::Compute)]).is_ok());
    }

    #[test]
    fn rejects_missing_entry_point() {
        let err = validate_wgsl("trivial", TRIVIAL, &[("vs_main", ShaderStage::Vertex)]);
        assert!(matches!(err, Err(BackendError::ShaderCreationFailed(_))));
    }

    #[test]
    fn rejects_parse_errors() {
        let err = validate_wgsl("broken", "fn main( {", &[]);
        assert!(matches!(err, Err(BackendError::ShaderCreationFailed(_))));
    }
}
