//! Configuration validation module
//!
//! Rules:
//! - concentrator tunables are in range (time resolution is clamped)
//! - source IDs are unique
//! - every source passes its field constraints

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ConcentratorBlueprint, ContractError};

/// Validate a ConcentratorBlueprint
///
/// Returns the first error encountered. The blueprint is taken mutably
/// because out-of-range time resolutions are clamped rather than rejected.
pub fn validate(blueprint: &mut ConcentratorBlueprint) -> Result<(), ContractError> {
    validate_concentrator(blueprint)?;
    validate_source_ids(blueprint)?;
    validate_sources(blueprint)?;
    Ok(())
}

/// Validate the concentrator section
fn validate_concentrator(blueprint: &mut ConcentratorBlueprint) -> Result<(), ContractError> {
    blueprint.concentrator.validate().map_err(|e| match e {
        ContractError::ConfigValidation { field, message } => ContractError::ConfigValidation {
            field: format!("concentrator.{field}"),
            message,
        },
        other => other,
    })
}

/// Validate source ID uniqueness
fn validate_source_ids(blueprint: &ConcentratorBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for source in &blueprint.sources {
        if !seen.insert(source.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("sources[id={}]", source.id),
                "duplicate source id",
            ));
        }
    }
    Ok(())
}

/// Validate per-source constraints
fn validate_sources(blueprint: &ConcentratorBlueprint) -> Result<(), ContractError> {
    for (idx, source) in blueprint.sources.iter().enumerate() {
        source.validate().map_err(|e| {
            ContractError::config_validation(format!("sources[{idx}]"), e.to_string())
        })?;
    }
    Ok(())
}
