use kb_core::{KbError, Result};

/// Validates a dynamically-chosen column name against an allow-list before
/// it is spliced into SQL. Values are always bound as parameters; only
/// column/field identifiers ever reach this check.
pub fn validate_field_name(allowed: &[&str], field: &str) -> Result<()> {
    if allowed.contains(&field) {
        Ok(())
    } else {
        Err(KbError::Internal(anyhow::anyhow!(
            "invalid field name: {field}, allowed: {allowed:?}"
        )))
    }
}
