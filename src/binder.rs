//! Positional binding of named parameters.

use tracing::debug;

use crate::backend::ParamBinding;
use crate::error::SqlError;
use crate::value::ParamSet;

/// Bind every compiled placeholder against the parameter set, in template
/// order. Positions are 1-based. A placeholder with no bound value is an
/// error; execution with partially bound statements is never attempted.
pub(crate) fn bind_statement(
    target: &mut dyn ParamBinding,
    param_names: &[String],
    params: &ParamSet,
) -> Result<(), SqlError> {
    for (offset, name) in param_names.iter().enumerate() {
        let index = offset + 1;
        let value = params
            .get(name)
            .ok_or_else(|| SqlError::MissingParameter { name: name.clone() })?;
        debug!(name = %name, index, kind = value.kind(), "binding parameter");
        target.bind(index, value).map_err(|e| match e {
            // Drivers report positions; attach the placeholder name here.
            SqlError::Bind { message, .. } => SqlError::Bind {
                index,
                name: name.clone(),
                message,
            },
            other => other,
        })?;
    }
    Ok(())
}
