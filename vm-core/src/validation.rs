//! Centralized validation logic for user inputs.
//!
//! Names accepted here end up on hypervisor command lines, in SSH targets and
//! inside SQL statements, so the rules are deliberately narrow.

use crate::error::{Result, VmError};

/// Longest VM name accepted, one host label.
pub const MAX_VM_NAME_LEN: usize = 63;

/// MariaDB limits database names to 64 characters; user names are shorter in
/// old releases but 64 is the modern cap.
pub const MAX_SQL_IDENTIFIER_LEN: usize = 64;

/// Validate a VM name.
///
/// Allowed: ASCII alphanumerics, `-`, `_` and `.`, not starting with `-` or `.`.
/// The name doubles as the SSH host, so it must also pass
/// [`validate_hostname`]: no trailing or doubled `.` and no label that starts
/// or ends with `-`.
pub fn validate_vm_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VmError::Validation("VM name required".to_string()));
    }

    if name.len() > MAX_VM_NAME_LEN {
        return Err(VmError::Validation(format!(
            "VM name must be at most {} characters",
            MAX_VM_NAME_LEN
        )));
    }

    if name.starts_with('-') || name.starts_with('.') {
        return Err(VmError::Validation(format!(
            "VM name '{}' cannot start with '-' or '.'",
            name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(VmError::Validation(format!(
            "VM name '{}' contains invalid characters (only alphanumeric, '-', '_' and '.' allowed)",
            name
        )));
    }

    validate_hostname(name).map_err(|e| {
        let reason = match e {
            VmError::Validation(reason) => reason,
            other => other.to_string(),
        };
        VmError::Validation(format!(
            "VM name '{}' is not a usable host name: {}",
            name, reason
        ))
    })
}

/// Validate a database or user name for use inside SQL statements.
pub fn validate_sql_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_SQL_IDENTIFIER_LEN {
        return Err(VmError::Validation(format!(
            "{} must be between 1 and {} characters",
            kind, MAX_SQL_IDENTIFIER_LEN
        )));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VmError::Validation(format!(
            "{} '{}' contains invalid characters (only alphanumeric and '_' allowed)",
            kind, value
        )));
    }

    Ok(())
}

/// Validate a hostname according to RFC 1123 rules
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() || hostname.len() > 253 {
        return Err(VmError::Validation(
            "Hostname must be between 1 and 253 characters".to_string(),
        ));
    }

    if hostname.starts_with('.') || hostname.ends_with('.') {
        return Err(VmError::Validation(
            "Hostname cannot start or end with a dot".to_string(),
        ));
    }

    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(VmError::Validation(
                "Hostname labels must be between 1 and 63 characters".to_string(),
            ));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(VmError::Validation(
                "Hostname labels cannot start or end with a hyphen".to_string(),
            ));
        }

        // VM names may carry '_', which many resolvers (and VirtualBox's own
        // DNS proxy) accept even though RFC 1123 does not.
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VmError::Validation(format!(
                "Hostname label '{}' contains invalid characters",
                label
            )));
        }
    }

    Ok(())
}
