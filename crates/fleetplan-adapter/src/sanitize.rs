//! Restricted command-channel hygiene.
//!
//! The fallback channel is never handed arbitrary input. Operations must be
//! in the static allowlist below, and every argument is rejected before any
//! connection is opened if it carries shell metacharacters. This allowlist is
//! the single source of truth for fallback eligibility; which operations are
//! allowed for which device or environment is the validator's concern.

use fleetplan_core::error::FleetError;
use fleetplan_core::types::OperationKind;

/// Characters that end, chain, substitute, or redirect commands.
const FORBIDDEN: &[char] = &[
    ';', '|', '&', '`', '$', '(', ')', '<', '>', '"', '\'', '\\', '\n', '\r', '\0',
];

/// Read side of the fallback channel.
pub const SHOW_CONFIG: &str = "show-config";

/// A fully-formed, pre-sanitized fallback command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// The write operations the fallback channel may carry. System-class changes
/// have no command equivalent and are API-only.
pub fn fallback_program(kind: OperationKind) -> Option<&'static str> {
    match kind {
        OperationKind::Interface => Some("set-interface"),
        OperationKind::Route => Some("set-route"),
        OperationKind::Vlan => Some("set-vlan"),
        OperationKind::System => None,
    }
}

/// Rejects any argument containing a shell metacharacter or control byte.
pub fn sanitize_argument(arg: &str) -> Result<(), FleetError> {
    if arg.chars().any(|c| FORBIDDEN.contains(&c) || c.is_control()) {
        return Err(FleetError::unsafe_operation(format!(
            "argument rejected by command sanitizer: {arg:?}"
        )));
    }
    Ok(())
}

/// Builds the fallback command for a write, or fails closed.
pub fn build_write_command(
    kind: OperationKind,
    path: &str,
    value: Option<&str>,
) -> Result<FallbackCommand, FleetError> {
    let program = fallback_program(kind).ok_or_else(|| {
        FleetError::unsafe_operation(format!(
            "operation class {kind} has no allowlisted fallback command"
        ))
    })?;
    sanitize_argument(path)?;
    let args = match value {
        Some(value) => {
            sanitize_argument(value)?;
            vec![path.to_string(), value.to_string()]
        }
        None => vec![path.to_string(), "--delete".to_string()],
    };
    Ok(FallbackCommand { program, args })
}

/// Builds the read-side fallback command.
pub fn build_read_command() -> FallbackCommand {
    FallbackCommand {
        program: SHOW_CONFIG,
        args: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shell_metacharacters() {
        for arg in [
            "eth0; reboot",
            "eth0 | tee /etc/passwd",
            "eth0 && halt",
            "`id`",
            "$(id)",
            "a > b",
            "a\nb",
        ] {
            assert!(sanitize_argument(arg).is_err(), "should reject {arg:?}");
        }
    }

    #[test]
    fn accepts_plain_arguments() {
        for arg in ["interface/ge-0/0/1/mtu", "9000", "10.20.0.0-24", "trunk port 4"] {
            sanitize_argument(arg).unwrap();
        }
    }

    #[test]
    fn system_class_has_no_fallback() {
        let err = build_write_command(OperationKind::System, "ntp/server", Some("10.0.0.5"))
            .unwrap_err();
        assert_eq!(err.code, fleetplan_core::ErrorCode::UnsafeOperation);
    }

    #[test]
    fn write_command_carries_sanitized_args() {
        let cmd =
            build_write_command(OperationKind::Interface, "interface/ge-0/0/1/mtu", Some("9000"))
                .unwrap();
        assert_eq!(cmd.program, "set-interface");
        assert_eq!(cmd.args, vec!["interface/ge-0/0/1/mtu", "9000"]);
    }

    #[test]
    fn delete_maps_to_delete_flag() {
        let cmd = build_write_command(OperationKind::Vlan, "vlan/200/name", None).unwrap();
        assert_eq!(cmd.args, vec!["vlan/200/name", "--delete"]);
    }

    #[test]
    fn hostile_value_is_rejected_before_building() {
        let err = build_write_command(
            OperationKind::Interface,
            "interface/ge-0/0/1/descr",
            Some("up; rm -rf /"),
        )
        .unwrap_err();
        assert_eq!(err.code, fleetplan_core::ErrorCode::UnsafeOperation);
    }
}
