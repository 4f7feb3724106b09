//! Commands accepted by the scan coordinator.

use std::fmt;

/// An externally triggered scan command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    /// Bootstrap the library, or resume it if already initiated
    Init { upgrade: bool },
    /// Reload everything (`None`/empty) or a single entry point
    Reload { path: Option<String> },
    /// Discover media under a path; empty paths are ignored
    Discover { path: Option<String> },
    /// Discover a freshly attached storage root, applying the blacklist first
    DiscoverDevice { path: String },
    /// Suspend background work
    Pause,
    /// Resume background work
    Resume,
}

impl ScanCommand {
    /// Wire name of the command, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ScanCommand::Init { .. } => "init",
            ScanCommand::Reload { .. } => "reload",
            ScanCommand::Discover { .. } => "discover",
            ScanCommand::DiscoverDevice { .. } => "discover-device",
            ScanCommand::Pause => "pause-scan",
            ScanCommand::Resume => "resume-scan",
        }
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanCommand::Init { upgrade } => write!(f, "init(upgrade={upgrade})"),
            ScanCommand::Reload { path: Some(path) } => write!(f, "reload({path})"),
            ScanCommand::Reload { path: None } => write!(f, "reload(*)"),
            ScanCommand::Discover { path } => {
                write!(f, "discover({})", path.as_deref().unwrap_or(""))
            }
            ScanCommand::DiscoverDevice { path } => write!(f, "discover-device({path})"),
            ScanCommand::Pause | ScanCommand::Resume => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(ScanCommand::Pause.name(), "pause-scan");
        assert_eq!(
            ScanCommand::DiscoverDevice {
                path: "/usb1".into()
            }
            .name(),
            "discover-device"
        );
    }

    #[test]
    fn test_command_display() {
        assert_eq!(ScanCommand::Reload { path: None }.to_string(), "reload(*)");
        assert_eq!(
            ScanCommand::Init { upgrade: true }.to_string(),
            "init(upgrade=true)"
        );
    }
}
