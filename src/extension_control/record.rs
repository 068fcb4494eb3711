use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Lifecycle of one installation request. States advance in a fixed order and
/// end in either `Available` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtensionState {
    Requested,
    Downloading,
    Uploading,
    Installing,
    Available,
    Error,
}

impl ExtensionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtensionState::Available | ExtensionState::Error)
    }

    fn successor(&self) -> Option<ExtensionState> {
        match self {
            ExtensionState::Requested => Some(ExtensionState::Downloading),
            ExtensionState::Downloading => Some(ExtensionState::Uploading),
            ExtensionState::Uploading => Some(ExtensionState::Installing),
            ExtensionState::Installing => Some(ExtensionState::Available),
            ExtensionState::Available | ExtensionState::Error => None,
        }
    }

    /// A record may advance to its direct successor or short-circuit to
    /// `Error`. Terminal states admit no further transition.
    pub fn may_transition_to(&self, next: ExtensionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == ExtensionState::Error || Some(next) == self.successor()
    }
}

impl Display for ExtensionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtensionState::Requested => "REQUESTED",
            ExtensionState::Downloading => "DOWNLOADING",
            ExtensionState::Uploading => "UPLOADING",
            ExtensionState::Installing => "INSTALLING",
            ExtensionState::Available => "AVAILABLE",
            ExtensionState::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

/// Identity fields reported by the package management framework for an
/// installed extension. Empty until an installation has been confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub package_name: String,
}

/// One extension on one target, either in flight or installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    pub rpm_file: String,
    pub download_url: String,
    pub state: ExtensionState,
    #[serde(flatten)]
    pub package: PackageIdentity,
    pub tags: Vec<String>,
}

impl ExtensionRecord {
    /// A freshly accepted installation request.
    pub fn requested(rpm_file: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            rpm_file: rpm_file.into(),
            download_url: download_url.into(),
            state: ExtensionState::Requested,
            package: PackageIdentity::default(),
            tags: Vec::default(),
        }
    }

    /// An extension reported as installed by the target.
    pub fn available(
        rpm_file: impl Into<String>,
        download_url: impl Into<String>,
        package: PackageIdentity,
    ) -> Self {
        Self {
            rpm_file: rpm_file.into(),
            download_url: download_url.into(),
            state: ExtensionState::Available,
            package,
            tags: Vec::default(),
        }
    }

    pub fn tag_error(&mut self, message: &str) {
        self.state = ExtensionState::Error;
        self.tags.push(format!("err: {message}"));
    }
}
