//! Naming conventions for artifacts and deployment descriptors.

use regex::Regex;

/// Default descriptor convention: every JSON file in the staging directory.
pub const DEFAULT_DESCRIPTOR_PATTERN: &str = r"^.+\.json$";

/// Derives artifact file names and recognises descriptor files.
pub trait ArtifactNaming: Send + Sync {
    /// File name of the archive built for a single deployable unit.
    fn unit_artifact_name(&self, unit: &str) -> String;

    /// File name of the archive shared by every unit without its own.
    fn service_artifact_name(&self) -> String;

    /// Whether a staging-directory file is a deployment descriptor.
    fn is_descriptor_file(&self, file_name: &str) -> bool;
}

/// Names artifacts after the service and its units.
#[derive(Debug, Clone)]
pub struct ServiceNaming {
    service: String,
    descriptor: Regex,
}

impl ServiceNaming {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            descriptor: Regex::new(DEFAULT_DESCRIPTOR_PATTERN).expect("static regex is valid"),
        }
    }

    /// Use a custom regular expression for descriptor file names.
    pub fn with_descriptor_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.descriptor = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl ArtifactNaming for ServiceNaming {
    fn unit_artifact_name(&self, unit: &str) -> String {
        format!("{unit}.zip")
    }

    fn service_artifact_name(&self) -> String {
        format!("{}.zip", self.service)
    }

    fn is_descriptor_file(&self, file_name: &str) -> bool {
        self.descriptor.is_match(file_name)
    }
}
