//! Process identity attached to every signal.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

use crate::config::TelemetryConfig;
use crate::telemetry::error::TelemetryError;

pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

/// Immutable `service.name` / `service.instance.id` pair and the SDK resource
/// built from it. Clones share the same underlying resource.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    service_name: String,
    instance_id: String,
    resource: Resource,
}

impl ResourceDescriptor {
    pub fn new(service_name: &str, instance_id: &str) -> Result<Self, TelemetryError> {
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return Err(TelemetryError::Resource(
                "service name must not be empty".to_string(),
            ));
        }
        let instance_id = instance_id.trim();
        if instance_id.is_empty() {
            return Err(TelemetryError::Resource(
                "instance id must not be empty".to_string(),
            ));
        }

        let resource = Resource::builder()
            .with_service_name(service_name.to_string())
            .with_attribute(KeyValue::new(SERVICE_INSTANCE_ID, instance_id.to_string()))
            .build();

        Ok(Self {
            service_name: service_name.to_string(),
            instance_id: instance_id.to_string(),
            resource,
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        Self::new(&config.service_name, &config.instance_id)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn resource(&self) -> Resource {
        self.resource.clone()
    }
}
