// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration and discovery event models.
//!
//! These are the wire shapes uploaded to the event sink, camelCase JSON.
//! An application is keyed by its application uri (case-insensitive); its
//! endpoint list holds at most one entry per (endpoint url, security mode,
//! security policy) triple.

use crate::config::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecurityMode {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

/// OPC UA application type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    #[default]
    Server,
    Client,
    ClientAndServer,
    DiscoveryServer,
}

/// A server-advertised endpoint description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescription {
    /// Transport url the server advertises for this endpoint.
    pub url: String,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy uri.
    #[serde(default)]
    pub security_policy: Option<String>,

    /// Server certificate, raw DER (base64 on the wire).
    #[serde(default, with = "b64", skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<Vec<u8>>,

    /// Transport profile uri.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_profile_uri: Option<String>,
}

/// Identity of a discovered server application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    /// Globally unique application uri. Dedup key for registrations.
    pub application_uri: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    /// Application type.
    #[serde(default)]
    pub application_type: ApplicationType,

    /// Product uri.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_uri: Option<String>,

    /// Discovery urls the application advertises.
    #[serde(default)]
    pub discovery_urls: BTreeSet<String>,

    /// Server capability strings.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Site this application was discovered at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,

    /// Supervisor that discovered this application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,
}

/// One registered endpoint of a discovered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRegistration {
    /// The advertised endpoint description.
    pub endpoint: EndpointDescription,

    /// Url under which the endpoint was actually reached.
    pub accessible_endpoint_url: String,

    /// Site this endpoint was discovered at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,

    /// Supervisor that discovered this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,
}

impl EndpointRegistration {
    /// Dedup key: endpoint url + security mode + security policy.
    pub fn dedup_key(&self) -> (String, SecurityMode, Option<String>) {
        (
            self.endpoint.url.to_ascii_lowercase(),
            self.endpoint.security_mode,
            self.endpoint.security_policy.clone(),
        )
    }
}

/// A discovered application with its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRegistration {
    pub application: ApplicationInfo,
    pub endpoints: Vec<EndpointRegistration>,
}

/// Endpoint data returned by the discovery client for one probed url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    /// Identity advertised by the owning server application.
    pub application: ApplicationInfo,

    /// The endpoint description.
    pub description: EndpointDescription,

    /// Url the endpoint was reached under during discovery.
    pub accessible_endpoint_url: String,

    /// Server capability strings.
    pub capabilities: BTreeSet<String>,
}

impl DiscoveredEndpoint {
    /// Convert into a single-endpoint registration tagged with provenance.
    pub fn into_registration(self, identity: &Identity) -> ApplicationRegistration {
        let supervisor_id = Some(identity.supervisor_id());
        let mut application = self.application;
        application.site_id = identity.site_id.clone();
        application.supervisor_id = supervisor_id.clone();
        application.capabilities.extend(self.capabilities);
        ApplicationRegistration {
            application,
            endpoints: vec![EndpointRegistration {
                endpoint: self.description,
                accessible_endpoint_url: self.accessible_endpoint_url,
                site_id: identity.site_id.clone(),
                supervisor_id,
            }],
        }
    }
}

/// Identity of the discovering module, stamped on registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub device_id: String,
    pub module_id: Option<String>,
    pub site_id: Option<String>,
}

impl Identity {
    /// Supervisor id derived from device and module ids.
    pub fn supervisor_id(&self) -> String {
        match &self.module_id {
            Some(module_id) => format!("{}_module_{}", self.device_id, module_id),
            None => self.device_id.clone(),
        }
    }
}

/// Batch-level result carried by the sentinel event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Id of the request this batch belongs to.
    pub id: Uuid,

    /// Configuration the pass ran with.
    pub discovery_config: DiscoveryConfig,

    /// True iff the pass only probed explicit urls (mode off).
    pub register_only: bool,

    /// Diagnostics captured from sweep or resolution failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

/// One event of a discovery upload batch.
///
/// Events are created fresh per batch and never mutated after the batch is
/// built. The last event of a batch is the sentinel: `registration` is None
/// and `result` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEvent {
    /// 0-based position within the upload batch.
    pub index: usize,

    /// Application the registration belongs to. None on the sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationInfo>,

    /// The endpoint registration. None on the sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<EndpointRegistration>,

    /// Batch timestamp, milliseconds since the unix epoch.
    pub time_stamp: u64,

    /// Batch result. Present only on the sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DiscoveryResult>,
}

/// Current time in milliseconds since the unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => STANDARD.encode(bytes).serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
