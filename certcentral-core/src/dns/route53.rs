use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_route53::types::{Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType};
use aws_sdk_route53::Client;
use tokio::sync::Mutex;

use crate::error::ChallengeProvisionError;

use super::DnsProvider;

/// Amazon Route 53 DNS provider. The AWS client is constructed lazily on
/// first use and cached, since loading AWS config/credentials is async and
/// the provider itself is built synchronously from configuration.
pub struct Route53DnsProvider {
    region: Option<String>,
    profile_name: Option<String>,
    credentials: Option<Credentials>,
    hosted_zone_id: Option<String>,
    client: Mutex<Option<Arc<Client>>>,
}

impl Route53DnsProvider {
    pub fn new(
        region: Option<&str>,
        profile_name: Option<&str>,
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
        hosted_zone_id: Option<&str>,
    ) -> Result<Self, ChallengeProvisionError> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(provider_error("access_key_id and secret_access_key must be given together".to_string()));
        }
        let credentials = access_key_id
            .zip(secret_access_key)
            .map(|(id, secret)| Credentials::from_keys(id, secret, None));
        Ok(Self {
            region: region.map(str::to_string),
            profile_name: profile_name.map(str::to_string),
            credentials,
            hosted_zone_id: hosted_zone_id.map(str::to_string),
            client: Mutex::new(None),
        })
    }

    async fn client(&self) -> Arc<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile_name) = &self.profile_name {
            loader = loader.profile_name(profile_name.clone());
        }
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let client = Arc::new(Client::new(&loader.load().await));
        guard.replace(client.clone());
        client
    }

    async fn hosted_zone_id(&self, client: &Client, zone: &str) -> Result<String, ChallengeProvisionError> {
        if let Some(id) = &self.hosted_zone_id {
            return Ok(id.clone());
        }
        let response = client
            .list_hosted_zones_by_name()
            .dns_name(zone)
            .send()
            .await
            .map_err(|e| provider_error(e.to_string()))?;
        response
            .hosted_zone_id()
            .map(str::to_string)
            .ok_or_else(|| provider_error(format!("no Route 53 hosted zone found for {zone}")))
    }
}

fn provider_error(detail: String) -> ChallengeProvisionError {
    ChallengeProvisionError::DnsProviderRejected {
        provider: "route53".to_string(),
        detail,
    }
}

#[async_trait]
impl DnsProvider for Route53DnsProvider {
    async fn add_txt(&self, zone: &str, rrname: &str, value: &str, ttl: u32) -> Result<(), ChallengeProvisionError> {
        let client = self.client().await;
        let hosted_zone_id = self.hosted_zone_id(&client, zone).await?;
        client
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(
                ChangeBatch::builder()
                    .changes(
                        Change::builder()
                            .action(ChangeAction::Upsert)
                            .resource_record_set(
                                ResourceRecordSet::builder()
                                    .name(format!("{rrname}."))
                                    .r#type(RrType::Txt)
                                    .ttl(ttl as i64)
                                    .resource_records(
                                        ResourceRecord::builder()
                                            .value(format!("\"{value}\""))
                                            .build()
                                            .map_err(|e| provider_error(e.to_string()))?,
                                    )
                                    .build()
                                    .map_err(|e| provider_error(e.to_string()))?,
                            )
                            .build()
                            .map_err(|e| provider_error(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| provider_error(e.to_string()))?,
            )
            .send()
            .await
            .map_err(|e| provider_error(e.to_string()))?;
        Ok(())
    }

    async fn remove_txt(&self, zone: &str, rrname: &str, value: &str) -> Result<(), ChallengeProvisionError> {
        let client = self.client().await;
        let hosted_zone_id = self.hosted_zone_id(&client, zone).await?;
        client
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(
                ChangeBatch::builder()
                    .changes(
                        Change::builder()
                            .action(ChangeAction::Delete)
                            .resource_record_set(
                                ResourceRecordSet::builder()
                                    .name(format!("{rrname}."))
                                    .r#type(RrType::Txt)
                                    .ttl(300)
                                    .resource_records(
                                        ResourceRecord::builder()
                                            .value(format!("\"{value}\""))
                                            .build()
                                            .map_err(|e| provider_error(e.to_string()))?,
                                    )
                                    .build()
                                    .map_err(|e| provider_error(e.to_string()))?,
                            )
                            .build()
                            .map_err(|e| provider_error(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| provider_error(e.to_string()))?,
            )
            .send()
            .await
            .map_err(|e| provider_error(e.to_string()))?;
        Ok(())
    }
}
