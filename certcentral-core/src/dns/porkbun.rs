use async_trait::async_trait;
use porkbun_api::{CreateOrEditDnsRecord, DnsRecordType};

use crate::error::ChallengeProvisionError;

use super::DnsProvider;

/// Porkbun DNS provider.
pub struct PorkbunDnsProvider {
    client: porkbun_api::Client<porkbun_api::transport::DefaultTransport>,
}

impl PorkbunDnsProvider {
    pub fn new(api_key: &str, secret_key: &str) -> Self {
        let api_key = porkbun_api::ApiKey::new(secret_key, api_key);
        Self {
            client: porkbun_api::Client::new(api_key),
        }
    }
}

fn provider_error(detail: String) -> ChallengeProvisionError {
    ChallengeProvisionError::DnsProviderRejected {
        provider: "porkbun".to_string(),
        detail,
    }
}

fn rrname_to_subname<'a>(rrname: &'a str, zone: &str) -> Option<&'a str> {
    rrname.strip_suffix(&format!(".{zone}")).filter(|s| !s.is_empty())
}

#[async_trait]
impl DnsProvider for PorkbunDnsProvider {
    async fn add_txt(&self, zone: &str, rrname: &str, value: &str, _ttl: u32) -> Result<(), ChallengeProvisionError> {
        let subname = rrname_to_subname(rrname, zone);
        let record = CreateOrEditDnsRecord::new(subname, DnsRecordType::TXT, value);
        self.client.create(zone, record).await.map_err(|e| provider_error(e.to_string()))?;
        Ok(())
    }

    async fn remove_txt(&self, zone: &str, rrname: &str, _value: &str) -> Result<(), ChallengeProvisionError> {
        for entry in self.client.get_all(zone).await.map_err(|e| provider_error(e.to_string()))? {
            if entry.name == rrname && entry.record_type == DnsRecordType::TXT {
                self.client.delete(zone, &entry.id).await.map_err(|e| provider_error(e.to_string()))?;
            }
        }
        Ok(())
    }
}
