use async_trait::async_trait;

use crate::error::ChallengeProvisionError;

use super::DnsProvider;

/// deSEC (desec.io) DNS provider.
pub struct DesecDnsProvider {
    client: desec_api::Client,
}

impl DesecDnsProvider {
    pub fn new(api_token: &str) -> Result<Self, ChallengeProvisionError> {
        let client = desec_api::Client::new(api_token.to_string()).map_err(|e| provider_error(e.to_string()))?;
        Ok(Self { client })
    }
}

fn provider_error(detail: String) -> ChallengeProvisionError {
    ChallengeProvisionError::DnsProviderRejected {
        provider: "desec".to_string(),
        detail,
    }
}

fn rrname_to_subname<'a>(rrname: &'a str, zone: &str) -> Option<&'a str> {
    rrname.strip_suffix(&format!(".{zone}")).filter(|s| !s.is_empty())
}

#[async_trait]
impl DnsProvider for DesecDnsProvider {
    async fn add_txt(&self, zone: &str, rrname: &str, value: &str, ttl: u32) -> Result<(), ChallengeProvisionError> {
        let subname = rrname_to_subname(rrname, zone);
        self.client
            .rrset()
            .create_rrset(zone, subname, "TXT", ttl as u64, &[format!("\"{value}\"")])
            .await
            .map_err(|e| provider_error(e.to_string()))?;
        Ok(())
    }

    async fn remove_txt(&self, zone: &str, rrname: &str, _value: &str) -> Result<(), ChallengeProvisionError> {
        let subname = rrname_to_subname(rrname, zone);
        self.client
            .rrset()
            .delete_rrset(zone, subname, "TXT")
            .await
            .map_err(|e| provider_error(e.to_string()))?;
        Ok(())
    }
}
