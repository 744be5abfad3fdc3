//! The provider factory: resolved credentials in, typed notifier out.

use beacon_api::ProviderType;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::{client, Notifier, NotifyError};

/// Everything needed to construct a notifier for one provider, with secret
/// references already resolved. Cheap to clone; cached between dispatches
/// by the token cache.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    /// Endpoint address, from the spec or the secret's `address` key.
    pub address: Option<String>,
    pub proxy: Option<String>,
    pub username: Option<String>,
    pub channel: Option<String>,
    pub token: Option<String>,
    pub password: Option<String>,
    /// Extra headers from the secret's `headers` key.
    pub headers: HashMap<String, String>,
    /// PEM bundle from the CA cert secret.
    pub ca_pem: Option<Vec<u8>>,
    /// UID of the Provider object, used for default commit-status ids.
    pub provider_uid: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Commit-status id computed by the dispatcher for the current
    /// (event, alert, provider) triple. Commit-status types only.
    pub commit_status_id: Option<String>,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self {
            address: None,
            proxy: None,
            username: None,
            channel: None,
            token: None,
            password: None,
            headers: HashMap::new(),
            ca_pem: None,
            provider_uid: String::new(),
            timeout: beacon_api::provider::DEFAULT_TIMEOUT,
            commit_status_id: None,
        }
    }
}

impl ProviderFactory {
    /// Construct the notifier for a provider type.
    ///
    /// Fails with a terminal [`NotifyError::Config`] when the factory lacks
    /// something the type requires (address, token, commit-status id).
    pub fn notifier(&self, type_: ProviderType) -> Result<Box<dyn Notifier>, NotifyError> {
        Ok(match type_ {
            ProviderType::Generic => Box::new(crate::generic::GenericNotifier::new(self, false)?),
            ProviderType::GenericHmac => {
                Box::new(crate::generic::GenericNotifier::new(self, true)?)
            }
            ProviderType::Slack => Box::new(crate::slack::SlackNotifier::new(self)?),
            ProviderType::Discord => Box::new(crate::discord::DiscordNotifier::new(self)?),
            ProviderType::MsTeams => Box::new(crate::msteams::MsTeamsNotifier::new(self)?),
            ProviderType::Rocket => Box::new(crate::rocket::RocketNotifier::new(self)?),
            ProviderType::GoogleChat => {
                Box::new(crate::google_chat::GoogleChatNotifier::new(self)?)
            }
            ProviderType::Webex => Box::new(crate::webex::WebexNotifier::new(self)?),
            ProviderType::Telegram => Box::new(crate::telegram::TelegramNotifier::new(self)?),
            ProviderType::Lark => Box::new(crate::lark::LarkNotifier::new(self)?),
            ProviderType::Matrix => Box::new(crate::matrix::MatrixNotifier::new(self)?),
            ProviderType::Opsgenie => Box::new(crate::opsgenie::OpsgenieNotifier::new(self)?),
            ProviderType::Alertmanager => {
                Box::new(crate::alertmanager::AlertmanagerNotifier::new(self)?)
            }
            ProviderType::Grafana => Box::new(crate::grafana::GrafanaNotifier::new(self)?),
            ProviderType::PagerDuty => Box::new(crate::pagerduty::PagerDutyNotifier::new(self)?),
            ProviderType::Datadog => Box::new(crate::datadog::DatadogNotifier::new(self)?),
            ProviderType::Sentry => Box::new(crate::sentry::SentryNotifier::new(self)?),
            ProviderType::GitHub => Box::new(crate::github::GitHubNotifier::new(self)?),
            ProviderType::GitLab => Box::new(crate::gitlab::GitLabNotifier::new(self)?),
            ProviderType::Gitea => Box::new(crate::gitea::GiteaNotifier::new(self)?),
            ProviderType::Bitbucket => Box::new(crate::bitbucket::BitbucketNotifier::new(self)?),
            ProviderType::BitbucketServer => {
                Box::new(crate::bitbucket_server::BitbucketServerNotifier::new(self)?)
            }
            ProviderType::AzureDevOps => {
                Box::new(crate::azure_devops::AzureDevOpsNotifier::new(self)?)
            }
            ProviderType::GitHubDispatch => {
                Box::new(crate::github_dispatch::GitHubDispatchNotifier::new(self)?)
            }
            ProviderType::GooglePubSub => {
                Box::new(crate::google_pubsub::GooglePubSubNotifier::new(self)?)
            }
            ProviderType::AzureEventHub => {
                Box::new(crate::azure_eventhub::AzureEventHubNotifier::new(self)?)
            }
        })
    }

    /// A client honoring the factory's timeout, proxy and CA pool.
    pub(crate) fn client(&self) -> Result<Client, NotifyError> {
        client::build(self.timeout, self.proxy.as_deref(), self.ca_pem.as_deref())
    }

    /// The address, parsed as an absolute URL.
    pub(crate) fn require_url(&self) -> Result<Url, NotifyError> {
        let address = self.require_address()?;
        Url::parse(address)
            .map_err(|e| NotifyError::Config(format!("invalid provider address: {e}")))
    }

    pub(crate) fn require_address(&self) -> Result<&str, NotifyError> {
        self.address
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| NotifyError::Config("provider address is required".to_string()))
    }

    /// The address or, where the vendor has a public endpoint, a default.
    pub(crate) fn address_or(&self, default: &str) -> String {
        match self.address.as_deref().filter(|a| !a.is_empty()) {
            Some(address) => address.trim_end_matches('/').to_string(),
            None => default.to_string(),
        }
    }

    pub(crate) fn require_token(&self) -> Result<&str, NotifyError> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NotifyError::Config("provider token is required".to_string()))
    }

    pub(crate) fn require_channel(&self) -> Result<&str, NotifyError> {
        self.channel
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NotifyError::Config("provider channel is required".to_string()))
    }

    pub(crate) fn require_commit_status_id(&self) -> Result<&str, NotifyError> {
        self.commit_status_id
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| NotifyError::Config("commit-status id is required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(address: &str) -> ProviderFactory {
        ProviderFactory {
            address: Some(address.to_string()),
            token: Some("t".to_string()),
            channel: Some("c".to_string()),
            provider_uid: "uid-1234".to_string(),
            commit_status_id: Some("kustomization/podinfo/uid12345".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn every_type_constructs_with_full_config() {
        use ProviderType as P;
        let chat = factory("https://example.com/webhook");
        for ty in [
            P::Generic,
            P::GenericHmac,
            P::Slack,
            P::Discord,
            P::MsTeams,
            P::Rocket,
            P::GoogleChat,
            P::Webex,
            P::Telegram,
            P::Lark,
            P::Matrix,
            P::Opsgenie,
            P::Alertmanager,
            P::Grafana,
            P::PagerDuty,
            P::Datadog,
        ] {
            assert!(chat.notifier(ty).is_ok(), "type {ty} should construct");
        }

        let git = factory("https://github.com/org/repo");
        for ty in [P::GitHub, P::Gitea, P::GitHubDispatch] {
            assert!(git.notifier(ty).is_ok(), "type {ty} should construct");
        }
        assert!(factory("https://gitlab.com/group/project")
            .notifier(P::GitLab)
            .is_ok());
        assert!(factory("https://dev.azure.com/org/proj/_git/repo")
            .notifier(P::AzureDevOps)
            .is_ok());
        assert!(factory("https://key@sentry.example.com/42")
            .notifier(P::Sentry)
            .is_ok());
        assert!(factory("projects/p/topics/t")
            .notifier(P::GooglePubSub)
            .is_ok());
        assert!(factory("https://ns.servicebus.windows.net/hub")
            .notifier(P::AzureEventHub)
            .is_ok());
    }

    #[test]
    fn missing_address_is_terminal() {
        let factory = ProviderFactory::default();
        let err = factory.notifier(ProviderType::Slack).unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn commit_status_types_need_an_id() {
        let mut git = factory("https://github.com/org/repo");
        git.commit_status_id = None;
        assert!(git.notifier(ProviderType::GitHub).is_err());
    }
}
