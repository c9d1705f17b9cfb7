use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::common::errors::CoreError;
use crate::common::http::HttpClient;
use crate::common::types::AccountRef;
use crate::config::StreakConfig;
use crate::streak::MatchApi;

const RANKED_QUEUE_ID: u32 = 420;
const OUTCOME_COUNT: u32 = 2;

/// `MatchApi` over the external match-data HTTP service. Only the fields
/// the core reads are modeled.
pub struct HttpMatchApi {
    client: reqwest::Client,
    api_key: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    puuid: String,
}

#[derive(Debug, Deserialize)]
struct MatchDto {
    info: MatchInfoDto,
}

#[derive(Debug, Deserialize)]
struct MatchInfoDto {
    participants: Vec<ParticipantDto>,
}

#[derive(Debug, Deserialize)]
struct ParticipantDto {
    puuid: String,
    win: bool,
}

impl HttpMatchApi {
    pub fn new(config: &StreakConfig) -> Result<Self, CoreError> {
        Ok(Self {
            client: HttpClient::new()?,
            api_key: config.api_key.clone(),
            region: config.region.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MatchApi for HttpMatchApi {
    async fn recent_ranked_outcomes(&self, account: &AccountRef) -> Result<Vec<bool>, CoreError> {
        let (name, tag) = account.split_once('#').ok_or_else(|| {
            CoreError::ExternalApi(format!("account ref must be Name#Tag: {}", account))
        })?;

        let url = format!(
            "https://{}.api.riotgames.com/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.region,
            urlencoding::encode(name),
            urlencoding::encode(tag)
        );
        let resolved: AccountDto = self.get(&url, &[]).await?;

        let url = format!(
            "https://{}.api.riotgames.com/lol/match/v5/matches/by-puuid/{}/ids",
            self.region, resolved.puuid
        );
        let match_ids: Vec<String> = self
            .get(
                &url,
                &[
                    ("queueId", RANKED_QUEUE_ID.to_string()),
                    ("count", OUTCOME_COUNT.to_string()),
                ],
            )
            .await?;

        let mut outcomes = Vec::with_capacity(match_ids.len());
        for match_id in match_ids {
            let url = format!(
                "https://{}.api.riotgames.com/lol/match/v5/matches/{}",
                self.region, match_id
            );
            let details: MatchDto = self.get(&url, &[]).await?;
            if let Some(participant) = details
                .info
                .participants
                .iter()
                .find(|p| p.puuid == resolved.puuid)
            {
                outcomes.push(participant.win);
            }
        }
        Ok(outcomes)
    }
}
