use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use skein_sync::{Replica, ReplicaGateway, SyncError, SyncResult};
use skein_types::{
    QueryReferencesRequest, QueryReferencesResponse, RangesForSystem, Reference, SignedEvent,
    SignedEvents, System, WireMessage,
};
use tracing::debug;

use crate::endpoint;

/// Header identifying the client to replica servers.
pub const USER_AGENT_HEADER: &str = "x-polycentric-user-agent";
pub const DEFAULT_USER_AGENT: &str = "polycentric-anywhere-v1";

/// Replica gateway over HTTP.
///
/// Bodies are binary-encoded messages in both directions. Any status outside
/// 2xx is reported as [`SyncError::RemoteStatus`]; connection and body read
/// failures as [`SyncError::Transport`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    user_agent: String,
}

impl HttpGateway {
    pub fn new(user_agent: impl Into<String>, request_timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::transport("http client", e))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn fetch(&self, replica: &Replica, request: RequestBuilder) -> SyncResult<Vec<u8>> {
        let response = request
            .header(USER_AGENT_HEADER, &self.user_agent)
            .send()
            .await
            .map_err(|e| SyncError::transport(replica, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus {
                replica: replica.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(replica, e))?;
        debug!(replica = %replica, bytes = body.len(), "replica response");
        Ok(body.to_vec())
    }

    async fn get<M: WireMessage>(&self, replica: &Replica, url: String) -> SyncResult<M> {
        let body = self.fetch(replica, self.client.get(url)).await?;
        Ok(M::decode(&body)?)
    }
}

#[async_trait]
impl ReplicaGateway for HttpGateway {
    async fn post_events(&self, replica: &Replica, events: &SignedEvents) -> SyncResult<()> {
        let body = events.encode()?;
        self.fetch(replica, self.client.post(endpoint::events(replica)).body(body))
            .await?;
        Ok(())
    }

    async fn get_head(&self, replica: &Replica, system: &System) -> SyncResult<Vec<SignedEvent>> {
        let events: SignedEvents = self.get(replica, endpoint::head(replica, system)?).await?;
        Ok(events.events)
    }

    async fn get_events(
        &self,
        replica: &Replica,
        system: &System,
        ranges: &RangesForSystem,
    ) -> SyncResult<Vec<SignedEvent>> {
        let url = endpoint::ranged_events(replica, system, ranges)?;
        let events: SignedEvents = self.get(replica, url).await?;
        Ok(events.events)
    }

    async fn get_query_latest(
        &self,
        replica: &Replica,
        system: &System,
        content_types: &[u64],
    ) -> SyncResult<Vec<SignedEvent>> {
        let url = endpoint::query_latest(replica, system, content_types)?;
        let events: SignedEvents = self.get(replica, url).await?;
        Ok(events.events)
    }

    async fn get_query_references(
        &self,
        replica: &Replica,
        reference: &Reference,
        cursor: Option<&[u8]>,
        content_type: u64,
    ) -> SyncResult<QueryReferencesResponse> {
        let request = QueryReferencesRequest::events_of_type(
            reference.clone(),
            content_type,
            cursor.map(<[u8]>::to_vec),
        );
        self.get(replica, endpoint::query_references(replica, &request)?)
            .await
    }
}
