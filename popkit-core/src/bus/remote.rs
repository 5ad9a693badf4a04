//! Remote pub/sub backend — a thin adapter over a hosted key-value
//! publish/subscribe primitive, used only when cloud mode is enabled.
//! At-least-once delivery; callers must dedupe by [`Envelope::id`].

use serde::Deserialize;

use super::{BusError, Envelope, Result, Subscription};

pub struct RemoteBus {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteBus {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }

    fn channel_url(&self, channel: &str) -> String {
        format!("{}/channels/{}", self.base_url.trim_end_matches('/'), channel)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    pub fn publish(&self, channel: &str, envelope: Envelope) -> Result<()> {
        let url = self.channel_url(channel);
        let request = self.request(self.client.post(&url).json(&envelope));
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::try_current()
                .map_err(|_| BusError::Remote("no tokio runtime available for remote publish".to_string()))?
                .block_on(async {
                    let response = request.send().await.map_err(|e| BusError::Remote(e.to_string()))?;
                    if !response.status().is_success() {
                        return Err(BusError::Remote(format!("publish failed with status {}", response.status())));
                    }
                    Ok(())
                })
        })
    }

    pub fn subscribe(&self, channels: Vec<String>) -> RemoteSubscription {
        RemoteSubscription {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            channels,
            cursors: std::collections::HashMap::new(),
        }
    }

    pub fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    envelopes: Vec<Envelope>,
    next_cursor: Option<String>,
}

/// Polls the remote primitive once per call; the hosted side is the
/// authority on ordering and buffering. A 1 s receive-loop timeout is the
/// caller's responsibility (§5 suspension points), not this adapter's.
pub struct RemoteSubscription {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    channels: Vec<String>,
    cursors: std::collections::HashMap<String, String>,
}

impl RemoteSubscription {
    fn channel_url(&self, channel: &str) -> String {
        format!("{}/channels/{}", self.base_url.trim_end_matches('/'), channel)
    }

    async fn poll_channel(&mut self, channel: &str) -> Result<Vec<Envelope>> {
        let mut request = self.client.get(self.channel_url(channel));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(cursor) = self.cursors.get(channel) {
            request = request.query(&[("cursor", cursor.as_str())]);
        }
        let response = request.send().await.map_err(|e| BusError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BusError::Remote(format!("poll failed with status {}", response.status())));
        }
        let parsed: PollResponse = response.json().await.map_err(|e| BusError::Remote(e.to_string()))?;
        if let Some(cursor) = parsed.next_cursor {
            self.cursors.insert(channel.to_string(), cursor);
        }
        Ok(parsed.envelopes)
    }
}

impl Subscription for RemoteSubscription {
    fn poll(&mut self) -> Result<Vec<Envelope>> {
        let channels = self.channels.clone();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::try_current()
                .map_err(|_| BusError::Remote("no tokio runtime available for remote poll".to_string()))?
                .block_on(async {
                    let mut out = Vec::new();
                    for channel in &channels {
                        out.extend(self.poll_channel(channel).await?);
                    }
                    Ok(out)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_url_joins_base_and_channel() {
        let bus = RemoteBus::new("https://popkit.example/api", None);
        assert_eq!(bus.channel_url("coordinator"), "https://popkit.example/api/channels/coordinator");
    }

    #[test]
    fn channel_url_trims_trailing_slash() {
        let bus = RemoteBus::new("https://popkit.example/api/", None);
        assert_eq!(bus.channel_url("insights"), "https://popkit.example/api/channels/insights");
    }
}
