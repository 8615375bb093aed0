use cardfeed_proto::CardId;
use url::Url;

/// Endpoints of the card consultation service for one subscribing client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUrls {
    base: Url,
    /// Target of recovery and business-period POSTs
    pub subscription: Url,
    /// Long-lived push stream
    pub event_stream: Url,
    pub heartbeat: Url,
    /// DELETE target when the client unsubscribes
    pub close: Url,
}

impl SubscriptionUrls {
    pub fn new(server_url: &str, client_id: &str, version: &str) -> Result<Self, url::ParseError> {
        let base = if server_url.ends_with('/') { Url::parse(server_url)? } else { Url::parse(&format!("{server_url}/"))? };

        let mut subscription = base.join("cards-consultation/cardSubscription")?;
        subscription.query_pairs_mut().append_pair("clientId", client_id).append_pair("version", version);

        let mut event_stream = subscription.clone();
        event_stream.query_pairs_mut().append_pair("notification", "true");

        let mut heartbeat = base.join("cards-consultation/cardSubscriptionHeartbeat")?;
        heartbeat.query_pairs_mut().append_pair("clientId", client_id);

        let mut close = base.join("cards-consultation/cardSubscription")?;
        close.query_pairs_mut().append_pair("clientId", client_id);

        Ok(Self { base, subscription, event_stream, heartbeat, close })
    }

    /// Full body of one card
    pub fn card(&self, id: &CardId) -> Result<Url, url::ParseError> {
        let mut url = self.base.join("cards-consultation/cards/")?;
        url.path_segments_mut().map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?.pop_if_empty().push(id.as_str());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_carry_client_id_and_version() {
        let urls = SubscriptionUrls::new("http://localhost:2002", "abc", "4.1.0").unwrap();
        assert_eq!(urls.subscription.as_str(), "http://localhost:2002/cards-consultation/cardSubscription?clientId=abc&version=4.1.0");
        assert_eq!(urls.event_stream.as_str(), "http://localhost:2002/cards-consultation/cardSubscription?clientId=abc&version=4.1.0&notification=true");
        assert_eq!(urls.heartbeat.as_str(), "http://localhost:2002/cards-consultation/cardSubscriptionHeartbeat?clientId=abc");
        assert_eq!(urls.close.as_str(), "http://localhost:2002/cards-consultation/cardSubscription?clientId=abc");
    }

    #[test]
    fn base_path_is_kept() {
        let urls = SubscriptionUrls::new("https://example.org/opfab/", "abc", "1").unwrap();
        assert_eq!(urls.heartbeat.as_str(), "https://example.org/opfab/cards-consultation/cardSubscriptionHeartbeat?clientId=abc");
        assert_eq!(urls.card(&"process.A 1".into()).unwrap().as_str(), "https://example.org/opfab/cards-consultation/cards/process.A%201");
    }

    #[test]
    fn malformed_server_url_is_rejected() {
        assert!(SubscriptionUrls::new("not a url", "abc", "1").is_err());
    }
}
